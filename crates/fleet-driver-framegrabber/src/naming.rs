//! Device, port and parameter name resolution.
//!
//! SDK enumeration often returns descriptive strings such as
//! `device:0 | unique_name:2C1B_A5 | Acme GC1300`. Users copy those into the
//! settings verbatim, while `open` typically wants one token of them.

use crate::sdk::PortSpec;
use std::collections::HashSet;

const UNIQUE_NAME: &str = "unique_name:";
const DEVICE: &str = "device:";

/// Case-insensitive `find` for ASCII needles.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn starts_with_ci(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Value following `key` up to the next separator.
fn token_after(raw: &str, key: &str) -> Option<String> {
    let idx = find_ci(raw, key)?;
    let after = raw[idx + key.len()..].trim();
    let token = after
        .split(|c: char| c == '|' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    (!token.is_empty()).then(|| token.to_string())
}

/// Compact identifier for a raw device string.
///
/// Prefers a `unique_name:` token, then a `device:` token, else the trimmed
/// input. Blank input means `default`.
pub fn normalize_device_id(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return "default".to_string();
    }
    if let Some(idx) = find_ci(s, UNIQUE_NAME) {
        return s[idx..].trim().to_string();
    }
    if s.contains('|') {
        let parts: Vec<&str> = s.split('|').map(str::trim).collect();
        for prefix in [UNIQUE_NAME, DEVICE] {
            if let Some(part) = parts.iter().find(|p| starts_with_ci(p, prefix)) {
                return part.to_string();
            }
        }
    }
    s.to_string()
}

/// Identifiers to pass to `open`, most specific first, ending in `default`.
///
/// Duplicates are removed case-insensitively.
pub fn device_candidates(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return vec!["default".to_string()];
    }

    let mut list = Vec::new();
    let norm = normalize_device_id(raw);
    if starts_with_ci(&norm, UNIQUE_NAME) {
        let bare = norm[UNIQUE_NAME.len()..].trim().to_string();
        list.push(norm.clone());
        if !bare.is_empty() {
            list.push(bare);
        }
    } else {
        list.push(norm.clone());
    }

    if let Some(token) = token_after(raw, UNIQUE_NAME) {
        list.push(format!("{}{}", UNIQUE_NAME, token));
        list.push(token);
    }
    if let Some(token) = token_after(raw, DEVICE) {
        list.push(format!("{}{}", DEVICE, token));
    }
    if raw != norm {
        list.push(raw.to_string());
    }
    list.push("default".to_string());

    let mut seen = HashSet::new();
    list.retain(|c| seen.insert(c.to_ascii_lowercase()));
    list
}

/// Port argument for `interface`: explicit ports win, vision-standard
/// interfaces take `0`, anything else takes `default`.
pub fn port_for(interface: &str, port: i32) -> PortSpec {
    if port > 0 {
        return PortSpec::Number(port);
    }
    let interface = interface.trim();
    if ["USB3Vision", "GigEVision2", "GigEVision"]
        .iter()
        .any(|name| interface.eq_ignore_ascii_case(name))
    {
        PortSpec::Number(0)
    } else {
        PortSpec::Default
    }
}

/// SDK node names to try for a parameter, the requested name first.
pub fn param_name_candidates(name: &str) -> Vec<String> {
    let aliases: &[&str] = match name {
        "Consumer|exposure" => &["ExposureTime", "ExposureTimeAbs", "ExposureTimeRaw"],
        "Consumer|gain" => &["Gain", "GainRaw", "GainAbs"],
        "Consumer|exposure_auto" => &["ExposureAuto", "ExposureAutoMode"],
        "Consumer|gain_auto" => &["GainAuto", "GainAutoMode"],
        "Gamma" => &["Consumer|gamma", "GammaAbs", "GammaRaw"],
        "GammaEnable" => &["GammaEnabled", "Consumer|gamma_enable"],
        _ => &[],
    };

    let mut seen = HashSet::new();
    std::iter::once(name)
        .chain(aliases.iter().copied())
        .filter(|n| !n.trim().is_empty())
        .filter(|n| seen.insert(n.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Persisted parameters that must not be replayed on open.
pub fn is_skipped_param(name: &str) -> bool {
    name.to_ascii_lowercase().contains("black")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_device_is_default() {
        assert_eq!(device_candidates("  "), vec!["default"]);
        assert_eq!(normalize_device_id(""), "default");
    }

    #[test]
    fn test_descriptive_string_expands() {
        let raw = "device:0 | unique_name:2C1B_A5 | Acme GC1300";
        assert_eq!(
            device_candidates(raw),
            vec![
                "unique_name:2C1B_A5 | Acme GC1300".to_string(),
                "2C1B_A5 | Acme GC1300".to_string(),
                "unique_name:2C1B_A5".to_string(),
                "2C1B_A5".to_string(),
                "device:0".to_string(),
                raw.to_string(),
                "default".to_string(),
            ]
        );
    }

    #[test]
    fn test_device_token_when_no_unique_name() {
        assert_eq!(normalize_device_id("Acme | device:3"), "device:3");
        assert_eq!(
            device_candidates("Acme | device:3"),
            vec!["device:3", "Acme | device:3", "default"]
        );
    }

    #[test]
    fn test_plain_identifier() {
        assert_eq!(device_candidates("SN1234"), vec!["SN1234", "default"]);
        assert_eq!(device_candidates("DEFAULT"), vec!["DEFAULT"]);
    }

    #[test]
    fn test_port_for() {
        assert_eq!(port_for("DirectShow", 2), PortSpec::Number(2));
        assert_eq!(port_for("usb3vision", 0), PortSpec::Number(0));
        assert_eq!(port_for("GigEVision", -1), PortSpec::Number(0));
        assert_eq!(port_for("DirectShow", 0), PortSpec::Default);
    }

    #[test]
    fn test_param_aliases() {
        assert_eq!(
            param_name_candidates("Consumer|exposure"),
            vec!["Consumer|exposure", "ExposureTime", "ExposureTimeAbs", "ExposureTimeRaw"]
        );
        assert_eq!(param_name_candidates("Gain"), vec!["Gain"]);
        assert!(is_skipped_param("Consumer|black_level"));
        assert!(is_skipped_param("BlackLevelRaw"));
        assert!(!is_skipped_param("Gain"));
    }
}

//! Test pattern generation for simulated frames.

/// Brightness of the moving block for the given exposure (µs) and gain.
///
/// Longer exposure and higher gain brighten the block so tuning changes are
/// visible in the output. Result is in `30..=230`.
pub fn block_intensity(exposure_us: i64, gain: f64) -> u8 {
    let exp_norm = (exposure_us as f64 / 20_000.0).clamp(0.0, 1.0);
    let gain_norm = ((gain - 1.0) / 10.0).clamp(0.0, 1.0);
    let gray = 30.0 + 200.0 * exp_norm.max(0.2) * (1.0 + gain_norm);
    gray.min(230.0) as u8
}

/// Generates an 8-bit frame with a bright square that moves every frame.
///
/// The square's side is a quarter of the shorter image edge (120 px at
/// 640x480). It advances 12 px right and 7 px down per frame, wrapping inside
/// the image, so consecutive frames are always distinguishable.
///
/// # Arguments
/// * `width` - Frame width in pixels
/// * `height` - Frame height in pixels
/// * `frame_num` - Frame number (drives the motion)
/// * `intensity` - Gray level of the square; background is 0
pub fn moving_block(width: u32, height: u32, frame_num: u64, intensity: u8) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut buffer = vec![0u8; w * h];
    if w == 0 || h == 0 {
        return buffer;
    }

    let side = (w.min(h) / 4).max(1);
    let span_x = (w - side).max(1) as u64;
    let span_y = (h - side).max(1) as u64;
    let x0 = (frame_num.wrapping_mul(12) % span_x) as usize;
    let y0 = (frame_num.wrapping_mul(7) % span_y) as usize;

    for row in buffer.chunks_exact_mut(w).skip(y0).take(side) {
        let end = (x0 + side).min(w);
        row[x0..end].fill(intensity);
    }
    buffer
}

/// A single captured image.
///
/// # Storage
/// Data is stored as a raw byte vector (`Vec<u8>`).
/// - 8-bit images: 1 byte per pixel.
/// - 12/16-bit images: 2 bytes per pixel, Little Endian.
///
/// Frames are moved, never shared: observers borrow a frame for the duration of
/// a callback, then ownership passes to the primary output or the frame drops.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (8, 12 or 16)
    pub bit_depth: u32,

    /// Backend frame counter, starting at 1 after each open
    pub frame_number: u64,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            frame_number: 0,
            data,
        }
    }

    /// Create a new frame from 16-bit pixel data.
    ///
    /// Copies the data into a little-endian byte vector.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        let mut data = Vec::with_capacity(pixels.len() * 2);
        for pixel in pixels {
            data.extend_from_slice(&pixel.to_le_bytes());
        }

        Self {
            width,
            height,
            bit_depth: 16,
            frame_number: 0,
            data,
        }
    }

    /// Tag the frame with the backend's frame counter.
    #[must_use]
    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Get pixel value at (x, y) as u32.
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let idx = (y * self.width + x) as usize;

        match self.bit_depth {
            8 => self.data.get(idx).map(|&v| v as u32),
            12 | 16 => {
                let start = idx * 2;
                let bytes = self.data.get(start..start + 2)?;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32)
            }
            _ => None,
        }
    }

    /// Calculate mean pixel value.
    pub fn mean(&self) -> f64 {
        match self.bit_depth {
            8 => {
                if self.data.is_empty() {
                    return 0.0;
                }
                let sum: u64 = self.data.iter().map(|&v| v as u64).sum();
                sum as f64 / self.data.len() as f64
            }
            12 | 16 => {
                let count = self.data.len() / 2;
                if count == 0 {
                    return 0.0;
                }
                let sum: u64 = self
                    .data
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]) as u64)
                    .sum();
                sum as f64 / count as f64
            }
            _ => 0.0,
        }
    }

    /// Number of bytes held by this frame.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_pixel_access() {
        let frame = Frame::from_u8(2, 2, vec![1, 2, 3, 4]);
        assert_eq!(frame.get(1, 1), Some(4));
        assert_eq!(frame.get(2, 0), None);
        assert!((frame.mean() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_u16_pixel_access() {
        let frame = Frame::from_u16(2, 1, &[1000, 3000]);
        assert_eq!(frame.bit_depth, 16);
        assert_eq!(frame.get(0, 0), Some(1000));
        assert_eq!(frame.get(1, 0), Some(3000));
        assert!((frame.mean() - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frame_number_tag() {
        let frame = Frame::from_u8(1, 1, vec![0]).with_frame_number(42);
        assert_eq!(frame.frame_number, 42);
        assert_eq!(frame.byte_len(), 1);
    }
}

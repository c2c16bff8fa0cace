//! Grayscale frame samples and their statistics.

/// Luma value above which a pixel counts as lit.
const LIT_LUMA: u8 = 5;

/// One 8-bit grayscale frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, luma: Vec<u8>) -> Self {
        Self { width, height, luma }
    }

    /// A frame with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::new(width, height, vec![value; (width * height) as usize])
    }

    /// Split raw `gray` pixel data into frames, dropping a trailing partial frame.
    pub fn split_raw(width: u32, height: u32, raw: &[u8]) -> Vec<Frame> {
        let size = (width as usize) * (height as usize);
        if size == 0 {
            return Vec::new();
        }
        raw.chunks_exact(size)
            .map(|chunk| Frame::new(width, height, chunk.to_vec()))
            .collect()
    }

    pub fn mean(&self) -> f64 {
        if self.luma.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.luma.iter().map(|&p| p as u64).sum();
        sum as f64 / self.luma.len() as f64
    }

    pub fn stddev(&self) -> f64 {
        if self.luma.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .luma
            .iter()
            .map(|&p| {
                let d = p as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / self.luma.len() as f64;
        var.sqrt()
    }

    /// Share of pixels brighter than near-black.
    pub fn lit_ratio(&self) -> f64 {
        if self.luma.is_empty() {
            return 0.0;
        }
        let lit = self.luma.iter().filter(|&&p| p > LIT_LUMA).count();
        lit as f64 / self.luma.len() as f64
    }

    /// Mean absolute per-pixel difference. Frames of different shape never match.
    pub fn mean_abs_diff(&self, other: &Frame) -> f64 {
        if self.width != other.width
            || self.height != other.height
            || self.luma.len() != other.luma.len()
            || self.luma.is_empty()
        {
            return f64::MAX;
        }
        let total: u64 = self
            .luma
            .iter()
            .zip(&other.luma)
            .map(|(&a, &b)| a.abs_diff(b) as u64)
            .sum();
        total as f64 / self.luma.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_of_flat_frame() {
        let frame = Frame::filled(4, 4, 100);
        assert_eq!(frame.mean(), 100.0);
        assert_eq!(frame.stddev(), 0.0);
        assert_eq!(frame.lit_ratio(), 1.0);
    }

    #[test]
    fn test_lit_ratio_and_diff() {
        let a = Frame::new(2, 2, vec![0, 0, 0, 200]);
        let b = Frame::new(2, 2, vec![0, 0, 0, 100]);
        assert_eq!(a.lit_ratio(), 0.25);
        assert_eq!(a.mean_abs_diff(&b), 25.0);
        assert_eq!(a.mean_abs_diff(&Frame::filled(1, 1, 0)), f64::MAX);
    }

    #[test]
    fn test_split_raw_drops_partial_frame() {
        let raw = vec![1u8; 4 * 2 + 3];
        let frames = Frame::split_raw(2, 2, &raw);
        assert_eq!(frames.len(), 2);
        assert!(Frame::split_raw(0, 2, &raw).is_empty());
    }
}

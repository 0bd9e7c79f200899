//! Test data builders for raw capture frames

/// Builder for raw `[re0, im0, re1, im1, ...]` capture blocks
pub struct FrameBuilder {
    bins: Vec<(i8, i8)>,
}

impl FrameBuilder {
    /// A silent frame with `bins` complex bins
    pub fn silent(bins: usize) -> Self {
        Self {
            bins: vec![(0, 0); bins],
        }
    }

    /// Set one bin's components
    pub fn bin(mut self, index: usize, re: i8, im: i8) -> Self {
        self.bins[index] = (re, im);
        self
    }

    /// Set one bin to a purely real value
    pub fn real(self, index: usize, re: i8) -> Self {
        self.bin(index, re, 0)
    }

    pub fn build(self) -> Vec<u8> {
        self.bins
            .into_iter()
            .flat_map(|(re, im)| [re as u8, im as u8])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::silent(3).bin(1, -3, 4).real(2, 7).build();
        assert_eq!(frame, vec![0, 0, 0xFD, 4, 7, 0]);
    }
}

/// In-place sample processors run on the real-time callback thread.
///
/// Implementations must be bounded, allocation-free and lock-free: they are
/// called once per hardware callback with the block the device just
/// delivered.
pub trait SampleProcessor {
    fn process(&self, block: &mut [i16]);
}

/// Passthrough: leaves every sample untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassProcessor;

impl SampleProcessor for BypassProcessor {
    #[inline]
    fn process(&self, _block: &mut [i16]) {}
}

/// Fixed-gain amplifier with saturation to the 16-bit range.
#[derive(Debug, Clone, Copy)]
pub struct AmplifyProcessor {
    gain: f32,
}

impl AmplifyProcessor {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl SampleProcessor for AmplifyProcessor {
    #[inline]
    fn process(&self, block: &mut [i16]) {
        // Whole-number gains stay in integer arithmetic.
        if self.gain.fract() == 0.0 && self.gain.abs() <= i32::MAX as f32 {
            let gain = self.gain as i32;
            for sample in block.iter_mut() {
                *sample = saturating_gain_i32(*sample, gain);
            }
        } else {
            for sample in block.iter_mut() {
                *sample = saturating_gain_f32(*sample, self.gain);
            }
        }
    }
}

/// `clamp(sample * gain, i16::MIN, i16::MAX)` in integer arithmetic.
#[inline]
pub fn saturating_gain_i32(sample: i16, gain: i32) -> i16 {
    let amplified = (sample as i32).saturating_mul(gain);
    amplified.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// `clamp(round(sample * gain), i16::MIN, i16::MAX)`; NaN maps to silence.
#[inline]
pub fn saturating_gain_f32(sample: i16, gain: f32) -> i16 {
    let amplified = (sample as f32 * gain).round();
    // `as` saturates float-to-int casts and maps NaN to 0.
    amplified as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_is_identity() {
        let original = vec![0, 1, -1, 12345, -12345, i16::MAX, i16::MIN];
        let mut block = original.clone();
        BypassProcessor.process(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn amplify_doubles_in_range_samples() {
        let mut block = vec![0, 100, -100, 10000, -16384];
        AmplifyProcessor::new(2.0).process(&mut block);
        assert_eq!(block, vec![0, 200, -200, 20000, -32768]);
    }

    #[test]
    fn amplify_saturates_instead_of_wrapping() {
        let mut block = vec![20000, -20000, i16::MAX, i16::MIN, 16384, -16385];
        AmplifyProcessor::new(2.0).process(&mut block);
        assert_eq!(block, vec![32767, -32768, 32767, -32768, 32767, -32768]);
    }

    #[test]
    fn amplify_matches_clamped_product_for_all_samples() {
        for gain in [2i32, 3, 7] {
            for s in (i16::MIN..=i16::MAX).step_by(97) {
                let expected = (s as i32 * gain).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                let mut block = [s];
                AmplifyProcessor::new(gain as f32).process(&mut block);
                assert_eq!(block[0], expected, "sample {} gain {}", s, gain);
            }
        }
    }

    #[test]
    fn fractional_gain_rounds_and_saturates() {
        let mut block = vec![1000, -1000, 30000, 3];
        AmplifyProcessor::new(1.5).process(&mut block);
        assert_eq!(block, vec![1500, -1500, 32767, 5]);
    }

    #[test]
    fn unity_gain_is_identity() {
        let mut block = vec![i16::MIN, -1, 0, 1, i16::MAX];
        AmplifyProcessor::new(1.0).process(&mut block);
        assert_eq!(block, vec![i16::MIN, -1, 0, 1, i16::MAX]);
    }

    #[test]
    fn empty_block_is_noop() {
        let mut block: Vec<i16> = Vec::new();
        AmplifyProcessor::new(2.0).process(&mut block);
        assert!(block.is_empty());
    }
}

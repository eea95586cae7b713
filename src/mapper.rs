//! Value mapping: exponential smoothing and linear re-ranging.
//!
//! Every sensor sample passes through a per-channel [`Smoother`] and is then
//! rescaled from the channel's input range to its output range, clamped and
//! rounded to an integer (output values are 7-bit-style MIDI magnitudes).

use serde::{Deserialize, Serialize};

/// An inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the range. Zero or negative widths are rejected at channel
    /// registration time, so mapping never divides by zero.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Linear interpolation: `a + t * (b - a)`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}

/// Exponential smoothing state for one channel.
///
/// The filter seeds itself from the first observed raw value rather than zero,
/// so a channel that idles high does not ramp in from the bottom of its range.
#[derive(Debug, Clone, Default)]
pub struct Smoother {
    previous: Option<f64>,
}

impl Smoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blend `raw` into the running value. `smoothing` is in (0, 1]; 1 means
    /// no smoothing at all.
    pub fn apply(&mut self, raw: f64, smoothing: f64) -> f64 {
        let previous = self.previous.unwrap_or(raw);
        let smoothed = lerp(previous, raw, smoothing);
        self.previous = Some(smoothed);
        smoothed
    }

    /// Forget the running value; the next sample re-seeds the filter.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Rescale `value` from `input` to `output`, clamp to the output range and
/// round to the nearest integer.
pub fn rescale(value: f64, input: Range, output: Range) -> i32 {
    let t = (value - input.min) / input.width();
    let mapped = output.min + t * output.width();
    mapped.clamp(output.min, output.max).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lerp_endpoints() {
        assert_eq!(lerp(0.0, 10.0, 0.0), 0.0);
        assert_eq!(lerp(0.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp(0.0, 10.0, 0.5), 5.0);
    }

    #[test]
    fn rescale_full_scale() {
        let input = Range::new(0.0, 1023.0);
        let output = Range::new(0.0, 127.0);
        assert_eq!(rescale(0.0, input, output), 0);
        assert_eq!(rescale(1023.0, input, output), 127);
    }

    #[test]
    fn rescale_rounds_to_nearest() {
        // 75 * 127 / 1023 = 9.31 -> 9
        let input = Range::new(0.0, 1023.0);
        let output = Range::new(0.0, 127.0);
        assert_eq!(rescale(75.0, input, output), 9);
    }

    #[test]
    fn rescale_clamps_out_of_range_input() {
        let input = Range::new(0.0, 1023.0);
        let output = Range::new(0.0, 127.0);
        assert_eq!(rescale(-500.0, input, output), 0);
        assert_eq!(rescale(5000.0, input, output), 127);
    }

    #[test]
    fn smoother_seeds_from_first_sample() {
        let mut s = Smoother::new();
        assert_eq!(s.apply(512.0, 0.1), 512.0);
        // Second sample blends towards the new value
        let next = s.apply(0.0, 0.1);
        assert!((next - 460.8).abs() < 1e-9);
    }

    #[test]
    fn smoother_passthrough_at_one() {
        let mut s = Smoother::new();
        s.apply(100.0, 1.0);
        assert_eq!(s.apply(42.0, 1.0), 42.0);
    }

    #[test]
    fn smoother_reset_reseeds() {
        let mut s = Smoother::new();
        s.apply(1000.0, 1.0);
        s.reset();
        assert_eq!(s.apply(3.0, 0.01), 3.0);
    }

    proptest! {
        /// Mapped output never leaves the output range, whatever the input.
        #[test]
        fn rescale_always_within_output_range(
            raw in -1.0e6_f64..1.0e6,
            smoothing in 0.001_f64..=1.0,
            seed in -1.0e6_f64..1.0e6,
        ) {
            let input = Range::new(0.0, 1023.0);
            let output = Range::new(0.0, 127.0);
            let mut s = Smoother::new();
            s.apply(seed, smoothing);
            let smoothed = s.apply(raw, smoothing);
            let out = rescale(smoothed, input, output);
            prop_assert!(out >= 0 && out <= 127);
        }
    }
}

//! Conversion of a blink frequency and duty cycle into on/off phase durations.

/// Cycle length used when the frequency is zero: one full on/off cycle per second.
pub const FALLBACK_CYCLE_MS: f64 = 1000.0;

/// On and off durations of one blink cycle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub on_ms: f64,
    pub off_ms: f64,
}

impl Phase {
    pub fn cycle_ms(&self) -> f64 {
        self.on_ms + self.off_ms
    }
}

/// Splits one blink cycle into its on and off parts.
///
/// A zero frequency falls back to a 1000 ms cycle instead of dividing by zero.
/// Inputs are expected to be validated already; a duty cycle above 100 is clamped so that
/// both durations stay non-negative.
pub fn plan(frequency_hz: u32, duty_cycle_percent: u8) -> Phase {
    let cycle_ms = if frequency_hz > 0 {
        1000.0 / f64::from(frequency_hz)
    } else {
        FALLBACK_CYCLE_MS
    };

    let on_ms = cycle_ms * f64::from(duty_cycle_percent.min(100)) / 100.0;

    Phase {
        on_ms,
        off_ms: cycle_ms - on_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOLERANCE_MS: f64 = 1e-3;

    #[test]
    fn half_duty_at_five_hertz() {
        let phase = plan(5, 50);
        assert_eq!(phase.cycle_ms(), 200.0);
        assert_eq!(phase.on_ms, 100.0);
        assert_eq!(phase.off_ms, 100.0);
    }

    #[test]
    fn zero_frequency_falls_back_to_one_second() {
        let phase = plan(0, 30);
        assert_eq!(phase.cycle_ms(), 1000.0);
        assert_eq!(phase.on_ms, 300.0);
        assert_eq!(phase.off_ms, 700.0);
    }

    #[test]
    fn extreme_duty_cycles_collapse_one_phase() {
        let always_off = plan(4, 0);
        assert_eq!(always_off.on_ms, 0.0);
        assert_eq!(always_off.off_ms, 250.0);

        let always_on = plan(4, 100);
        assert_eq!(always_on.on_ms, 250.0);
        assert_eq!(always_on.off_ms, 0.0);
    }

    proptest! {
        #[test]
        fn phases_fill_the_cycle(frequency in 0u32..=10, duty in 0u8..=100) {
            let phase = plan(frequency, duty);
            let cycle = if frequency == 0 { 1000.0 } else { 1000.0 / f64::from(frequency) };

            prop_assert!(phase.on_ms >= 0.0);
            prop_assert!(phase.off_ms >= 0.0);
            prop_assert!((phase.on_ms + phase.off_ms - cycle).abs() < TOLERANCE_MS);
        }
    }
}

/// Tracks elapsed pulses for one handler instance and derives a bounded
/// effectiveness multiplier: pulse n scales by
/// `clamp(1 + (n - 1) * step, lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseScaling {
    step: f64,
    lower: f64,
    upper: f64,
    pulses: u32,
}

impl PulseScaling {
    pub fn new(step: f64, lower: f64, upper: f64) -> Self {
        Self {
            step,
            lower,
            upper,
            pulses: 0,
        }
    }

    pub fn flat() -> Self {
        Self::new(0.0, 1.0, 1.0)
    }

    pub fn pulses(&self) -> u32 {
        self.pulses
    }

    /// Advance the pulse counter and return the multiplier for this pulse.
    pub fn next_multiplier(&mut self) -> f64 {
        self.pulses = self.pulses.saturating_add(1);
        self.multiplier_for(self.pulses)
    }

    pub fn multiplier_for(&self, pulse: u32) -> f64 {
        if pulse == 0 {
            return 1.0;
        }
        let raw = 1.0 + f64::from(pulse - 1) * self.step;
        raw.clamp(self.lower, self.upper)
    }

    pub fn reset(&mut self) {
        self.pulses = 0;
    }
}

//! Proportional position regulator over an accumulated feedback quantity.
//!
//! The accumulator integrates per-cycle feedback deltas (heading change in
//! mm of differential wheel travel, or travelled distance in mm). The output
//! is `clamp(gain * (goal - accumulator), -max_output, max_output)`.

/// Regulator state and tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regulator {
    accumulator: f64,
    gain: f64,
    max_output: f64,
    last_error: f64,
    last_output: f64,
}

impl Regulator {
    pub const fn new(gain: f64, max_output: f64) -> Self {
        Self {
            accumulator: 0.0,
            gain,
            max_output,
            last_error: 0.0,
            last_output: 0.0,
        }
    }

    /// Accumulate this cycle's feedback delta.
    #[inline]
    pub fn update_feedback(&mut self, delta: f64) {
        self.accumulator += delta;
    }

    /// Bounded proportional output against `goal`.
    #[inline]
    pub fn update_output(&mut self, goal: f64) -> f64 {
        self.last_error = goal - self.accumulator;
        self.last_output = (self.gain * self.last_error).clamp(-self.max_output, self.max_output);
        self.last_output
    }

    /// `update_feedback` then `update_output`.
    #[inline]
    pub fn update(&mut self, goal: f64, feedback_delta: f64) -> f64 {
        self.update_feedback(feedback_delta);
        self.update_output(goal)
    }

    /// Zero the accumulator and the last error/output.
    #[inline]
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.last_error = 0.0;
        self.last_output = 0.0;
    }

    /// Shift the accumulator origin by `offset` (accumulator -= offset).
    ///
    /// Used when a new segment starts so that the goal is expressed relative
    /// to the current position.
    #[inline]
    pub fn rebase(&mut self, offset: f64) {
        self.accumulator -= offset;
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
    }

    pub fn set_max_output(&mut self, max_output: f64) {
        self.max_output = max_output;
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn max_output(&self) -> f64 {
        self.max_output
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

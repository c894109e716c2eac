//! Software phase-locked loop tracking one encoder count stream.
//!
//! Second-order tracking loop: the estimated position is predicted from the
//! estimated speed, then both are corrected by the count error. With
//! `kp = 2·bw` and `ki = kp²/4` the loop is critically damped.
//!
//! ```text
//! count    += delta
//! position += speed·dt
//! err       = count − position
//! position += kp·dt·err
//! speed    += ki·dt·err
//! ```

/// PLL estimator state for one axis. Units are encoder ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PllEstimator {
    position: f64,
    speed: f64,
    kp: f64,
    ki: f64,
    count: i64,
}

impl PllEstimator {
    /// Estimator tuned for `bandwidth` [rad/s].
    pub fn new(bandwidth: f64) -> Self {
        let mut pll = Self {
            position: 0.0,
            speed: 0.0,
            kp: 0.0,
            ki: 0.0,
            count: 0,
        };
        pll.set_bandwidth(bandwidth);
        pll
    }

    /// Critically damped gains for `bandwidth` [rad/s].
    pub fn set_bandwidth(&mut self, bandwidth: f64) {
        self.kp = 2.0 * bandwidth;
        self.ki = 0.25 * self.kp * self.kp;
    }

    /// Feed one sample of `delta_count` ticks taken `dt` seconds after the last.
    #[inline]
    pub fn update(&mut self, delta_count: i16, dt: f64) {
        self.count += i64::from(delta_count);
        self.position += self.speed * dt;

        let err = self.count as f64 - self.position;
        self.position += self.kp * dt * err;
        self.speed += self.ki * dt * err;
    }

    /// Estimated speed [ticks/s].
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Estimated position [ticks].
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Raw accumulated count [ticks].
    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn gains(&self) -> (f64, f64) {
        (self.kp, self.ki)
    }

    /// Zero position, speed and count; gains are kept.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.speed = 0.0;
        self.count = 0;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

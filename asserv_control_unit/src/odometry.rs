//! Dead-reckoning pose integration from per-wheel displacement.
//!
//! Midpoint (second-order) integration: the translation of one cycle is
//! applied along the heading halfway through the cycle's rotation. The
//! heading is never renormalized.

use asserv_common::motion::types::Pose;

/// Pose integrator for a differential-drive base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odometry {
    pose: Pose,
    wheelbase_mm: f64,
}

impl Odometry {
    pub const fn new(wheelbase_mm: f64) -> Self {
        Self {
            pose: Pose::new(0.0, 0.0, 0.0),
            wheelbase_mm,
        }
    }

    /// Integrate one cycle of wheel displacement [mm].
    #[inline]
    pub fn refresh(&mut self, right_mm: f64, left_mm: f64) {
        let d_theta = (right_mm - left_mm) / self.wheelbase_mm;
        let d_center = 0.5 * (right_mm + left_mm);
        let mid = self.pose.theta_rad + 0.5 * d_theta;

        self.pose.x_mm += d_center * mid.cos();
        self.pose.y_mm += d_center * mid.sin();
        self.pose.theta_rad += d_theta;
    }

    /// Back to the origin.
    pub fn reset(&mut self) {
        self.pose = Pose::default();
    }

    /// Set an explicit pose (e.g. after a border recalibration).
    pub fn reset_to(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn x(&self) -> f64 {
        self.pose.x_mm
    }

    pub fn y(&self) -> f64 {
        self.pose.y_mm
    }

    pub fn theta(&self) -> f64 {
        self.pose.theta_rad
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn wheelbase_mm(&self) -> f64 {
        self.wheelbase_mm
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

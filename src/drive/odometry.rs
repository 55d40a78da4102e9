// Pose estimation from IMU heading and wheel distances
//
// The IMU heading is authoritative; the wheel encoders only contribute
// distance travelled. Displacement between samples is integrated along an
// arc so turning while driving does not cut corners.
//
// The first heading seen after construction or a pose reset is pinned to
// the pose's heading; later samples rotate the pose by how far the IMU has
// turned since then.

use tracing::{debug, warn};

use crate::messages::Pose;

/// Wrap an angle in degrees into (-180, 180]
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle % 360.0;
    if wrapped > 180.0 {
        wrapped - 360.0
    } else if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Differential-drive odometry
#[derive(Debug, Clone)]
pub struct OdometryEstimator {
    pose: Pose,
    heading_offset_deg: f64,
    max_step: Option<f64>,
    last_left: f64,
    last_right: f64,
    // Pose heading the anchor maps onto
    heading_origin_deg: f64,
    // Effective IMU heading at the first sample after construction or a pose reset
    heading_anchor_deg: Option<f64>,
    // None until the first sample after construction or a baseline reset
    last_heading_deg: Option<f64>,
}

impl OdometryEstimator {
    /// Create an estimator starting at `initial_pose`
    ///
    /// `heading_offset_deg` is the baseline of the mounting correction
    /// `effective = offset - raw`.
    pub fn new(initial_pose: Pose, heading_offset_deg: f64) -> Self {
        Self {
            pose: initial_pose,
            heading_offset_deg,
            max_step: None,
            last_left: 0.0,
            last_right: 0.0,
            heading_origin_deg: initial_pose.heading_deg,
            heading_anchor_deg: None,
            last_heading_deg: None,
        }
    }

    /// Treat per-cycle travel above `max_step` as an unannounced encoder reset
    pub fn with_max_step(mut self, max_step: Option<f64>) -> Self {
        self.max_step = max_step;
        self
    }

    /// Convert a raw IMU angle into the odometry frame
    pub fn effective_heading(&self, raw_heading_deg: f64) -> f64 {
        normalize_degrees(self.heading_offset_deg - raw_heading_deg)
    }

    /// Integrate a new sample and return the updated pose
    pub fn update(&mut self, raw_heading_deg: f64, left_distance: f64, right_distance: f64) -> Pose {
        let effective = self.effective_heading(raw_heading_deg);
        let anchor = *self.heading_anchor_deg.get_or_insert(effective);
        let heading = normalize_degrees(self.heading_origin_deg + effective - anchor);

        let delta_left = left_distance - self.last_left;
        let delta_right = right_distance - self.last_right;
        let forward = (delta_left + delta_right) / 2.0;

        self.last_left = left_distance;
        self.last_right = right_distance;

        if let Some(max_step) = self.max_step {
            if forward.abs() > max_step {
                warn!(
                    "Wheel travel of {:.3} in one cycle exceeds {:.3}, re-baselining odometry",
                    forward, max_step
                );
                self.pose.heading_deg = heading;
                self.last_heading_deg = Some(heading);
                return self.pose;
            }
        }

        let start_heading = self.last_heading_deg.unwrap_or(heading);
        let dtheta = normalize_degrees(heading - start_heading).to_radians();

        // Pose exponential for a twist of (forward, 0, dtheta)
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };
        let dx = forward * s;
        let dy = forward * c;

        let (sin_h, cos_h) = start_heading.to_radians().sin_cos();
        self.pose.x += dx * cos_h - dy * sin_h;
        self.pose.y += dx * sin_h + dy * cos_h;
        self.pose.heading_deg = heading;
        self.last_heading_deg = Some(heading);

        debug!(
            "Odometry: x={:.3}, y={:.3}, heading={:.1}",
            self.pose.x, self.pose.y, self.pose.heading_deg
        );
        self.pose
    }

    /// Measure the next deltas from zero distance, after the encoders were reset
    pub fn reset_baseline(&mut self) {
        self.last_left = 0.0;
        self.last_right = 0.0;
        self.last_heading_deg = None;
    }

    /// Overwrite the pose and start a fresh baseline
    ///
    /// The next sample's heading is pinned to `pose.heading_deg`.
    pub fn reset_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.heading_origin_deg = pose.heading_deg;
        self.heading_anchor_deg = None;
        self.reset_baseline();
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn heading_offset_deg(&self) -> f64 {
        self.heading_offset_deg
    }
}

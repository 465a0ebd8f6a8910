//! Steering-wheel emulation from two motion-sensor axes.
//!
//! The rotation angle comes from a three-point calibrated geometry: a center
//! anchor and one reference point per side at ±90°, each side with its own
//! circle center. The sample picks the side it falls on, and the angle
//! between the circle-center→center-anchor and circle-center→sample vectors
//! (dot-product formula) gives the magnitude, signed negative-left.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::bindings::WheelConfig;
use crate::controls::AXIS_NEUTRAL;

/// Hold this long with low angular velocity to record an anchor.
pub const ANCHOR_HOLD: Duration = Duration::from_secs(1);
/// Sample-space distance below which the wheel counts as stationary.
const STABILITY_EPS: f64 = 8.0;
/// Anchor radius for the uncalibrated fallback geometry.
const FALLBACK_RADIUS: f64 = 1024.0;

pub const ANCHOR_CENTER: u8 = 1;
pub const ANCHOR_RIGHT: u8 = 2;
pub const ANCHOR_LEFT: u8 = 4;
const ANCHOR_ALL: u8 = ANCHOR_CENTER | ANCHOR_RIGHT | ANCHOR_LEFT;

/// Coarse calibration flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationPhase {
    #[default]
    Idle,
    Activating,
    Recording,
    Completing,
    Cancelling,
}

type Point = (f64, f64);

/// Calibrated anchor geometry.
#[derive(Debug, Clone, Copy, Default)]
struct Anchors {
    center: Point,
    right90: Point,
    left90: Point,
    circle_right: Point,
    circle_left: Point,
}

impl Anchors {
    /// Educated-guess geometry for an uncalibrated wheel.
    fn fallback() -> Self {
        let mut anchors = Self {
            center: (0.0, FALLBACK_RADIUS),
            right90: (FALLBACK_RADIUS, 0.0),
            left90: (-FALLBACK_RADIUS, 0.0),
            ..Self::default()
        };
        anchors.recompute_circles();
        anchors
    }

    fn recompute_circles(&mut self) {
        self.circle_right = circle_center(self.center, self.right90, true);
        self.circle_left = circle_center(self.center, self.left90, false);
    }
}

/// Center of the 90°-arc circle through the center anchor and one side
/// anchor. The perpendicular offset side differs per rotation direction.
fn circle_center(center: Point, side90: Point, right: bool) -> Point {
    let dx = side90.0 - center.0;
    let dy = side90.1 - center.1;
    let mx = (center.0 + side90.0) / 2.0;
    let my = (center.1 + side90.1) / 2.0;
    if right {
        (mx + dy / 2.0, my - dx / 2.0)
    } else {
        (mx - dy / 2.0, my + dx / 2.0)
    }
}

/// Per-device steering-wheel state: calibration anchors, the multi-turn
/// counter and the calibration flow.
#[derive(Debug, Clone)]
pub struct WheelState {
    anchors: Anchors,
    mask: u8,
    phase: CalibrationPhase,
    /// Full turns accumulated past the ±180° wrap.
    turns: i32,
    last_angle: f64,
    /// Provisional anchors being recorded.
    pending: Anchors,
    pending_mask: u8,
    stable_since: Option<Instant>,
    last_sample: Point,
    confirm_was_down: bool,
    warned_uncalibrated: bool,
}

impl Default for WheelState {
    fn default() -> Self {
        Self {
            anchors: Anchors::fallback(),
            mask: 0,
            phase: CalibrationPhase::Idle,
            turns: 0,
            last_angle: 0.0,
            pending: Anchors::default(),
            pending_mask: 0,
            stable_since: None,
            last_sample: (0.0, 0.0),
            confirm_was_down: false,
            warned_uncalibrated: false,
        }
    }
}

impl WheelState {
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Anchor bits currently recorded (calibrating) or committed.
    pub fn anchor_mask(&self) -> u8 {
        if self.phase == CalibrationPhase::Recording {
            self.pending_mask
        } else {
            self.mask
        }
    }

    pub fn calibrated(&self) -> bool {
        self.mask == ANCHOR_ALL
    }

    /// Signed, deadzone-subtracted, multi-turn rotation in degrees, clamped
    /// to half the configured range per side.
    pub fn angle(&mut self, sample_x: i32, sample_z: i32, config: &WheelConfig) -> f64 {
        if !self.calibrated() && !self.warned_uncalibrated {
            self.warned_uncalibrated = true;
            warn!("steering wheel used before calibration, using fallback anchors");
        }
        let sample = (sample_x as f64, sample_z as f64);
        let base = self.base_angle(sample);

        // Deadzone is subtracted, not clipped, so the band edge stays smooth.
        let shaped = if base.abs() <= config.deadzone_degrees {
            0.0
        } else {
            (base.abs() - config.deadzone_degrees) * base.signum()
        };

        let half_range = config.range_degrees / 2.0;
        let value = if config.range_degrees > 360.0 {
            if self.last_angle > 90.0 && shaped < -90.0 {
                self.turns += 1;
            } else if self.last_angle < -90.0 && shaped > 90.0 {
                self.turns -= 1;
            }
            self.last_angle = shaped;
            self.turns as f64 * 360.0 + shaped
        } else {
            self.last_angle = shaped;
            shaped
        };
        value.clamp(-half_range, half_range)
    }

    /// Axis byte for the current rotation, 128 = centered.
    pub fn to_axis(&mut self, sample_x: i32, sample_z: i32, config: &WheelConfig) -> u8 {
        let half_range = config.range_degrees / 2.0;
        let ratio = self.angle(sample_x, sample_z, config) / half_range;
        let offset = (ratio.clamp(-1.0, 1.0) * 127.0).trunc() as i16;
        (AXIS_NEUTRAL as i16 + offset).clamp(0, 255) as u8
    }

    /// Raw signed angle against the calibrated geometry.
    fn base_angle(&self, sample: Point) -> f64 {
        let right_side = sample.0 >= self.anchors.center.0;
        let (circle, sign) = if right_side {
            (self.anchors.circle_right, 1.0)
        } else {
            (self.anchors.circle_left, -1.0)
        };
        let v1 = (
            self.anchors.center.0 - circle.0,
            self.anchors.center.1 - circle.1,
        );
        let v2 = (sample.0 - circle.0, sample.1 - circle.1);
        let m1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
        let m2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
        if m1 <= f64::EPSILON || m2 <= f64::EPSILON {
            return 0.0;
        }
        let cos = ((v1.0 * v2.0 + v1.1 * v2.1) / (m1 * m2)).clamp(-1.0, 1.0);
        sign * cos.acos().to_degrees()
    }

    /// Enters the calibration flow: clears recorded anchors and seeds a
    /// provisional center from the current position.
    pub fn start_calibration(&mut self, sample_x: i32, sample_z: i32) {
        self.phase = CalibrationPhase::Activating;
        self.pending = Anchors::default();
        self.pending_mask = 0;
        self.pending.center = (sample_x as f64, sample_z as f64);
        self.stable_since = None;
        self.confirm_was_down = false;
        self.phase = CalibrationPhase::Recording;
    }

    /// One recording step. A stable hold longer than [`ANCHOR_HOLD`] plus a
    /// confirm press edge records the next unset anchor, in the order
    /// center, right-90, left-90. Returns the anchor bit just set, if any.
    pub fn calibrate_step(
        &mut self,
        sample_x: i32,
        sample_z: i32,
        confirm: bool,
        now: Instant,
    ) -> Option<u8> {
        if self.phase != CalibrationPhase::Recording {
            return None;
        }
        let sample = (sample_x as f64, sample_z as f64);
        let moved = (sample.0 - self.last_sample.0).abs() + (sample.1 - self.last_sample.1).abs();
        self.last_sample = sample;
        if moved > STABILITY_EPS {
            self.stable_since = None;
        } else if self.stable_since.is_none() {
            self.stable_since = Some(now);
        }

        let confirm_edge = confirm && !self.confirm_was_down;
        self.confirm_was_down = confirm;

        let stable = self
            .stable_since
            .is_some_and(|since| now.duration_since(since) >= ANCHOR_HOLD);
        if !(stable && confirm_edge) {
            return None;
        }

        let bit = if self.pending_mask & ANCHOR_CENTER == 0 {
            self.pending.center = sample;
            ANCHOR_CENTER
        } else if self.pending_mask & ANCHOR_RIGHT == 0 {
            self.pending.right90 = sample;
            ANCHOR_RIGHT
        } else if self.pending_mask & ANCHOR_LEFT == 0 {
            self.pending.left90 = sample;
            ANCHOR_LEFT
        } else {
            return None;
        };
        self.pending_mask |= bit;
        Some(bit)
    }

    /// Commits the recorded anchors. Accepted only when all three anchor
    /// bits are set; anything less resets to uncalibrated.
    pub fn finish_calibration(&mut self) -> bool {
        self.phase = CalibrationPhase::Completing;
        let accepted = self.pending_mask == ANCHOR_ALL;
        if accepted {
            self.anchors = self.pending;
            self.anchors.recompute_circles();
            self.mask = ANCHOR_ALL;
            self.turns = 0;
            self.last_angle = 0.0;
        } else {
            self.anchors = Anchors::fallback();
            self.mask = 0;
        }
        self.pending = Anchors::default();
        self.pending_mask = 0;
        self.phase = CalibrationPhase::Idle;
        accepted
    }

    /// Abandons the flow, keeping whatever calibration was committed before.
    pub fn cancel_calibration(&mut self) {
        self.phase = CalibrationPhase::Cancelling;
        self.pending = Anchors::default();
        self.pending_mask = 0;
        self.phase = CalibrationPhase::Idle;
    }

    /// Lightbar feedback during calibration: one color tier per recorded
    /// anchor, flashing while the wheel sits on an already-set anchor.
    pub fn calibration_feedback(&self, sample_x: i32, sample_z: i32) -> ([u8; 3], bool) {
        let color = match self.anchor_mask().count_ones() {
            0 => [255, 0, 0],
            1 => [255, 255, 0],
            2 => [0, 0, 255],
            _ => [0, 255, 0],
        };
        let sample = (sample_x as f64, sample_z as f64);
        let near = |p: Point, set: u8| {
            self.anchor_mask() & set != 0
                && (sample.0 - p.0).abs() + (sample.1 - p.1).abs() <= STABILITY_EPS
        };
        let anchors = if self.phase == CalibrationPhase::Recording {
            &self.pending
        } else {
            &self.anchors
        };
        let flash = near(anchors.center, ANCHOR_CENTER)
            || near(anchors.right90, ANCHOR_RIGHT)
            || near(anchors.left90, ANCHOR_LEFT);
        (color, flash)
    }
}

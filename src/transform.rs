//! Deadzone/curve/sensitivity transform pipeline.
//!
//! Applies the per-axis shaping stages to stick, trigger and gyro values in a
//! fixed order: rotation, legacy curve blend, deadzone/antideadzone/maxzone,
//! sensitivity, square-stick warp, output curve. All arithmetic is
//! floating-point internally and truncated to the integer range at the end of
//! each stage. The clamp order is load-bearing: existing profiles depend on
//! the exact truncation points, so stages must not be reordered or fused.

use serde::{Deserialize, Serialize};

use crate::controls::AXIS_NEUTRAL;
use crate::curve::{BezierParams, OutputCurve};

/// Full-scale stick deflection in centered coordinates.
const STICK_MAX: f64 = 127.0;
/// Full-scale trigger travel.
const TRIGGER_MAX: f64 = 255.0;
/// Full-scale gyro tilt in sensor units.
const GYRO_MAX: f64 = 128.0;

/// Square-stick warp parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareStickSettings {
    /// Exponent blending raw vs. squared position; higher keeps the center
    /// round and only squares the rim.
    pub roundness: f64,
}

impl Default for SquareStickSettings {
    fn default() -> Self {
        Self { roundness: 5.0 }
    }
}

/// Output-curve selector in profile form, resolved once at load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CurveMode {
    #[default]
    Linear,
    EnhancedPrecision,
    Quadratic,
    Cubic,
    EaseOutQuad,
    EaseOutCubic,
    Bezier,
}

impl CurveMode {
    /// Resolves the selector to an evaluatable curve. Bezier builds its
    /// lookup table here, never on the report thread.
    pub fn resolve(self, bezier: Option<BezierParams>) -> OutputCurve {
        match self {
            CurveMode::Linear => OutputCurve::Linear,
            CurveMode::EnhancedPrecision => OutputCurve::EnhancedPrecision,
            CurveMode::Quadratic => OutputCurve::Quadratic,
            CurveMode::Cubic => OutputCurve::Cubic,
            CurveMode::EaseOutQuad => OutputCurve::EaseOutQuad,
            CurveMode::EaseOutCubic => OutputCurve::EaseOutCubic,
            CurveMode::Bezier => OutputCurve::Bezier(crate::curve::CurveLut::from_bezier(
                &bezier.unwrap_or_else(BezierParams::ease_in_out),
            )),
        }
    }
}

/// Per-stick shaping configuration, magnitudes as fractions of full scale.
#[derive(Debug, Clone, PartialEq)]
pub struct StickSettings {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub maxzone: f64,
    pub maxoutput: f64,
    pub sensitivity: f64,
    /// Rotation applied to the raw sample, degrees.
    pub rotation: f64,
    /// Legacy two-axis curve blend toward circular max bounds, 0 disables.
    pub curve_blend: f64,
    pub square_stick: Option<SquareStickSettings>,
    pub output_curve: OutputCurve,
}

impl Default for StickSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            maxzone: 1.0,
            maxoutput: 1.0,
            sensitivity: 1.0,
            rotation: 0.0,
            curve_blend: 0.0,
            square_stick: None,
            output_curve: OutputCurve::Linear,
        }
    }
}

/// Per-trigger shaping configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSettings {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub maxzone: f64,
    pub maxoutput: f64,
    pub sensitivity: f64,
    pub output_curve: OutputCurve,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            maxzone: 1.0,
            maxoutput: 1.0,
            sensitivity: 1.0,
            output_curve: OutputCurve::Linear,
        }
    }
}

/// Per-gyro-axis shaping configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GyroSettings {
    pub deadzone: f64,
    pub antideadzone: f64,
    pub sensitivity: f64,
    pub output_curve: OutputCurve,
}

impl Default for GyroSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            antideadzone: 0.0,
            sensitivity: 1.0,
            output_curve: OutputCurve::Linear,
        }
    }
}

/// Transforms one stick sample, bytes in, bytes out (128 = neutral).
pub fn transform_stick(x: u8, y: u8, settings: &StickSettings) -> (u8, u8) {
    let mut dx = x as f64 - AXIS_NEUTRAL as f64;
    let mut dy = y as f64 - AXIS_NEUTRAL as f64;

    // Stage 1: rotation.
    if settings.rotation != 0.0 {
        let rad = settings.rotation.to_radians();
        let (sin, cos) = rad.sin_cos();
        let rx = dx * cos - dy * sin;
        let ry = dx * sin + dy * cos;
        dx = rx.trunc();
        dy = ry.trunc();
    }

    // Stage 2: legacy curve blend toward the circular bound at the sample's
    // own angle, weighted by current magnitude.
    if settings.curve_blend > 0.0 {
        let angle = dy.atan2(dx);
        let mag = (dx * dx + dy * dy).sqrt().min(STICK_MAX) / STICK_MAX;
        let f = settings.curve_blend.clamp(0.0, 1.0) * mag;
        dx = (dx + f * (STICK_MAX * angle.cos() - dx)).trunc();
        dy = (dy + f * (STICK_MAX * angle.sin() - dy)).trunc();
    }

    // Stage 3: deadzone/antideadzone/maxzone, elliptical via |cos|/|sin|.
    let angle = dy.atan2(dx);
    let (sin, cos) = angle.sin_cos();
    let (wx, wy) = (cos.abs(), sin.abs());
    let radial = (dx * dx + dy * dy).sqrt();
    if radial <= settings.deadzone * STICK_MAX {
        return (AXIS_NEUTRAL, AXIS_NEUTRAL);
    }
    dx = shape_axis(dx, wx, settings);
    dy = shape_axis(dy, wy, settings);

    // Stage 4: sensitivity around neutral.
    if settings.sensitivity != 1.0 {
        dx = (dx * settings.sensitivity).trunc();
        dy = (dy * settings.sensitivity).trunc();
    }

    // Stage 5: square-stick warp.
    if let Some(square) = &settings.square_stick {
        let angle = dy.atan2(dx);
        let (sin, cos) = angle.sin_cos();
        let r = ((dx * dx + dy * dy).sqrt() / STICK_MAX).min(1.0);
        if r > 0.0 {
            let wall = 1.0 / cos.abs().max(sin.abs()).max(1e-9);
            let blend = r.powf(square.roundness.max(0.0));
            let warped = (r * (1.0 + (wall - 1.0) * blend)).min(wall);
            dx = (cos * warped * STICK_MAX).trunc();
            dy = (sin * warped * STICK_MAX).trunc();
        }
    }

    // Stage 6: output curve, sign preserved.
    dx = (settings.output_curve.apply(dx / STICK_MAX) * STICK_MAX).trunc();
    dy = (settings.output_curve.apply(dy / STICK_MAX) * STICK_MAX).trunc();

    (recenter(dx), recenter(dy))
}

/// One axis of stage 3: boundary scaling by the angular weight.
///
/// A degenerate maxzone band (zero width after weighting) degrades to
/// neutral rather than dividing by zero.
fn shape_axis(value: f64, weight: f64, settings: &StickSettings) -> f64 {
    let dz = settings.deadzone * STICK_MAX * weight;
    let mz = settings.maxzone * STICK_MAX * weight;
    let span = mz - dz;
    if span <= 0.0 {
        return 0.0;
    }

    let sign = if value < 0.0 { -1.0 } else { 1.0 };
    let clipped = value.abs().min(mz);
    let ratio = ((clipped - dz) / span).clamp(0.0, 1.0);
    let out = settings.antideadzone + ratio * (settings.maxoutput - settings.antideadzone);
    (sign * out * STICK_MAX * weight).trunc()
}

/// Transforms one trigger byte (0 = released).
pub fn transform_trigger(value: u8, settings: &TriggerSettings) -> u8 {
    let dz = settings.deadzone * TRIGGER_MAX;
    let mz = settings.maxzone * TRIGGER_MAX;
    let span = mz - dz;

    let raw = value as f64;
    let mut out = if raw <= dz || span <= 0.0 {
        0.0
    } else {
        let ratio = ((raw.min(mz) - dz) / span).clamp(0.0, 1.0);
        let scaled = settings.antideadzone + ratio * (settings.maxoutput - settings.antideadzone);
        (scaled * TRIGGER_MAX).trunc()
    };

    if settings.sensitivity != 1.0 {
        out = (out * settings.sensitivity).trunc().min(TRIGGER_MAX);
    }

    out = (settings.output_curve.apply(out / TRIGGER_MAX) * TRIGGER_MAX).trunc();
    out.clamp(0.0, TRIGGER_MAX) as u8
}

/// Transforms one signed gyro axis in sensor units.
pub fn transform_gyro(value: i32, settings: &GyroSettings) -> i32 {
    let sign = if value < 0 { -1.0 } else { 1.0 };
    let normalized = (value.abs() as f64 / GYRO_MAX).min(1.0);

    let dz = settings.deadzone;
    let span = 1.0 - dz;
    let mut out = if normalized <= dz || span <= 0.0 {
        0.0
    } else {
        let ratio = ((normalized - dz) / span).clamp(0.0, 1.0);
        settings.antideadzone + ratio * (1.0 - settings.antideadzone)
    };

    if settings.sensitivity != 1.0 {
        out = (out * settings.sensitivity).min(1.0);
    }

    out = settings.output_curve.apply(out);
    (sign * (out * GYRO_MAX).trunc()) as i32
}

/// Back to byte space around the 128 neutral.
#[inline]
fn recenter(centered: f64) -> u8 {
    (centered.clamp(-(AXIS_NEUTRAL as f64), STICK_MAX) + AXIS_NEUTRAL as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_right_passes_through() {
        // Square-stick disabled, deadzone 0, identity curve.
        let settings = StickSettings::default();
        let (x, y) = transform_stick(255, 128, &settings);
        assert_eq!(x, 255);
        assert_eq!(y, 128);
    }

    #[test]
    fn test_neutral_stays_neutral() {
        let settings = StickSettings {
            deadzone: 0.1,
            ..StickSettings::default()
        };
        assert_eq!(transform_stick(128, 128, &settings), (128, 128));
    }

    #[test]
    fn test_inside_deadzone_forced_neutral() {
        let settings = StickSettings {
            deadzone: 0.25,
            ..StickSettings::default()
        };
        // 20/127 is well inside the 25% band.
        assert_eq!(transform_stick(148, 128, &settings), (128, 128));
    }

    #[test]
    fn test_deadzone_monotonicity() {
        let settings = StickSettings {
            deadzone: 0.15,
            antideadzone: 0.1,
            maxzone: 0.9,
            ..StickSettings::default()
        };
        let mut prev = 0u8;
        for raw in 128..=255u16 {
            let (x, _) = transform_stick(raw as u8, 128, &settings);
            let mag = x.abs_diff(AXIS_NEUTRAL);
            assert!(mag >= prev, "magnitude dropped at raw={raw}");
            prev = mag;
        }
    }

    #[test]
    fn test_antideadzone_floor() {
        let settings = StickSettings {
            deadzone: 0.2,
            antideadzone: 0.3,
            ..StickSettings::default()
        };
        // Just past the deadzone boundary the output jumps to the floor.
        let (x, _) = transform_stick(155, 128, &settings);
        assert!(x.abs_diff(AXIS_NEUTRAL) as f64 >= 0.3 * 127.0 - 1.0);
    }

    #[test]
    fn test_degenerate_maxzone_degrades_to_neutral() {
        let settings = StickSettings {
            deadzone: 0.5,
            maxzone: 0.5,
            ..StickSettings::default()
        };
        assert_eq!(transform_stick(255, 128, &settings), (128, 128));
    }

    #[test]
    fn test_square_stick_extends_diagonal() {
        let plain = StickSettings::default();
        let squared = StickSettings {
            square_stick: Some(SquareStickSettings { roundness: 2.0 }),
            ..StickSettings::default()
        };
        // Full diagonal deflection.
        let (px, py) = transform_stick(255, 255, &plain);
        let (sx, sy) = transform_stick(255, 255, &squared);
        assert!(sx >= px);
        assert!(sy >= py);
        assert!(sx > 240, "diagonal should approach full magnitude, got {sx}");
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let settings = StickSettings {
            rotation: 90.0,
            ..StickSettings::default()
        };
        // Full right rotated by +90 degrees lands on full down (+y).
        let (x, y) = transform_stick(255, 128, &settings);
        assert!(x.abs_diff(AXIS_NEUTRAL) <= 1);
        assert!(y > 250);
    }

    #[test]
    fn test_trigger_deadzone_and_max() {
        let settings = TriggerSettings {
            deadzone: 0.1,
            maxzone: 0.9,
            ..TriggerSettings::default()
        };
        assert_eq!(transform_trigger(0, &settings), 0);
        assert_eq!(transform_trigger(20, &settings), 0);
        assert_eq!(transform_trigger(255, &settings), 255);
        // Past the maxzone everything clamps to full.
        assert_eq!(transform_trigger(235, &settings), 255);
    }

    #[test]
    fn test_trigger_monotonicity() {
        let settings = TriggerSettings {
            deadzone: 0.05,
            antideadzone: 0.2,
            maxzone: 0.95,
            output_curve: OutputCurve::EaseOutQuad,
            ..TriggerSettings::default()
        };
        let mut prev = 0u8;
        for raw in 0..=255u16 {
            let out = transform_trigger(raw as u8, &settings);
            assert!(out >= prev, "trigger output dropped at raw={raw}");
            prev = out;
        }
    }

    #[test]
    fn test_gyro_sign_and_deadzone() {
        let settings = GyroSettings {
            deadzone: 0.1,
            ..GyroSettings::default()
        };
        assert_eq!(transform_gyro(0, &settings), 0);
        assert_eq!(transform_gyro(5, &settings), 0);
        assert!(transform_gyro(100, &settings) > 0);
        assert!(transform_gyro(-100, &settings) < 0);
        assert_eq!(
            transform_gyro(100, &settings),
            -transform_gyro(-100, &settings)
        );
    }

    #[test]
    fn test_gyro_full_scale() {
        let settings = GyroSettings::default();
        assert_eq!(transform_gyro(128, &settings), 128);
        assert_eq!(transform_gyro(-128, &settings), -128);
    }
}

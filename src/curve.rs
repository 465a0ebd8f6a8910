//! Output curve family for the transform pipeline.
//!
//! Curves remap a normalized axis magnitude in [0, 1]; the pipeline applies
//! them symmetrically with the sign preserved. The Bezier variant is
//! precomputed into a lookup table at profile load so per-frame evaluation
//! stays O(1) on the report thread.

use serde::{Deserialize, Serialize};

/// Cubic Bezier control points for a custom output curve.
///
/// Endpoints are fixed at (0,0) and (1,1); the two inner points shape the
/// response. Coordinates outside [0,1] are clamped at table build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierParams {
    pub p1: (f64, f64),
    pub p2: (f64, f64),
}

impl BezierParams {
    /// S-curve with a soft center and soft end.
    pub fn ease_in_out() -> Self {
        Self {
            p1: (0.0, 1.0),
            p2: (1.0, 0.0),
        }
    }

    #[inline]
    fn coord(v: f64) -> f64 {
        if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
    }

    fn axis(t: f64, c1: f64, c2: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
    }

    fn axis_derivative(t: f64, c1: f64, c2: f64) -> f64 {
        let u = 1.0 - t;
        3.0 * u * u * c1 + 6.0 * u * t * (c2 - c1) + 3.0 * t * t * (1.0 - c2)
    }

    /// Evaluates y for a given x by solving x(t) = input.
    ///
    /// Newton-Raphson with a bisection fallback; only used when building the
    /// lookup table, never on the report thread.
    fn map(&self, input: f64) -> f64 {
        let x1 = Self::coord(self.p1.0);
        let y1 = Self::coord(self.p1.1);
        let x2 = Self::coord(self.p2.0);
        let y2 = Self::coord(self.p2.1);

        let input = input.clamp(0.0, 1.0);
        let mut t = input;
        for _ in 0..8 {
            let err = Self::axis(t, x1, x2) - input;
            if err.abs() < 1e-7 {
                break;
            }
            let slope = Self::axis_derivative(t, x1, x2);
            if slope.abs() < 1e-9 {
                break;
            }
            t = (t - err / slope).clamp(0.0, 1.0);
        }
        Self::axis(t, y1, y2).clamp(0.0, 1.0)
    }
}

/// Precomputed 256-entry table with linear interpolation between entries.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveLut {
    table: [f64; Self::SIZE],
}

impl CurveLut {
    pub const SIZE: usize = 256;

    /// Builds the table from Bezier parameters (profile load time).
    pub fn from_bezier(params: &BezierParams) -> Self {
        let mut table = [0.0f64; Self::SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            let input = i as f64 / (Self::SIZE - 1) as f64;
            *entry = params.map(input);
        }
        Self { table }
    }

    /// Interpolated lookup, input clamped to [0, 1].
    #[inline]
    pub fn lookup(&self, input: f64) -> f64 {
        let input = input.clamp(0.0, 1.0);
        let scaled = input * (Self::SIZE - 1) as f64;
        let low = (scaled as usize).min(Self::SIZE - 2);
        let fraction = scaled - low as f64;
        self.table[low] + fraction * (self.table[low + 1] - self.table[low])
    }
}

/// Output curve applied as the final transform stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OutputCurve {
    /// Identity.
    #[default]
    Linear,
    /// Piecewise-linear blend favoring fine control near center.
    EnhancedPrecision,
    Quadratic,
    Cubic,
    /// `x(x - 2)` ease-out.
    EaseOutQuad,
    /// `(|x| - 1)^3 + 1` ease-out.
    EaseOutCubic,
    /// Custom cubic Bezier, precomputed into a lookup table.
    Bezier(CurveLut),
}

impl OutputCurve {
    /// Remaps a signed normalized value in [-1, 1], preserving the sign.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        let a = value.abs().min(1.0);
        let out = match self {
            OutputCurve::Linear => a,
            OutputCurve::EnhancedPrecision => {
                if a <= 0.4 {
                    a * 0.55
                } else if a <= 0.75 {
                    (a - 0.4) + 0.22
                } else {
                    (a - 0.75) * 1.72 + 0.57
                }
            }
            OutputCurve::Quadratic => a * a,
            OutputCurve::Cubic => a * a * a,
            OutputCurve::EaseOutQuad => -(a * (a - 2.0)),
            OutputCurve::EaseOutCubic => {
                let shifted = a - 1.0;
                shifted * shifted * shifted + 1.0
            }
            OutputCurve::Bezier(lut) => lut.lookup(a),
        };
        sign * out.clamp(0.0, 1.0)
    }
}

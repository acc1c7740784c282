use serde::{Deserialize, Serialize};
use worldstream_common::SplineTable;

use crate::error::StreamError;

/// Streaming configuration: visibility scaling, prepare/fade factors and
/// optional per-pass budgets.
///
/// Every object's visibility radius is its own rendering distance times
/// `visibility`; the other factors scale that radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamerConfig {
    /// Global multiplier on every object's rendering distance.
    pub visibility: f32,
    /// Objects start loading resources within this multiple of their
    /// visibility radius. Must be at least 1.
    pub prepare_distance_factor: f32,
    /// Normalised range at which objects begin to fade out.
    pub fade_out_factor: f32,
    /// A near substitute within this multiple of the visibility radius
    /// blocks its far from activating.
    pub fade_overlap_factor: f32,
    /// Extra distance the world index adds to its query so objects about to
    /// enter the prepare radius are found a little early.
    pub prediction_step: f32,
    /// Explicit `(range, fade)` control points. Overrides the default curve
    /// derived from `fade_out_factor`.
    pub fade_curve: Option<Vec<[f32; 2]>>,
    /// Maximum background loads issued per pass.
    pub load_budget: Option<usize>,
    /// Maximum activations per pass.
    pub activation_budget: Option<usize>,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            visibility: 1.0,
            prepare_distance_factor: 1.3,
            fade_out_factor: 0.7,
            fade_overlap_factor: 1.5,
            prediction_step: 0.0,
            fade_curve: None,
            load_budget: None,
            activation_budget: None,
        }
    }
}

impl StreamerConfig {
    pub fn validate(&self) -> Result<(), StreamError> {
        let bad = |msg: String| Err(StreamError::InvalidConfig(msg));
        if !(self.visibility > 0.0) {
            return bad(format!("visibility must be positive, got {}", self.visibility));
        }
        if !(self.prepare_distance_factor >= 1.0) {
            return bad(format!(
                "prepare_distance_factor must be >= 1, got {}",
                self.prepare_distance_factor
            ));
        }
        if !(0.0..1.0).contains(&self.fade_out_factor) {
            return bad(format!(
                "fade_out_factor must be in [0, 1), got {}",
                self.fade_out_factor
            ));
        }
        if !(self.fade_overlap_factor >= 1.0) {
            return bad(format!(
                "fade_overlap_factor must be >= 1, got {}",
                self.fade_overlap_factor
            ));
        }
        if !(self.prediction_step >= 0.0) {
            return bad(format!(
                "prediction_step must be >= 0, got {}",
                self.prediction_step
            ));
        }
        if let Some(points) = &self.fade_curve {
            if points.iter().flatten().any(|v| !v.is_finite()) {
                return bad("fade_curve points must be finite".into());
            }
        }
        Ok(())
    }

    /// Fade factor as a function of normalised range (not squared).
    ///
    /// Default curve: fully opaque up to `fade_out_factor`, then easing to
    /// zero at range 1.
    pub fn fade_table(&self) -> SplineTable<f32> {
        match &self.fade_curve {
            Some(points) => SplineTable::from_points(points.iter().map(|p| (p[0], p[1]))),
            None => SplineTable::from_points([(0.0, 1.0), (self.fade_out_factor, 1.0), (1.0, 0.0)]),
        }
    }
}

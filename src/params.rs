//! Tunable metadata for overlay components
//!
//! Components that expose tunables describe them here, enabling:
//! - Parameter sweeps when calibrating curve shapes
//! - Configuration forms generated from metadata
//!
//! # Example
//!
//! ```rust
//! use pattern_overlays::params::{ParamMeta, ParamType, ParameterizedComponent};
//! use pattern_overlays::prelude::*;
//!
//! for param in BowlSynthesizer::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{OverlayError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Value in 0.0..=1.0
  Ratio,
  /// Whole number of days
  Days,
}

/// Metadata for a single tunable
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "cluster_gap_days")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Sweep range: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn days(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Days, default, range, description }
  }

  /// All sweep values from min to max inclusive
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 {
      return vec![min];
    }
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + f64::from(i) * step;
      if v > max + f64::EPSILON {
        break;
      }
      values.push(v);
      i += 1;
    }
    values
  }

  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(OverlayError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Days => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(OverlayError::InvalidValue("Days must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED COMPONENT TRAIT
// ============================================================

/// Components constructible from named tunables
pub trait ParameterizedComponent: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Build from a name/value map. Missing names use their defaults.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  fn component_name() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let Some(&value) = params.get(key) else {
    return Period::new(default);
  };
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(OverlayError::InvalidValue("Days must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

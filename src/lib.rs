//! # pattern-overlays
//!
//! Turns a loosely-structured pattern-scan response (price history plus heterogeneous
//! "marker" records) into a stable, render-ready set of chart overlays: smooth bowl
//! curves, horizontal range segments, point markers and reference lines. Also resamples
//! daily history into calendar weeks.
//!
//! ## Quick Start
//!
//! ```rust
//! use pattern_overlays::prelude::*;
//! use serde_json::json;
//!
//! let payload = json!({
//!     "scrip": "ACME",
//!     "pattern": "Bowl",
//!     "price_data": [
//!         { "time": 0, "open": 10.0, "high": 11.0, "low": 9.0, "close": 10.5 },
//!         { "time": 86400, "open": 10.5, "high": 10.8, "low": 8.0, "close": 9.0 },
//!         { "time": 172800, "open": 9.0, "high": 10.0, "low": 8.5, "close": 9.8 }
//!     ],
//!     "markers": [{ "time": 86400, "pattern_id": 1 }]
//! });
//!
//! let response = ScanResponse::from_value(&payload, "Bowl");
//! let input = ChartInput::from_response(response);
//!
//! let mut engine = EngineBuilder::new().build().unwrap();
//! let frame = engine.recompute(&input).unwrap();
//! assert!(frame.get(&OverlayKey::bowl(&ClusterId::Backend(1))).is_some());
//! ```

pub mod markers;
pub mod overlays;
pub mod params;
pub mod resample;
pub mod response;

pub mod prelude {
    pub use crate::{
        // Markers
        markers::{
            classify, BreakDirection, ClassifiedMarker, ClusterId, Marker, MarkerNormalizer,
            MarkerPosition, MarkerShape, MarkerSource, RangeBounds,
        },
        // Overlays
        overlays::{
            arena::{OverlayArena, OverlayOwner},
            bowl::{BowlSynthesizer, PatternCluster},
            range::{RangeLineExtractor, RangeSegment},
            reconcile::{BaseSeries, MarkerLayers, Reconciliation, RenderMarker, SeriesReconciler},
            style::{LineStyle, SeriesStyle, BOWL_PALETTE},
            OverlayFrame, OverlayKey, OverlayKind, OverlayPlan, OverlayPoints, OverlaySeries,
        },
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedComponent},
        // Parallel
        plan_parallel,
        // Resampling
        resample::{
            resample_weekly, trailing_high, week52_high, CalendarZone, ResampleAggregator,
            Timeframe,
        },
        response::ScanResponse,
        // Engine
        ChartInput,
        ChartPlan,
        EngineBuilder,
        EngineConfig,
        IndicatorSeries,
        OHLCVExt,
        OverlayEngine,
        // Errors
        OverlayError,
        PatternKind,
        Period,
        PlanError,
        PricePoint,
        Ratio,
        Result,
        SeriesPoint,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, OverlayError>;

/// Errors raised by configuration, opt-in data validation and payload parsing.
///
/// Marker shape irregularities never surface here; they degrade to fewer markers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OverlayError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid price point at index {index}: {reason}")]
    InvalidPrice { index: usize, reason: &'static str },

    #[error("Time not strictly ascending at index {index}: {time} after {previous}")]
    UnorderedTime {
        index: usize,
        previous: i64,
        time: i64,
    },

    #[error("Malformed payload: {0}")]
    Payload(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(OverlayError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(OverlayError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Count of whole days (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(OverlayError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    /// The period expressed in seconds.
    #[inline]
    pub fn as_secs(self) -> i64 {
        i64::try_from(self.0)
            .unwrap_or(i64::MAX / resample::DAY)
            .saturating_mul(resample::DAY)
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Time-stamped OHLCV data. `time` is in seconds since the epoch.
pub trait OHLCV {
    fn time(&self) -> i64;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn volume(&self) -> Option<u64> {
        None
    }
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn time(&self) -> i64 {
        (**self).time()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> Option<u64> {
        (**self).volume()
    }
}

/// Extension trait with consistency checks for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Validate OHLC consistency of a single point
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(OverlayError::InvalidPrice {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(OverlayError::InvalidPrice {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(OverlayError::InvalidPrice {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// Check every point and require strictly ascending, unique times.
pub fn validate_series<T: OHLCV>(points: &[T]) -> Result<()> {
    let mut previous: Option<i64> = None;
    for (index, point) in points.iter().enumerate() {
        point.validate().map_err(|e| match e {
            OverlayError::InvalidPrice { reason, .. } => OverlayError::InvalidPrice { index, reason },
            other => other,
        })?;
        let time = point.time();
        if let Some(previous) = previous {
            if time <= previous {
                return Err(OverlayError::UnorderedTime {
                    index,
                    previous,
                    time,
                });
            }
        }
        previous = Some(time);
    }
    Ok(())
}

// ============================================================
// PRICE DATA
// ============================================================

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl PricePoint {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }
}

impl OHLCV for PricePoint {
    fn time(&self) -> i64 {
        self.time
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> Option<u64> {
        self.volume
    }
}

/// A `(time, value)` pair of a line series.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: f64,
}

impl SeriesPoint {
    pub const fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// Line points act as a flat OHLC surrogate: open = high = low = close = value.
impl OHLCV for SeriesPoint {
    fn time(&self) -> i64 {
        self.time
    }

    fn open(&self) -> f64 {
        self.value
    }

    fn high(&self) -> f64 {
        self.value
    }

    fn low(&self) -> f64 {
        self.value
    }

    fn close(&self) -> f64 {
        self.value
    }
}

/// A named derived line (e.g. `ema21`) that may replace the candles as the base series.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndicatorSeries {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl IndicatorSeries {
    pub fn new(name: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// A named series with at least one point takes over as the visible base.
    pub fn is_active(&self) -> bool {
        !self.name.is_empty() && !self.points.is_empty()
    }
}

// ============================================================
// PATTERN CONTEXT
// ============================================================

/// Pattern family the scan was run for.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    Bowl,
    NarrowRangeBreak,
    #[default]
    Unspecified,
    Other(String),
}

impl PatternKind {
    /// Resolve a pattern or chart title, e.g. `"Bowl"` or `"Narrow Range Break"`.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if lower.is_empty() {
            PatternKind::Unspecified
        } else if lower.contains("bowl") {
            PatternKind::Bowl
        } else if lower.contains("narrow range") || lower == "nrb" {
            PatternKind::NarrowRangeBreak
        } else {
            PatternKind::Other(name.trim().to_string())
        }
    }

    #[inline]
    pub fn is_bowl(&self) -> bool {
        matches!(self, PatternKind::Bowl)
    }
}

/// Everything one recomputation consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartInput {
    pub pattern: PatternKind,
    pub price_data: Vec<PricePoint>,
    pub markers: Vec<markers::Marker>,
    pub indicator: Option<IndicatorSeries>,
    /// Level of the horizontal reference line (e.g. the 52-week high).
    pub reference_level: Option<f64>,
}

impl ChartInput {
    pub fn new(pattern: PatternKind) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    pub fn from_response(response: response::ScanResponse) -> Self {
        let indicator = response
            .series
            .map(|name| IndicatorSeries::new(name, response.series_data));
        Self {
            pattern: PatternKind::from_name(&response.pattern),
            price_data: response.price_data,
            markers: response.markers,
            indicator,
            reference_level: None,
        }
    }

    pub fn with_prices(mut self, prices: Vec<PricePoint>) -> Self {
        self.price_data = prices;
        self
    }

    pub fn with_markers(mut self, markers: Vec<markers::Marker>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_indicator(mut self, indicator: IndicatorSeries) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn with_reference_level(mut self, level: Option<f64>) -> Self {
        self.reference_level = level;
        self
    }

    /// Use the trailing 52-week high of the price data as the reference level.
    pub fn with_week52_reference(mut self) -> Self {
        self.reference_level = resample::week52_high(&self.price_data);
        self
    }

    /// Returns the active indicator, if it takes over as the visible base.
    pub fn active_indicator(&self) -> Option<&IndicatorSeries> {
        self.indicator.as_ref().filter(|i| i.is_active())
    }
}

// ============================================================
// ENGINE CONFIGURATION
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max gap (seconds) between consecutive id-less bowl markers of one cluster.
    pub cluster_gap: i64,
    /// Padding (seconds) added on both sides of a cluster before sampling bars.
    pub span_extend: i64,
    /// How far the curve is pulled from the edge line toward the true low.
    pub bowl_depth: Ratio,
    /// Weight of the synthetic curve against the raw low series.
    pub curve_weight: Ratio,
    pub validate_data: bool,
    pub calendar: resample::CalendarZone,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_gap: overlays::bowl::CLUSTER_GAP_SECS,
            span_extend: overlays::bowl::SPAN_EXTEND_SECS,
            bowl_depth: Ratio::new_const(overlays::bowl::BOWL_DEPTH),
            curve_weight: Ratio::new_const(overlays::bowl::CURVE_WEIGHT),
            validate_data: false,
            calendar: resample::CalendarZone::Utc,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_gap <= 0 {
            return Err(OverlayError::InvalidConfig(format!(
                "cluster_gap must be > 0, got {}",
                self.cluster_gap
            )));
        }
        if self.span_extend < 0 {
            return Err(OverlayError::InvalidConfig(format!(
                "span_extend must be >= 0, got {}",
                self.span_extend
            )));
        }
        // Ratios deserialized or built through `Ratio::new` are already in range;
        // `new_const` callers are not.
        Ratio::new(self.bowl_depth.get())?;
        Ratio::new(self.curve_weight.get())?;
        if let resample::CalendarZone::Offset(seconds) = self.calendar {
            if seconds.unsigned_abs() >= 86_400 {
                return Err(OverlayError::InvalidConfig(format!(
                    "calendar offset must be within one day, got {seconds}s"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// OVERLAY ENGINE
// ============================================================

use markers::classify;
use overlays::{
    arena::OverlayArena, bowl::BowlSynthesizer, range::RangeLineExtractor,
    reconcile::SeriesReconciler, OverlayFrame, OverlayPlan,
};

/// Owns the overlay-handle arena and runs the full synthesis pipeline per recomputation.
#[derive(Debug)]
pub struct OverlayEngine {
    config: EngineConfig,
    synthesizer: BowlSynthesizer,
    ranges: RangeLineExtractor,
    reconciler: SeriesReconciler,
    arena: OverlayArena,
}

impl OverlayEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn arena(&self) -> &OverlayArena {
        &self.arena
    }

    /// Compute the complete desired overlay set without touching the arena.
    #[tracing::instrument(
        name = "pattern_overlays::engine::plan",
        skip(self, input),
        fields(
            pattern = ?input.pattern,
            prices = input.price_data.len(),
            markers = input.markers.len(),
        )
    )]
    pub fn plan(&self, input: &ChartInput) -> Result<OverlayPlan> {
        if self.config.validate_data {
            validate_series(&input.price_data)?;
            if let Some(indicator) = &input.indicator {
                validate_series(&indicator.points)?;
            }
        }

        let classified = classify(&input.markers, &input.pattern);
        let reconciliation = self.reconciler.reconcile(input, &classified);

        let Some(base) = reconciliation.visible else {
            tracing::debug!("no price or indicator data, clearing every overlay");
            return Ok(OverlayPlan::cleared(reconciliation));
        };

        let (clusters, curves) = match base {
            overlays::reconcile::BaseSeries::Indicator => {
                let points = input
                    .active_indicator()
                    .map(|i| i.points.as_slice())
                    .unwrap_or_default();
                self.synthesizer.synthesize(&classified, points)
            }
            overlays::reconcile::BaseSeries::Price => {
                self.synthesizer.synthesize(&classified, &input.price_data)
            }
        };
        let (segments, range_lines) = self.ranges.extract(&classified);

        tracing::debug!(
            clusters = clusters.len(),
            segments = segments.len(),
            base = ?base,
            "overlay plan built"
        );

        Ok(OverlayPlan {
            clusters,
            segments,
            curves,
            range_lines,
            base_series: reconciliation.series,
            markers: reconciliation.markers,
            visible_base: Some(base),
        })
    }

    /// Plan and then apply the whole plan to the arena in one step.
    ///
    /// Keys owned by a component in a previous pass but absent from this plan are
    /// returned emptied and hidden, then released.
    #[tracing::instrument(name = "pattern_overlays::engine::recompute", skip(self, input))]
    pub fn recompute(&mut self, input: &ChartInput) -> Result<OverlayFrame> {
        let plan = self.plan(input)?;
        Ok(self.arena.commit(plan))
    }

    /// Retire every key the engine currently holds.
    pub fn reset(&mut self) -> OverlayFrame {
        self.arena.retire_all()
    }

    /// Resample daily history into the given timeframe using the configured calendar.
    pub fn resample(&self, daily: &[PricePoint], timeframe: resample::Timeframe) -> Vec<PricePoint> {
        timeframe.apply(daily, &self.config.calendar)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating OverlayEngine instances
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
    bowl_depth: f64,
    curve_weight: f64,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let config = EngineConfig::default();
        Self {
            bowl_depth: config.bowl_depth.get(),
            curve_weight: config.curve_weight.get(),
            config,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.bowl_depth = config.bowl_depth.get();
        self.curve_weight = config.curve_weight.get();
        self.config = config;
        self
    }

    pub fn cluster_gap_secs(mut self, seconds: i64) -> Self {
        self.config.cluster_gap = seconds;
        self
    }

    pub fn span_extend_secs(mut self, seconds: i64) -> Self {
        self.config.span_extend = seconds;
        self
    }

    pub fn bowl_depth(mut self, depth: f64) -> Self {
        self.bowl_depth = depth;
        self
    }

    pub fn curve_weight(mut self, weight: f64) -> Self {
        self.curve_weight = weight;
        self
    }

    /// Enable/disable price and indicator validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    pub fn calendar(mut self, zone: resample::CalendarZone) -> Self {
        self.config.calendar = zone;
        self
    }

    /// Apply synthesizer tunables by name. Missing names keep their defaults.
    pub fn with_params(self, params: &std::collections::HashMap<&str, f64>) -> Result<Self> {
        use params::ParameterizedComponent;

        for (name, value) in params {
            let meta = BowlSynthesizer::param_meta()
                .iter()
                .find(|m| m.name == *name)
                .ok_or_else(|| OverlayError::InvalidConfig(format!("unknown parameter {name}")))?;
            meta.validate(*value)?;
        }
        let synthesizer = BowlSynthesizer::with_params(params)?;
        Ok(self
            .cluster_gap_secs(synthesizer.cluster_gap)
            .span_extend_secs(synthesizer.span_extend)
            .bowl_depth(synthesizer.bowl_depth.get())
            .curve_weight(synthesizer.curve_weight.get()))
    }

    /// Build the engine
    pub fn build(self) -> Result<OverlayEngine> {
        let mut config = self.config;
        config.bowl_depth = Ratio::new(self.bowl_depth)?;
        config.curve_weight = Ratio::new(self.curve_weight)?;
        config.validate()?;

        Ok(OverlayEngine {
            synthesizer: BowlSynthesizer::from_config(&config),
            ranges: RangeLineExtractor,
            reconciler: SeriesReconciler,
            arena: OverlayArena::new(),
            config,
        })
    }
}

// ============================================================
// PARALLEL PLANNING
// ============================================================

use rayon::prelude::*;

/// Plan computed for a single chart
#[derive(Debug)]
pub struct ChartPlan {
    pub symbol: String,
    pub plan: OverlayPlan,
}

/// Error from planning a single chart
#[derive(Debug)]
pub struct PlanError {
    pub symbol: String,
    pub error: OverlayError,
}

/// Plan overlays for many charts at once (e.g. a watchlist grid).
///
/// Planning is pure, so the engine's arena is left untouched; commit the plans
/// through per-chart engines when they are shown.
pub fn plan_parallel<'a, I>(engine: &OverlayEngine, charts: I) -> (Vec<ChartPlan>, Vec<PlanError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a ChartInput)>,
{
    let results: Vec<_> = charts
        .into_par_iter()
        .map(|(symbol, input)| {
            engine
                .plan(input)
                .map(|plan| ChartPlan {
                    symbol: symbol.to_string(),
                    plan,
                })
                .map_err(|error| PlanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

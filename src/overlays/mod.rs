//! Overlay series and the per-pass plan / frame types
//!
//! - [`bowl`]: clusters bowl markers and synthesizes one curve per cluster
//! - [`range`]: horizontal high/low segments from range-carrying markers
//! - [`reconcile`]: base series visibility, point markers and the reference line
//! - [`arena`]: long-lived handle slots keyed by [`OverlayKey`], with retirement

pub mod arena;
pub mod bowl;
pub mod range;
pub mod reconcile;
pub mod style;

use crate::{markers::ClusterId, PricePoint, SeriesPoint};
use arena::OverlayOwner;
use bowl::PatternCluster;
use range::RangeSegment;
use reconcile::{BaseSeries, MarkerLayers, Reconciliation};
use style::SeriesStyle;

// ============================================================
// KEYS AND SERIES
// ============================================================

/// Key of an overlay handle, stable across recomputations for one logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct OverlayKey(String);

impl OverlayKey {
    pub fn bowl(id: &ClusterId) -> Self {
        Self(format!("bowl:{id}"))
    }

    pub fn range_high(group: &str) -> Self {
        Self(format!("range:{group}:high"))
    }

    pub fn range_low(group: &str) -> Self {
        Self(format!("range:{group}:low"))
    }

    pub fn base_price() -> Self {
        Self("base:price".to_string())
    }

    pub fn indicator_line() -> Self {
        Self("base:indicator".to_string())
    }

    pub fn reference_line() -> Self {
        Self("reference:week52-high".to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OverlayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    BowlCurve,
    RangeHigh,
    RangeLow,
    IndicatorLine,
    BasePrice,
    ReferenceLine,
}

/// Points of a series: `(time, value)` pairs or full OHLC bars.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum OverlayPoints {
    Line(Vec<SeriesPoint>),
    Candles(Vec<PricePoint>),
}

impl OverlayPoints {
    pub fn len(&self) -> usize {
        match self {
            OverlayPoints::Line(p) => p.len(),
            OverlayPoints::Candles(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Times in series order
    pub fn times(&self) -> Vec<i64> {
        match self {
            OverlayPoints::Line(p) => p.iter().map(|p| p.time).collect(),
            OverlayPoints::Candles(p) => p.iter().map(|p| p.time).collect(),
        }
    }

    pub fn as_line(&self) -> Option<&[SeriesPoint]> {
        match self {
            OverlayPoints::Line(p) => Some(p),
            OverlayPoints::Candles(_) => None,
        }
    }

    pub fn as_candles(&self) -> Option<&[PricePoint]> {
        match self {
            OverlayPoints::Candles(p) => Some(p),
            OverlayPoints::Line(_) => None,
        }
    }

    /// Empty points of the same variant
    pub fn cleared(&self) -> Self {
        match self {
            OverlayPoints::Line(_) => OverlayPoints::Line(Vec::new()),
            OverlayPoints::Candles(_) => OverlayPoints::Candles(Vec::new()),
        }
    }
}

/// One render-ready overlay series.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OverlaySeries {
    pub key: OverlayKey,
    pub kind: OverlayKind,
    pub points: OverlayPoints,
    pub visible: bool,
    pub style: SeriesStyle,
}

impl OverlaySeries {
    /// A line series, visible whenever it has points.
    pub fn line(key: OverlayKey, kind: OverlayKind, points: Vec<SeriesPoint>, style: SeriesStyle) -> Self {
        let visible = !points.is_empty();
        Self {
            key,
            kind,
            points: OverlayPoints::Line(points),
            visible,
            style,
        }
    }

    /// The same handle with no points, hidden.
    pub fn retired(mut self) -> Self {
        self.points = self.points.cleared();
        self.visible = false;
        self
    }
}

// ============================================================
// PLAN AND FRAME
// ============================================================

/// Everything one recomputation wants on screen, grouped by owning component.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPlan {
    pub clusters: Vec<PatternCluster>,
    pub segments: Vec<RangeSegment>,
    pub curves: Vec<OverlaySeries>,
    pub range_lines: Vec<OverlaySeries>,
    pub base_series: Vec<OverlaySeries>,
    pub markers: MarkerLayers,
    pub visible_base: Option<BaseSeries>,
}

impl OverlayPlan {
    /// Plan for an all-empty update: base series emptied, no curves, no ranges, no markers.
    pub fn cleared(reconciliation: Reconciliation) -> Self {
        Self {
            clusters: Vec::new(),
            segments: Vec::new(),
            curves: Vec::new(),
            range_lines: Vec::new(),
            base_series: reconciliation.series,
            markers: MarkerLayers::default(),
            visible_base: None,
        }
    }

    /// Split into per-owner batches, plus the marker layers and visible base.
    pub fn into_batches(
        self,
    ) -> (
        [(OverlayOwner, Vec<OverlaySeries>); 3],
        MarkerLayers,
        Option<BaseSeries>,
    ) {
        (
            [
                (OverlayOwner::Synthesizer, self.curves),
                (OverlayOwner::RangeExtractor, self.range_lines),
                (OverlayOwner::Reconciler, self.base_series),
            ],
            self.markers,
            self.visible_base,
        )
    }
}

/// Result of committing a plan: what the rendering surface applies in one go.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OverlayFrame {
    /// Every live series followed by every series retired in this pass (empty, hidden).
    pub series: Vec<OverlaySeries>,
    pub retired: Vec<OverlayKey>,
    pub markers: MarkerLayers,
    pub visible_base: Option<BaseSeries>,
}

impl OverlayFrame {
    pub fn get(&self, key: &OverlayKey) -> Option<&OverlaySeries> {
        self.series.iter().find(|s| &s.key == key)
    }

    pub fn of_kind(&self, kind: OverlayKind) -> impl Iterator<Item = &OverlaySeries> {
        self.series.iter().filter(move |s| s.kind == kind)
    }

    pub fn is_retired(&self, key: &OverlayKey) -> bool {
        self.retired.contains(key)
    }
}

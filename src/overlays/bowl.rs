//! Bowl-family overlay synthesis
//!
//! Bowl markers are grouped into pattern instances, by backend `pattern_id` when the
//! backend supplies one and by time proximity otherwise. Each instance gets a U-shaped
//! curve anchored at the true local minimum of the bars around it, blended with the raw
//! lows so the result does not look purely synthetic.

use std::collections::{BTreeMap, HashMap};

use super::{style::SeriesStyle, OverlayKey, OverlayKind, OverlaySeries};
use crate::{
    markers::{ClassifiedMarker, ClusterId, Marker},
    params::{get_period, get_ratio, ParamMeta, ParameterizedComponent},
    EngineConfig, Ratio, Result, SeriesPoint, OHLCV,
};

/// Gap between consecutive id-less bowl markers that starts a new cluster (30 days)
pub const CLUSTER_GAP_SECS: i64 = 30 * 24 * 60 * 60;
/// Padding on each side of a cluster when sampling bars (30 days)
pub const SPAN_EXTEND_SECS: i64 = 30 * 24 * 60 * 60;
/// Fraction of the distance from edge line to true low the curve bottoms out at
pub const BOWL_DEPTH: f64 = 0.8;
/// Weight of the synthetic curve; the raw low gets the remainder
pub const CURVE_WEIGHT: f64 = 0.65;

/// One bowl pattern instance. Members are sorted by time.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatternCluster {
    pub id: ClusterId,
    pub members: Vec<Marker>,
    pub color: &'static str,
}

impl PatternCluster {
    pub fn first_time(&self) -> Option<i64> {
        self.members.first().map(|m| m.time)
    }

    pub fn last_time(&self) -> Option<i64> {
        self.members.last().map(|m| m.time)
    }

    pub fn key(&self) -> OverlayKey {
        OverlayKey::bowl(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BowlSynthesizer {
    pub cluster_gap: i64,
    pub span_extend: i64,
    pub bowl_depth: Ratio,
    pub curve_weight: Ratio,
}

impl Default for BowlSynthesizer {
    fn default() -> Self {
        Self {
            cluster_gap: CLUSTER_GAP_SECS,
            span_extend: SPAN_EXTEND_SECS,
            bowl_depth: Ratio::new_const(BOWL_DEPTH),
            curve_weight: Ratio::new_const(CURVE_WEIGHT),
        }
    }
}

impl BowlSynthesizer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            cluster_gap: config.cluster_gap,
            span_extend: config.span_extend,
            bowl_depth: config.bowl_depth,
            curve_weight: config.curve_weight,
        }
    }

    /// Group bowl markers into clusters, ordered by cluster id.
    pub fn cluster(&self, markers: &[ClassifiedMarker]) -> Vec<PatternCluster> {
        let mut groups: BTreeMap<ClusterId, Vec<Marker>> = BTreeMap::new();
        for classified in markers {
            if let ClassifiedMarker::Bowl { marker, pattern_id } = classified {
                let id = pattern_id.map_or(ClusterId::Unassigned, ClusterId::Backend);
                groups.entry(id).or_default().push(marker.clone());
            }
        }

        // No ids anywhere: split the single degenerate group by time gaps
        let only_unassigned = groups.len() == 1 && groups.contains_key(&ClusterId::Unassigned);
        if only_unassigned {
            let members = groups.remove(&ClusterId::Unassigned).unwrap_or_default();
            groups = self.cluster_by_gap(members);
            tracing::debug!(clusters = groups.len(), "bowl markers clustered by time gap");
        }

        groups
            .into_iter()
            .map(|(id, mut members)| {
                members.sort_by_key(|m| m.time);
                PatternCluster {
                    color: super::style::bowl_color(id.palette_seed()),
                    id,
                    members,
                }
            })
            .collect()
    }

    fn cluster_by_gap(&self, mut members: Vec<Marker>) -> BTreeMap<ClusterId, Vec<Marker>> {
        members.sort_by_key(|m| m.time);

        let mut groups: BTreeMap<ClusterId, Vec<Marker>> = BTreeMap::new();
        let mut cluster = 0u32;
        let mut last: Option<i64> = None;
        for marker in members {
            if last.map_or(true, |prev| marker.time.saturating_sub(prev) > self.cluster_gap) {
                cluster += 1;
            }
            last = Some(marker.time);
            groups
                .entry(ClusterId::Inferred(cluster))
                .or_default()
                .push(marker);
        }
        groups
    }

    /// Curve for one cluster over `bars`. Empty when no bar falls in the padded span.
    pub fn curve<T: OHLCV>(&self, cluster: &PatternCluster, bars: &[T]) -> Vec<SeriesPoint> {
        let (Some(first), Some(last)) = (cluster.first_time(), cluster.last_time()) else {
            return Vec::new();
        };
        let from = first.saturating_sub(self.span_extend);
        let to = last.saturating_add(self.span_extend);

        let mut span: Vec<&T> = bars
            .iter()
            .filter(|b| b.time() >= from && b.time() <= to)
            .collect();
        if span.is_empty() {
            return Vec::new();
        }
        span.sort_by_key(|b| b.time());

        let n = span.len();
        let (min_index, min_low) = span
            .iter()
            .enumerate()
            .fold((0, span[0].low()), |(best_i, best), (i, b)| {
                if b.low() < best {
                    (i, b.low())
                } else {
                    (best_i, best)
                }
            });

        let start_low = span[0].low();
        let end_low = span[n - 1].low();
        let denom = (n - 1).max(1) as f64;
        let bottom = min_index as f64 / denom;
        let max_dist = bottom.max(1.0 - bottom);
        let max_parabola = max_dist * max_dist;

        let depth_factor = self.bowl_depth.get();
        let weight = self.curve_weight.get();

        span.iter()
            .enumerate()
            .map(|(i, b)| {
                let t = i as f64 / denom;
                let d = t - bottom;
                let parabola = d * d;
                let norm = if max_parabola > 0.0 {
                    parabola / max_parabola
                } else {
                    0.0
                };
                let depth = 1.0 - norm;
                let edge = start_low * (1.0 - t) + end_low * t;
                let curved = edge + (min_low - edge) * depth * depth_factor;
                SeriesPoint::new(b.time(), weight * curved + (1.0 - weight) * b.low())
            })
            .collect()
    }

    /// Cluster the bowl markers and emit one curve series per cluster.
    pub fn synthesize<T: OHLCV>(
        &self,
        markers: &[ClassifiedMarker],
        bars: &[T],
    ) -> (Vec<PatternCluster>, Vec<OverlaySeries>) {
        let clusters = self.cluster(markers);
        let series = clusters
            .iter()
            .map(|cluster| {
                let points = self.curve(cluster, bars);
                if points.is_empty() {
                    tracing::trace!(cluster = %cluster.id, "no bars in bowl span");
                }
                OverlaySeries::line(
                    cluster.key(),
                    OverlayKind::BowlCurve,
                    points,
                    SeriesStyle::bowl(cluster.id.palette_seed()),
                )
            })
            .collect();
        (clusters, series)
    }
}

impl ParameterizedComponent for BowlSynthesizer {
    fn param_meta() -> &'static [ParamMeta] {
        static PARAMS: [ParamMeta; 4] = [
            ParamMeta::days(
                "cluster_gap_days",
                30.0,
                (5.0, 90.0, 5.0),
                "Days between id-less bowl markers that start a new cluster",
            ),
            ParamMeta::days(
                "span_extend_days",
                30.0,
                (5.0, 90.0, 5.0),
                "Days of bars sampled on each side of a cluster",
            ),
            ParamMeta::ratio(
                "bowl_depth",
                BOWL_DEPTH,
                (0.0, 1.0, 0.05),
                "How far the curve dips from the edge line toward the true low",
            ),
            ParamMeta::ratio(
                "curve_weight",
                CURVE_WEIGHT,
                (0.0, 1.0, 0.05),
                "Weight of the synthetic curve against the raw lows",
            ),
        ];
        &PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            cluster_gap: get_period(params, "cluster_gap_days", 30)?.as_secs(),
            span_extend: get_period(params, "span_extend_days", 30)?.as_secs(),
            bowl_depth: get_ratio(params, "bowl_depth", BOWL_DEPTH)?,
            curve_weight: get_ratio(params, "curve_weight", CURVE_WEIGHT)?,
        })
    }

    fn component_name() -> &'static str {
        "bowl"
    }
}

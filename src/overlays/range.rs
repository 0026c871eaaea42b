//! Horizontal support/resistance segments for narrow-range-break markers

use std::collections::HashMap;

use super::{style::SeriesStyle, OverlayKey, OverlayKind, OverlaySeries};
use crate::{markers::ClassifiedMarker, SeriesPoint};

/// Explicit range bounds of one group
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RangeSegment {
    pub key: String,
    pub low: f64,
    pub high: f64,
    pub start_time: i64,
    pub end_time: i64,
}

impl RangeSegment {
    pub fn high_line(&self) -> Vec<SeriesPoint> {
        vec![
            SeriesPoint::new(self.start_time, self.high),
            SeriesPoint::new(self.end_time, self.high),
        ]
    }

    pub fn low_line(&self) -> Vec<SeriesPoint> {
        vec![
            SeriesPoint::new(self.start_time, self.low),
            SeriesPoint::new(self.end_time, self.low),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeLineExtractor;

impl RangeLineExtractor {
    /// One segment per group key, in order of first appearance.
    ///
    /// The group key is `nrb_id`, or the marker's own time when absent, so distinct
    /// markers sharing a timestamp and lacking `nrb_id` coalesce. The last marker of a
    /// group supplies its bounds.
    pub fn segments(&self, markers: &[ClassifiedMarker]) -> Vec<RangeSegment> {
        let mut segments: Vec<RangeSegment> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for classified in markers {
            let ClassifiedMarker::Range { marker, bounds } = classified else {
                continue;
            };
            let key = marker
                .nrb_id
                .clone()
                .unwrap_or_else(|| marker.time.to_string());
            let segment = RangeSegment {
                key: key.clone(),
                low: bounds.low,
                high: bounds.high,
                start_time: bounds.start_time,
                end_time: bounds.end_time,
            };
            match by_key.get(&key) {
                Some(&pos) => {
                    tracing::trace!(key = %key, "range markers coalesced under one key");
                    segments[pos] = segment;
                }
                None => {
                    by_key.insert(key, segments.len());
                    segments.push(segment);
                }
            }
        }
        segments
    }

    /// Segments plus their high and low line series.
    pub fn extract(&self, markers: &[ClassifiedMarker]) -> (Vec<RangeSegment>, Vec<OverlaySeries>) {
        let segments = self.segments(markers);
        let series = segments
            .iter()
            .flat_map(|segment| {
                [
                    OverlaySeries::line(
                        OverlayKey::range_high(&segment.key),
                        OverlayKind::RangeHigh,
                        segment.high_line(),
                        SeriesStyle::range(),
                    ),
                    OverlaySeries::line(
                        OverlayKey::range_low(&segment.key),
                        OverlayKind::RangeLow,
                        segment.low_line(),
                        SeriesStyle::range(),
                    ),
                ]
            })
            .collect();
        (segments, series)
    }
}

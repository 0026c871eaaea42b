//! Marker normalization and classification
//!
//! Backend marker records arrive loosely typed: fields are optional, numbers sometimes
//! come as strings, and the list itself may sit under `markers`, under `triggers`, or be
//! the whole payload. [`MarkerNormalizer`] reshapes them into canonical [`Marker`]s and
//! never fails. [`classify`] then splits markers into the three shapes the pipeline
//! works with: bowl members, range carriers and plain point markers.

use serde_json::Value;

use crate::PatternKind;

/// Color applied when a marker carries none.
pub const DEFAULT_MARKER_COLOR: &str = "#2196F3";

// ============================================================
// MARKER FIELDS
// ============================================================

/// Where a marker sits relative to its bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerPosition {
    AboveBar,
    #[default]
    BelowBar,
    InBar,
}

impl MarkerPosition {
    /// Unknown values fall back to `BelowBar`; legacy `"overlay"` means `AboveBar`.
    pub fn parse(value: &str) -> Self {
        match value {
            "aboveBar" | "overlay" => MarkerPosition::AboveBar,
            "inBar" => MarkerPosition::InBar,
            _ => MarkerPosition::BelowBar,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerShape {
    ArrowUp,
    ArrowDown,
    #[default]
    Circle,
    Square,
}

impl MarkerShape {
    pub fn parse(value: &str) -> Self {
        match value {
            "arrowUp" => MarkerShape::ArrowUp,
            "arrowDown" => MarkerShape::ArrowDown,
            "square" => MarkerShape::Square,
            _ => MarkerShape::Circle,
        }
    }
}

/// Break direction reported for narrow-range-break markers
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BreakDirection {
    Bullish,
    Bearish,
    Other(String),
}

impl BreakDirection {
    pub fn as_str(&self) -> &str {
        match self {
            BreakDirection::Bullish => "Bullish Break",
            BreakDirection::Bearish => "Bearish Break",
            BreakDirection::Other(s) => s,
        }
    }
}

impl From<String> for BreakDirection {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Bullish Break" => BreakDirection::Bullish,
            "Bearish Break" => BreakDirection::Bearish,
            _ => BreakDirection::Other(value),
        }
    }
}

impl From<BreakDirection> for String {
    fn from(value: BreakDirection) -> Self {
        match value {
            BreakDirection::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

// ============================================================
// CANONICAL MARKER
// ============================================================

/// Canonical marker record. Every field but `time` has been defaulted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Marker {
    pub time: i64,
    #[serde(default)]
    pub position: MarkerPosition,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub shape: MarkerShape,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub pattern_id: Option<i64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub range_low: Option<f64>,
    #[serde(default)]
    pub range_high: Option<f64>,
    #[serde(default)]
    pub range_start_time: Option<i64>,
    #[serde(default)]
    pub range_end_time: Option<i64>,
    #[serde(default)]
    pub nrb_id: Option<String>,
    #[serde(default)]
    pub direction: Option<BreakDirection>,
}

fn default_color() -> String {
    DEFAULT_MARKER_COLOR.to_string()
}

impl Marker {
    pub fn new(time: i64) -> Self {
        Self {
            time,
            position: MarkerPosition::default(),
            color: default_color(),
            shape: MarkerShape::default(),
            text: None,
            pattern_id: None,
            score: None,
            range_low: None,
            range_high: None,
            range_start_time: None,
            range_end_time: None,
            nrb_id: None,
            direction: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_pattern_id(mut self, id: i64) -> Self {
        self.pattern_id = Some(id);
        self
    }

    pub fn with_range(mut self, low: f64, high: f64, start_time: i64, end_time: i64) -> Self {
        self.range_low = Some(low);
        self.range_high = Some(high);
        self.range_start_time = Some(start_time);
        self.range_end_time = Some(end_time);
        self
    }

    pub fn with_nrb_id(mut self, id: impl Into<String>) -> Self {
        self.nrb_id = Some(id.into());
        self
    }

    pub fn with_direction(mut self, direction: BreakDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Case-insensitive "BOWL" in the marker text.
    pub fn mentions_bowl(&self) -> bool {
        self.text
            .as_deref()
            .is_some_and(|t| t.to_uppercase().contains("BOWL"))
    }

    /// All four range bounds, or `None` when any is missing.
    pub fn range_bounds(&self) -> Option<RangeBounds> {
        Some(RangeBounds {
            low: self.range_low?,
            high: self.range_high?,
            start_time: self.range_start_time?,
            end_time: self.range_end_time?,
        })
    }
}

// ============================================================
// NORMALIZER
// ============================================================

/// Which payload field the marker list was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSource {
    Markers,
    Triggers,
    Root,
    Missing,
}

/// Reshapes raw backend marker payloads into canonical [`Marker`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerNormalizer;

impl MarkerNormalizer {
    /// Locate the raw marker list: `markers`, then `triggers`, then the payload itself.
    pub fn locate(payload: &Value) -> (MarkerSource, Option<&Value>) {
        let field = |name: &str| payload.get(name).filter(|v| !v.is_null());
        if let Some(v) = field("markers") {
            (MarkerSource::Markers, Some(v))
        } else if let Some(v) = field("triggers") {
            (MarkerSource::Triggers, Some(v))
        } else if payload.is_array() {
            (MarkerSource::Root, Some(payload))
        } else {
            (MarkerSource::Missing, None)
        }
    }

    /// Normalize a whole payload. Malformed input yields an empty list.
    pub fn normalize(&self, payload: &Value) -> Vec<Marker> {
        let (source, raw) = Self::locate(payload);
        let Some(records) = raw.and_then(Value::as_array) else {
            tracing::debug!(?source, "no marker array in payload");
            return Vec::new();
        };

        tracing::debug!(?source, count = records.len(), "normalizing markers");
        self.normalize_records(records)
    }

    /// Normalize a bare list of records, dropping those without a usable `time`.
    pub fn normalize_records(&self, records: &[Value]) -> Vec<Marker> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let marker = self.normalize_record(record);
                if marker.is_none() {
                    tracing::trace!(index, "dropping marker without usable time");
                }
                marker
            })
            .collect()
    }

    pub fn normalize_record(&self, record: &Value) -> Option<Marker> {
        let obj = record.as_object()?;
        let time = obj.get("time").and_then(as_time)?;

        let mut marker = Marker::new(time);
        if let Some(position) = obj.get("position").and_then(non_empty_str) {
            marker.position = MarkerPosition::parse(position);
        }
        if let Some(color) = obj.get("color").and_then(non_empty_str) {
            marker.color = color.to_string();
        }
        if let Some(shape) = obj.get("shape").and_then(non_empty_str) {
            marker.shape = MarkerShape::parse(shape);
        }
        marker.text = obj.get("text").and_then(Value::as_str).map(str::to_string);
        marker.pattern_id = obj.get("pattern_id").and_then(as_time);
        marker.score = obj.get("score").and_then(as_f64);
        marker.range_low = obj.get("range_low").and_then(as_f64);
        marker.range_high = obj.get("range_high").and_then(as_f64);
        marker.range_start_time = obj.get("range_start_time").and_then(as_time);
        marker.range_end_time = obj.get("range_end_time").and_then(as_time);
        marker.nrb_id = obj.get("nrb_id").and_then(as_key);
        marker.direction = obj
            .get("direction")
            .and_then(non_empty_str)
            .map(|d| BreakDirection::from(d.to_string()));

        Some(marker)
    }
}

// ============================================================
// LOOSE VALUE HELPERS
// ============================================================

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Numbers or numeric strings, finite only.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Integer seconds (or ids); fractional values are truncated.
pub(crate) fn as_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
                .map(|v| v.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
                    .map(|v| v.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Identifier as a string key, accepting numbers and strings.
fn as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================
// CLASSIFICATION
// ============================================================

/// Provenance of a pattern cluster id.
///
/// Backend ids name the same logical pattern across recomputations; inferred ids are
/// positional and only meaningful within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum ClusterId {
    Backend(i64),
    /// Id-less bowl markers when other bowl markers do carry ids.
    Unassigned,
    Inferred(u32),
}

impl ClusterId {
    /// Numeric id used for palette lookup.
    pub fn palette_seed(&self) -> i64 {
        match self {
            ClusterId::Backend(id) => *id,
            ClusterId::Unassigned => -1,
            ClusterId::Inferred(n) => i64::from(*n),
        }
    }

    #[inline]
    pub fn is_backend(&self) -> bool {
        matches!(self, ClusterId::Backend(_))
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterId::Backend(id) => write!(f, "{id}"),
            ClusterId::Unassigned => write!(f, "unassigned"),
            ClusterId::Inferred(n) => write!(f, "auto-{n}"),
        }
    }
}

/// Explicit horizontal range carried by a marker
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RangeBounds {
    pub low: f64,
    pub high: f64,
    pub start_time: i64,
    pub end_time: i64,
}

/// A marker validated into the one shape the pipeline treats it as.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedMarker {
    /// Member of a bowl pattern instance
    Bowl {
        marker: Marker,
        pattern_id: Option<i64>,
    },
    /// Non-bowl marker with all four range bounds
    Range { marker: Marker, bounds: RangeBounds },
    /// Any other non-bowl marker
    Plain(Marker),
}

impl ClassifiedMarker {
    pub fn marker(&self) -> &Marker {
        match self {
            ClassifiedMarker::Bowl { marker, .. }
            | ClassifiedMarker::Range { marker, .. }
            | ClassifiedMarker::Plain(marker) => marker,
        }
    }

    #[inline]
    pub fn is_bowl(&self) -> bool {
        matches!(self, ClassifiedMarker::Bowl { .. })
    }
}

/// Split markers by family. Order is preserved.
///
/// A marker is a bowl member when the pattern context is bowl-type and it carries a
/// `pattern_id`, or when its text mentions "BOWL".
pub fn classify(markers: &[Marker], pattern: &PatternKind) -> Vec<ClassifiedMarker> {
    markers
        .iter()
        .map(|marker| {
            let is_bowl =
                (pattern.is_bowl() && marker.pattern_id.is_some()) || marker.mentions_bowl();
            if is_bowl {
                ClassifiedMarker::Bowl {
                    pattern_id: marker.pattern_id,
                    marker: marker.clone(),
                }
            } else if let Some(bounds) = marker.range_bounds() {
                ClassifiedMarker::Range {
                    marker: marker.clone(),
                    bounds,
                }
            } else {
                ClassifiedMarker::Plain(marker.clone())
            }
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locate_priority() {
        let both = json!({ "markers": [{ "time": 1 }], "triggers": [{ "time": 2 }] });
        assert_eq!(MarkerNormalizer::locate(&both).0, MarkerSource::Markers);

        let triggers = json!({ "markers": null, "triggers": [{ "time": 2 }] });
        assert_eq!(MarkerNormalizer::locate(&triggers).0, MarkerSource::Triggers);

        let root = json!([{ "time": 3 }]);
        assert_eq!(MarkerNormalizer::locate(&root).0, MarkerSource::Root);

        let none = json!({ "price_data": [] });
        assert_eq!(MarkerNormalizer::locate(&none).0, MarkerSource::Missing);
    }

    #[test]
    fn test_normalize_defaults() {
        let markers = MarkerNormalizer.normalize(&json!({ "markers": [{ "time": 100 }] }));
        assert_eq!(markers.len(), 1);
        let m = &markers[0];
        assert_eq!(m.time, 100);
        assert_eq!(m.position, MarkerPosition::BelowBar);
        assert_eq!(m.color, DEFAULT_MARKER_COLOR);
        assert_eq!(m.shape, MarkerShape::Circle);
        assert!(m.text.is_none());
        assert!(m.range_bounds().is_none());
        assert!(m.nrb_id.is_none());
        assert!(m.direction.is_none());
    }

    #[test]
    fn test_normalize_remaps_overlay_position() {
        let markers = MarkerNormalizer.normalize(&json!([{ "time": 1, "position": "overlay" }]));
        assert_eq!(markers[0].position, MarkerPosition::AboveBar);
    }

    #[test]
    fn test_normalize_keeps_supplied_fields() {
        let markers = MarkerNormalizer.normalize(&json!({
            "triggers": [{
                "time": "1700000000",
                "position": "inBar",
                "color": "#123456",
                "shape": "square",
                "text": "NRB",
                "pattern_id": "7",
                "score": 0.8,
                "range_low": 95,
                "range_high": "105",
                "range_start_time": 1000,
                "range_end_time": 2000.0,
                "nrb_id": 12,
                "direction": "Bearish Break"
            }]
        }));
        let m = &markers[0];
        assert_eq!(m.time, 1_700_000_000);
        assert_eq!(m.position, MarkerPosition::InBar);
        assert_eq!(m.color, "#123456");
        assert_eq!(m.shape, MarkerShape::Square);
        assert_eq!(m.text.as_deref(), Some("NRB"));
        assert_eq!(m.pattern_id, Some(7));
        assert_eq!(m.score, Some(0.8));
        assert_eq!(
            m.range_bounds(),
            Some(RangeBounds {
                low: 95.0,
                high: 105.0,
                start_time: 1000,
                end_time: 2000
            })
        );
        assert_eq!(m.nrb_id.as_deref(), Some("12"));
        assert_eq!(m.direction, Some(BreakDirection::Bearish));
    }

    #[test]
    fn test_normalize_malformed_is_empty() {
        assert!(MarkerNormalizer.normalize(&json!(null)).is_empty());
        assert!(MarkerNormalizer.normalize(&json!("markers")).is_empty());
        assert!(MarkerNormalizer.normalize(&json!({ "markers": { "time": 1 } })).is_empty());
        assert!(MarkerNormalizer.normalize(&json!({ "markers": 5 })).is_empty());
    }

    #[test]
    fn test_normalize_drops_records_without_time() {
        let markers = MarkerNormalizer.normalize(&json!([
            { "time": 1 },
            { "text": "no time" },
            "garbage",
            { "time": "soon" },
            { "time": 2 }
        ]));
        let times: Vec<i64> = markers.iter().map(|m| m.time).collect();
        assert_eq!(times, vec![1, 2]);
    }

    #[test]
    fn test_classify_bowl_rules() {
        let markers = vec![
            Marker::new(1).with_pattern_id(4),
            Marker::new(2).with_text("Bowl bottom"),
            Marker::new(3),
        ];

        let bowl_ctx = classify(&markers, &PatternKind::Bowl);
        assert!(bowl_ctx[0].is_bowl());
        assert!(bowl_ctx[1].is_bowl());
        assert!(!bowl_ctx[2].is_bowl());

        let nrb_ctx = classify(&markers, &PatternKind::NarrowRangeBreak);
        assert!(!nrb_ctx[0].is_bowl());
        assert!(nrb_ctx[1].is_bowl());
    }

    #[test]
    fn test_classify_range_requires_all_bounds() {
        let mut partial = Marker::new(1).with_range(95.0, 105.0, 1000, 2000);
        partial.range_end_time = None;
        let full = Marker::new(2).with_range(95.0, 105.0, 1000, 2000);

        let classified = classify(&[partial, full], &PatternKind::NarrowRangeBreak);
        assert!(matches!(classified[0], ClassifiedMarker::Plain(_)));
        assert!(matches!(classified[1], ClassifiedMarker::Range { .. }));
    }

    #[test]
    fn test_bowl_text_wins_over_range() {
        let m = Marker::new(1)
            .with_text("BOWL")
            .with_range(1.0, 2.0, 0, 10);
        let classified = classify(&[m], &PatternKind::NarrowRangeBreak);
        assert!(classified[0].is_bowl());
    }

    #[test]
    fn test_cluster_id_seed() {
        assert_eq!(ClusterId::Backend(-12).palette_seed(), -12);
        assert_eq!(ClusterId::Unassigned.palette_seed(), -1);
        assert_eq!(ClusterId::Inferred(2).palette_seed(), 2);
        assert_eq!(ClusterId::Inferred(2).to_string(), "auto-2");
    }

    #[test]
    fn test_break_direction_serde() {
        let d: BreakDirection = serde_json::from_value(json!("Bullish Break")).unwrap();
        assert_eq!(d, BreakDirection::Bullish);
        assert_eq!(serde_json::to_value(&d).unwrap(), json!("Bullish Break"));
        let other: BreakDirection = serde_json::from_value(json!("Sideways")).unwrap();
        assert_eq!(other, BreakDirection::Other("Sideways".to_string()));
    }
}

//! Normalized pattern-scan provider payload

use serde_json::Value;

use crate::{
    markers::{as_f64, as_time, Marker, MarkerNormalizer},
    OverlayError, PricePoint, Result, SeriesPoint,
};

/// A pattern-scan response after boundary normalization.
///
/// Every field has a usable value: shape problems in the payload shrink the data
/// rather than fail.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ScanResponse {
    pub scrip: String,
    pub pattern: String,
    pub price_data: Vec<PricePoint>,
    pub markers: Vec<Marker>,
    /// Name of the indicator series, when one was requested
    pub series: Option<String>,
    pub series_data: Vec<SeriesPoint>,
}

impl ScanResponse {
    /// Normalize an already parsed payload. `requested_pattern` fills a missing `pattern`.
    pub fn from_value(payload: &Value, requested_pattern: &str) -> Self {
        let text = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let price_data = records(payload, "price_data")
            .iter()
            .filter_map(price_point)
            .collect::<Vec<_>>();
        let series_data = records(payload, "series_data")
            .iter()
            .filter_map(series_point)
            .collect::<Vec<_>>();
        let markers = MarkerNormalizer.normalize(payload);

        tracing::debug!(
            prices = price_data.len(),
            markers = markers.len(),
            series_points = series_data.len(),
            "normalized scan response"
        );

        Self {
            scrip: text("scrip").unwrap_or_default(),
            pattern: text("pattern").unwrap_or_else(|| requested_pattern.to_string()),
            price_data,
            markers,
            series: text("series"),
            series_data,
        }
    }

    /// Parse and normalize raw JSON text. Invalid JSON is the provider's format error.
    pub fn from_json(body: &str, requested_pattern: &str) -> Result<Self> {
        let payload: Value =
            serde_json::from_str(body).map_err(|e| OverlayError::Payload(e.to_string()))?;
        Ok(Self::from_value(&payload, requested_pattern))
    }
}

fn records<'a>(payload: &'a Value, field: &str) -> &'a [Value] {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn price_point(record: &Value) -> Option<PricePoint> {
    let num = |name: &str| record.get(name).and_then(as_f64);
    let mut point = PricePoint::new(
        record.get("time").and_then(as_time)?,
        num("open")?,
        num("high")?,
        num("low")?,
        num("close")?,
    );
    point.volume = num("volume")
        .filter(|v| *v >= 0.0)
        .map(|v| v.min(u64::MAX as f64) as u64);
    Some(point)
}

fn series_point(record: &Value) -> Option<SeriesPoint> {
    Some(SeriesPoint::new(
        record.get("time").and_then(as_time)?,
        record.get("value").and_then(as_f64)?,
    ))
}

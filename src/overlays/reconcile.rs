//! Base series visibility, point markers and the reference line

use super::{
    style::{SeriesStyle, BEARISH_BREAK_COLOR, BULLISH_BREAK_COLOR},
    OverlayKey, OverlayKind, OverlayPoints, OverlaySeries,
};
use crate::{
    markers::{BreakDirection, ClassifiedMarker, Marker, MarkerPosition, MarkerShape},
    ChartInput, SeriesPoint,
};

/// Which base series carries the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseSeries {
    Price,
    Indicator,
}

/// A point marker as the surface paints it
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RenderMarker {
    pub time: i64,
    pub position: MarkerPosition,
    pub color: String,
    pub shape: MarkerShape,
    pub text: String,
}

/// Marker sets of both base series. At most one is non-empty, and both are replaced
/// wholesale on every pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MarkerLayers {
    pub price: Vec<RenderMarker>,
    pub indicator: Vec<RenderMarker>,
}

impl MarkerLayers {
    pub fn attached(target: BaseSeries, markers: Vec<RenderMarker>) -> Self {
        match target {
            BaseSeries::Price => Self {
                price: markers,
                indicator: Vec::new(),
            },
            BaseSeries::Indicator => Self {
                price: Vec::new(),
                indicator: markers,
            },
        }
    }

    pub fn on(&self, base: BaseSeries) -> &[RenderMarker] {
        match base {
            BaseSeries::Price => &self.price,
            BaseSeries::Indicator => &self.indicator,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_empty() && self.indicator.is_empty()
    }
}

/// Reconciler output for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub visible: Option<BaseSeries>,
    /// Base price, indicator line and reference line, always all three
    pub series: Vec<OverlaySeries>,
    pub markers: MarkerLayers,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesReconciler;

impl SeriesReconciler {
    /// Indicator if it is named and non-empty, else price if non-empty, else nothing.
    pub fn visible_base(&self, input: &ChartInput) -> Option<BaseSeries> {
        if input.active_indicator().is_some() {
            Some(BaseSeries::Indicator)
        } else if !input.price_data.is_empty() {
            Some(BaseSeries::Price)
        } else {
            None
        }
    }

    /// Break markers become neon arrows without text; others keep their own look.
    pub fn style_marker(&self, marker: &Marker) -> RenderMarker {
        let (color, shape, text) = match &marker.direction {
            Some(BreakDirection::Bullish) => {
                (BULLISH_BREAK_COLOR.to_string(), MarkerShape::ArrowUp, String::new())
            }
            Some(BreakDirection::Bearish) => {
                (BEARISH_BREAK_COLOR.to_string(), MarkerShape::ArrowDown, String::new())
            }
            _ => (
                marker.color.clone(),
                marker.shape,
                marker.text.clone().unwrap_or_default(),
            ),
        };
        RenderMarker {
            time: marker.time,
            position: marker.position,
            color,
            shape,
            text,
        }
    }

    /// Two-point horizontal line across the first and last base time.
    pub fn reference_line(&self, level: Option<f64>, base_times: &[i64]) -> Vec<SeriesPoint> {
        match (level.filter(|l| l.is_finite()), base_times) {
            (Some(level), [first, .., last]) => {
                vec![SeriesPoint::new(*first, level), SeriesPoint::new(*last, level)]
            }
            _ => Vec::new(),
        }
    }

    pub fn reconcile(&self, input: &ChartInput, markers: &[ClassifiedMarker]) -> Reconciliation {
        let visible = self.visible_base(input);
        let indicator_name = input.indicator.as_ref().map_or("", |i| i.name.as_str());

        let mut price = OverlaySeries {
            key: OverlayKey::base_price(),
            kind: OverlayKind::BasePrice,
            points: OverlayPoints::Candles(input.price_data.clone()),
            visible: visible == Some(BaseSeries::Price),
            style: SeriesStyle::candles(),
        };
        let indicator_points = match visible {
            Some(BaseSeries::Indicator) => input
                .active_indicator()
                .map(|i| i.points.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let indicator = OverlaySeries::line(
            OverlayKey::indicator_line(),
            OverlayKind::IndicatorLine,
            indicator_points,
            SeriesStyle::indicator(indicator_name),
        );

        let base_times = match visible {
            Some(BaseSeries::Price) => price.points.times(),
            Some(BaseSeries::Indicator) => indicator.points.times(),
            None => Vec::new(),
        };
        let reference = OverlaySeries::line(
            OverlayKey::reference_line(),
            OverlayKind::ReferenceLine,
            self.reference_line(input.reference_level, &base_times),
            SeriesStyle::reference(),
        );

        let layers = match visible {
            Some(base) => {
                let mut styled: Vec<RenderMarker> = markers
                    .iter()
                    .filter(|m| !m.is_bowl())
                    .map(|m| self.style_marker(m.marker()))
                    .collect();
                styled.sort_by_key(|m| m.time);
                MarkerLayers::attached(base, styled)
            }
            None => {
                price = price.retired();
                MarkerLayers::default()
            }
        };

        Reconciliation {
            visible,
            series: vec![price, indicator, reference],
            markers: layers,
        }
    }
}

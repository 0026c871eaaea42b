//! Render styling attached to overlay series

/// Bowl curve colors, indexed by `abs(cluster id) % 10`. Order is part of the output.
pub const BOWL_PALETTE: [&str; 10] = [
    "#2962FF", "#FF6D00", "#00BFA5", "#D500F9", "#FFD600", "#00E676", "#FF1744", "#FFFFFF",
    "#9C27B0", "#00BCD4",
];

pub const RANGE_LINE_COLOR: &str = "#888888";
pub const REFERENCE_LINE_COLOR: &str = "#f59e0b";
pub const CANDLE_UP_COLOR: &str = "#26a69a";
pub const CANDLE_DOWN_COLOR: &str = "#ef5350";
pub const DEFAULT_LINE_COLOR: &str = "#2962FF";
pub const BULLISH_BREAK_COLOR: &str = "#00E5FF";
pub const BEARISH_BREAK_COLOR: &str = "#FFD600";

pub const BOWL_LINE_WIDTH: u8 = 3;
pub const INDICATOR_LINE_WIDTH: u8 = 2;
pub const REFERENCE_LINE_WIDTH: u8 = 2;
pub const RANGE_LINE_WIDTH: u8 = 1;

#[inline]
pub fn bowl_color(seed: i64) -> &'static str {
    BOWL_PALETTE[(seed.unsigned_abs() % BOWL_PALETTE.len() as u64) as usize]
}

/// Line color for a named indicator series
pub fn indicator_color(name: &str) -> &'static str {
    match name {
        "ema21" => "#00E5FF",
        "ema50" => "#2962FF",
        "ema200" => "#7C4DFF",
        "rsc30" => "#00E676",
        "rsc500" => "#FFD600",
        _ => DEFAULT_LINE_COLOR,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
}

/// How the surface should paint a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SeriesStyle {
    pub color: &'static str,
    /// Candles only: color of falling bars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_color: Option<&'static str>,
    pub line_width: u8,
    pub line_style: LineStyle,
}

impl SeriesStyle {
    pub const fn line(color: &'static str, line_width: u8, line_style: LineStyle) -> Self {
        Self {
            color,
            down_color: None,
            line_width,
            line_style,
        }
    }

    pub fn bowl(seed: i64) -> Self {
        Self::line(bowl_color(seed), BOWL_LINE_WIDTH, LineStyle::Solid)
    }

    pub const fn range() -> Self {
        Self::line(RANGE_LINE_COLOR, RANGE_LINE_WIDTH, LineStyle::Dashed)
    }

    pub fn indicator(name: &str) -> Self {
        Self::line(indicator_color(name), INDICATOR_LINE_WIDTH, LineStyle::Solid)
    }

    pub const fn reference() -> Self {
        Self::line(REFERENCE_LINE_COLOR, REFERENCE_LINE_WIDTH, LineStyle::Dashed)
    }

    pub const fn candles() -> Self {
        Self {
            color: CANDLE_UP_COLOR,
            down_color: Some(CANDLE_DOWN_COLOR),
            line_width: 1,
            line_style: LineStyle::Solid,
        }
    }
}

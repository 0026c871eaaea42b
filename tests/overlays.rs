//! Integration tests for the overlay engine.
//!
//! These drive full recomputations through the public API and check what the
//! rendering surface would see.

use pattern_overlays::prelude::*;
use serde_json::json;

const DAY: i64 = 86_400;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Daily bars tracing a shallow U over `n` days
fn make_bowl_bars(n: i64) -> Vec<PricePoint> {
    (0..n)
        .map(|i| {
            let x = (i - n / 2) as f64;
            let low = 100.0 + x * x * 0.02;
            PricePoint::new(i * DAY, low + 1.0, low + 2.5, low, low + 1.5)
        })
        .collect()
}

fn bowl_marker(day: i64, pattern_id: i64) -> Marker {
    Marker::new(day * DAY).with_pattern_id(pattern_id)
}

fn bowl_input(markers: Vec<Marker>) -> ChartInput {
    ChartInput::new(PatternKind::Bowl)
        .with_prices(make_bowl_bars(160))
        .with_markers(markers)
}

fn engine() -> OverlayEngine {
    EngineBuilder::new().build().unwrap()
}

// ============================================================
// BOWL CURVES
// ============================================================

#[test]
fn test_one_curve_per_backend_id() {
    init_tracing();
    let mut engine = engine();
    let frame = engine
        .recompute(&bowl_input(vec![
            bowl_marker(40, 1),
            bowl_marker(45, 1),
            bowl_marker(120, 2),
        ]))
        .unwrap();

    let curves: Vec<_> = frame.of_kind(OverlayKind::BowlCurve).collect();
    assert_eq!(curves.len(), 2);
    assert!(curves.iter().all(|c| c.visible && !c.points.is_empty()));
    assert_eq!(curves[0].style.color, BOWL_PALETTE[1]);
    assert_eq!(curves[1].style.color, BOWL_PALETTE[2]);
}

#[test]
fn test_fallback_clustering_by_gap() {
    let mut engine = engine();
    let markers = [0, 5, 10, 50, 55]
        .iter()
        .map(|d| Marker::new(d * DAY).with_text("Bowl"))
        .collect();
    let plan = engine.plan(&bowl_input(markers)).unwrap();

    assert_eq!(plan.clusters.len(), 2);
    let times: Vec<Vec<i64>> = plan
        .clusters
        .iter()
        .map(|c| c.members.iter().map(|m| m.time / DAY).collect())
        .collect();
    assert_eq!(times, vec![vec![0, 5, 10], vec![50, 55]]);
    assert!(plan.clusters.iter().all(|c| !c.id.is_backend()));

    let frame = engine.recompute(&bowl_input(vec![])).unwrap();
    assert_eq!(frame.of_kind(OverlayKind::BowlCurve).count(), 0);
}

#[test]
fn test_cluster_outside_data_gives_empty_curve() {
    let mut engine = engine();
    let frame = engine.recompute(&bowl_input(vec![bowl_marker(5_000, 9)])).unwrap();
    let curve = frame.get(&OverlayKey::bowl(&ClusterId::Backend(9))).unwrap();
    assert!(curve.points.is_empty());
    assert!(!curve.visible);
}

#[test]
fn test_bowl_curve_follows_indicator_base() {
    let mut engine = engine();
    let indicator: Vec<SeriesPoint> = (0..160)
        .map(|i| SeriesPoint::new(i * DAY, 50.0 + ((i - 80) as f64).abs() * 0.1))
        .collect();
    let input = bowl_input(vec![bowl_marker(80, 4)])
        .with_indicator(IndicatorSeries::new("ema21", indicator));

    let frame = engine.recompute(&input).unwrap();
    let curve = frame.get(&OverlayKey::bowl(&ClusterId::Backend(4))).unwrap();
    let values: Vec<f64> = curve.points.as_line().unwrap().iter().map(|p| p.value).collect();
    assert!(values.iter().all(|v| (50.0..=60.0).contains(v)));
    assert_eq!(frame.visible_base, Some(BaseSeries::Indicator));
}

// ============================================================
// RETIREMENT AND IDEMPOTENCE
// ============================================================

#[test]
fn test_retirement_across_passes() {
    let mut engine = engine();
    let a = OverlayKey::bowl(&ClusterId::Backend(1));
    let b = OverlayKey::bowl(&ClusterId::Backend(2));
    let c = OverlayKey::bowl(&ClusterId::Backend(3));

    let first = engine
        .recompute(&bowl_input(vec![bowl_marker(30, 1), bowl_marker(90, 2)]))
        .unwrap();
    let b_before = first.get(&b).unwrap().points.times();
    assert_eq!(b_before.first(), Some(&(60 * DAY)));

    let second = engine
        .recompute(&bowl_input(vec![bowl_marker(100, 2), bowl_marker(140, 3)]))
        .unwrap();

    let retired = second.get(&a).unwrap();
    assert!(retired.points.is_empty() && !retired.visible);
    assert!(second.is_retired(&a));

    assert!(!second.get(&c).unwrap().points.is_empty());
    assert!(!second.is_retired(&c));

    // replaced, not appended: the span now pads day 100 by 30 days each side
    let b_times = second.get(&b).unwrap().points.times();
    assert_eq!(b_times.first(), Some(&(70 * DAY)));
    assert_eq!(b_times.last(), Some(&(130 * DAY)));
    assert_eq!(b_times.len(), 61);
    assert_ne!(b_times, b_before);
    assert_eq!(second.series.iter().filter(|s| s.key == b).count(), 1);

    assert!(engine.arena().get(&a).is_none());
}

#[test]
fn test_range_keys_retire_with_their_markers() {
    let mut engine = engine();
    let nrb = |id: &str, day: i64| {
        Marker::new(day * DAY)
            .with_range(95.0, 105.0, (day - 5) * DAY, day * DAY)
            .with_nrb_id(id)
    };
    let input = |markers: Vec<Marker>| {
        ChartInput::new(PatternKind::NarrowRangeBreak)
            .with_prices(make_bowl_bars(60))
            .with_markers(markers)
    };

    engine.recompute(&input(vec![nrb("x", 10), nrb("y", 20)])).unwrap();
    let frame = engine.recompute(&input(vec![nrb("y", 20)])).unwrap();

    assert!(frame.is_retired(&OverlayKey::range_high("x")));
    assert!(frame.is_retired(&OverlayKey::range_low("x")));
    assert_eq!(frame.of_kind(OverlayKind::RangeHigh).filter(|s| s.visible).count(), 1);
    assert_eq!(engine.arena().owner(&OverlayKey::range_low("y")), Some(OverlayOwner::RangeExtractor));
}

#[test]
fn test_recompute_twice_is_stable() {
    let mut engine = engine();
    let input = bowl_input(vec![bowl_marker(40, 1), Marker::new(70 * DAY).with_range(90.0, 110.0, 60 * DAY, 70 * DAY)])
        .with_week52_reference();

    let first = engine.recompute(&input).unwrap();
    let live = engine.arena().len();
    let second = engine.recompute(&input).unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.arena().len(), live);
    assert!(second.retired.is_empty());
}

#[test]
fn test_symbol_switches_do_not_grow_arena() {
    let mut engine = engine();
    for round in 0..40 {
        engine
            .recompute(&bowl_input(vec![bowl_marker(30, round), bowl_marker(90, round + 100)]))
            .unwrap();
    }
    // two curves plus the three base series
    assert_eq!(engine.arena().len(), 5);
    assert!(engine.arena().capacity() <= 7);
}

// ============================================================
// RECONCILIATION
// ============================================================

#[test]
fn test_all_empty_update_clears_everything() {
    let mut engine = engine();
    let populated = bowl_input(vec![
        bowl_marker(40, 1),
        Marker::new(70 * DAY)
            .with_range(90.0, 110.0, 60 * DAY, 70 * DAY)
            .with_direction(BreakDirection::Bullish),
    ])
    .with_reference_level(Some(130.0));
    engine.recompute(&populated).unwrap();

    let empty = ChartInput::new(PatternKind::Bowl)
        .with_markers(populated.markers.clone())
        .with_reference_level(Some(130.0));
    let frame = engine.recompute(&empty).unwrap();

    for key in [
        OverlayKey::bowl(&ClusterId::Backend(1)),
        OverlayKey::range_high(&(70 * DAY).to_string()),
        OverlayKey::range_low(&(70 * DAY).to_string()),
        OverlayKey::base_price(),
        OverlayKey::indicator_line(),
        OverlayKey::reference_line(),
    ] {
        let series = frame.get(&key).unwrap_or_else(|| panic!("{key} missing"));
        assert!(series.points.is_empty(), "{key} still has points");
        assert!(!series.visible, "{key} still visible");
    }
    assert!(frame.markers.price.is_empty());
    assert!(frame.markers.indicator.is_empty());
    assert_eq!(frame.visible_base, None);
}

#[test]
fn test_markers_follow_visible_base() {
    let mut engine = engine();
    let markers = vec![
        Marker::new(10 * DAY).with_direction(BreakDirection::Bearish),
        Marker::new(20 * DAY).with_text("watch"),
    ];
    let on_price = ChartInput::new(PatternKind::NarrowRangeBreak)
        .with_prices(make_bowl_bars(40))
        .with_markers(markers);

    let frame = engine.recompute(&on_price).unwrap();
    assert_eq!(frame.markers.price.len(), 2);
    assert_eq!(frame.markers.price[0].shape, MarkerShape::ArrowDown);
    assert_eq!(frame.markers.price[1].text, "watch");
    assert!(frame.get(&OverlayKey::base_price()).unwrap().visible);

    let line: Vec<SeriesPoint> = (0..40).map(|i| SeriesPoint::new(i * DAY, 1.0)).collect();
    let on_indicator = on_price.clone().with_indicator(IndicatorSeries::new("rsc30", line));
    let frame = engine.recompute(&on_indicator).unwrap();

    assert!(frame.markers.on(BaseSeries::Price).is_empty());
    assert_eq!(frame.markers.on(BaseSeries::Indicator).len(), 2);
    let base = frame.get(&OverlayKey::base_price()).unwrap();
    assert!(!base.visible);
    let indicator = frame.get(&OverlayKey::indicator_line()).unwrap();
    assert!(indicator.visible);
    assert_eq!(indicator.style.color, "#00E676");
}

#[test]
fn test_reference_line_uses_visible_base_span() {
    let mut engine = engine();
    let input = ChartInput::new(PatternKind::Bowl)
        .with_prices(make_bowl_bars(30))
        .with_reference_level(Some(250.0));
    let frame = engine.recompute(&input).unwrap();

    let line = frame.get(&OverlayKey::reference_line()).unwrap();
    assert_eq!(
        line.points.as_line().unwrap(),
        &[SeriesPoint::new(0, 250.0), SeriesPoint::new(29 * DAY, 250.0)]
    );
    assert_eq!(line.style.line_style, LineStyle::Dashed);
}

// ============================================================
// PAYLOAD TO FRAME
// ============================================================

#[test]
fn test_scan_response_end_to_end() {
    init_tracing();
    let price_data: Vec<_> = make_bowl_bars(20)
        .iter()
        .map(|b| json!({ "time": b.time, "open": b.open, "high": b.high, "low": b.low, "close": b.close }))
        .collect();
    let payload = json!({
        "scrip": "RELIANCE",
        "pattern": "Narrow Range Break",
        "price_data": price_data,
        "triggers": [
            {
                "time": 10 * DAY,
                "text": "NRB",
                "range_low": 95,
                "range_high": "105",
                "range_start_time": 1000,
                "range_end_time": 2000,
                "direction": "Bullish Break"
            },
            { "note": "no time, dropped" }
        ]
    });

    let response = ScanResponse::from_value(&payload, "Narrow Range Break");
    assert_eq!(response.markers.len(), 1);

    let mut engine = engine();
    let frame = engine.recompute(&ChartInput::from_response(response)).unwrap();

    let group = (10 * DAY).to_string();
    let high = frame.get(&OverlayKey::range_high(&group)).unwrap();
    assert_eq!(
        high.points.as_line().unwrap(),
        &[SeriesPoint::new(1000, 105.0), SeriesPoint::new(2000, 105.0)]
    );
    let low = frame.get(&OverlayKey::range_low(&group)).unwrap();
    assert_eq!(
        low.points.as_line().unwrap(),
        &[SeriesPoint::new(1000, 95.0), SeriesPoint::new(2000, 95.0)]
    );
    assert_eq!(high.style.color, "#888888");

    assert_eq!(frame.markers.price.len(), 1);
    assert_eq!(frame.markers.price[0].color, "#00E5FF");
    assert!(frame.markers.price[0].text.is_empty());
}

#[test]
fn test_frame_serializes() {
    let mut engine = engine();
    let frame = engine.recompute(&bowl_input(vec![bowl_marker(40, 1)])).unwrap();
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["visible_base"], "price");
    assert!(value["series"].as_array().is_some_and(|s| !s.is_empty()));
}

// ============================================================
// CONFIGURATION
// ============================================================

#[test]
fn test_config_from_json() {
    let config: EngineConfig =
        serde_json::from_str(r#"{ "cluster_gap": 864000, "calendar": { "Offset": 19800 } }"#).unwrap();
    assert_eq!(config.cluster_gap, 10 * DAY);
    assert_eq!(config.span_extend, 30 * DAY);
    assert_eq!(config.calendar, CalendarZone::Offset(19_800));

    let engine = EngineBuilder::new().config(config.clone()).build().unwrap();
    assert_eq!(engine.config(), &config);

    assert!(serde_json::from_str::<EngineConfig>(r#"{ "bowl_depth": 2.0 }"#).is_err());
}

#[test]
fn test_engine_resample_uses_calendar() {
    let monday = 1_704_067_200;
    let daily: Vec<PricePoint> = (0..14)
        .map(|i| PricePoint::new(monday + i * DAY, 10.0, 11.0, 9.0, 10.0).with_volume(10))
        .collect();

    let utc = engine();
    let weekly = utc.resample(&daily, Timeframe::Weekly);
    assert_eq!(weekly.len(), 2);
    assert_eq!(weekly[0].volume, Some(70));
    assert_eq!(utc.resample(&daily, Timeframe::Daily).len(), 14);

    let ist = EngineBuilder::new()
        .calendar(CalendarZone::Tz(chrono_tz::Asia::Kolkata))
        .build()
        .unwrap();
    let weekly = ist.resample(&daily, Timeframe::Weekly);
    assert_eq!(weekly[0].time, monday - 19_800);
}

#[test]
fn test_resample_skips_out_of_range_payload_times() {
    let payload = json!({
        "price_data": [
            { "time": i64::MIN + 1000, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5 },
            { "time": 1_704_067_200, "open": 1.0, "high": 3.0, "low": 0.5, "close": 2.5 }
        ]
    });
    let response = ScanResponse::from_value(&payload, "Bowl");
    assert_eq!(response.price_data.len(), 2);

    let weekly = resample_weekly(&response.price_data, &CalendarZone::Utc);
    assert_eq!(weekly.len(), 1);
    assert_eq!(weekly[0].time, 1_704_067_200);
    assert_eq!(weekly[0].close, 2.5);
}

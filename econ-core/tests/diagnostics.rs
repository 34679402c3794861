//! Non-fatal diagnostics: numeric faults and stale reads are logged, not raised.

#![cfg(feature = "instrument")]

use econ_core::instrument::{ColumnData, LEVEL_COLUMN, MESSAGE_COLUMN, TableSet, TableSubscriber, capture};
use econ_core::{
    CalibrationYears, GdpConfig, GdpTrajectory, ModelTime, Region, Scenario, World,
};

// === HELPERS ===

/// 1975, 1990 (base PPP and last historical year), 2005, 2020.
fn time() -> ModelTime {
    ModelTime::from_years(&[1975, 1990, 2005, 2020]).unwrap()
}

fn initialized(config: GdpConfig) -> GdpTrajectory {
    let time = time();
    let mut gdp = GdpTrajectory::new(&config, &time, CalibrationYears::default()).unwrap();
    gdp.init_data(&time, &[100.0; 4]).unwrap();
    gdp
}

/// (level, message) of every row logged on `target`.
fn rows(tables: &TableSet, target: &str) -> Vec<(String, String)> {
    let Some(table) = tables.table(target) else {
        return Vec::new();
    };
    let text = |name: &str| {
        table
            .column(name)
            .and_then(ColumnData::as_text)
            .map(<[_]>::to_vec)
            .unwrap_or_else(|| vec![None; table.rows])
    };
    text(LEVEL_COLUMN)
        .into_iter()
        .zip(text(MESSAGE_COLUMN))
        .map(|(level, message)| (level.unwrap_or_default(), message.unwrap_or_default()))
        .collect()
}

fn count(rows: &[(String, String)], level: &str, message: &str) -> usize {
    rows.iter()
        .filter(|(l, m)| l == level && m == message)
        .count()
}

// === GDP ===

#[test]
fn stale_read_warns() {
    let gdp = initialized(GdpConfig::constant(4, 1000.0, 0.02, 0.5));

    let (value, tables) = capture(TableSubscriber::new(), || gdp.gdp(2));
    assert_eq!(value, gdp.approx_gdp(2));

    let logged = rows(&tables, "gdp");
    assert_eq!(
        count(&logged, "WARN", "adjusted GDP requested before it was calculated"),
        1
    );
    let accessor = tables
        .table("gdp")
        .and_then(|t| t.column("accessor"))
        .and_then(ColumnData::as_text)
        .unwrap();
    assert_eq!(accessor, &[Some("gdp".to_string())][..]);
}

#[test]
fn adjusted_read_is_silent() {
    let mut gdp = initialized(GdpConfig::constant(4, 1000.0, 0.02, 0.5));
    gdp.adjust_gdp(2, 1.1);

    let (_, tables) = capture(TableSubscriber::new(), || gdp.gdp(2));
    assert!(rows(&tables, "gdp").is_empty());
}

#[test]
fn invalid_adjustment_logs_error() {
    let mut gdp = initialized(GdpConfig::constant(4, 1000.0, 0.02, 0.5).with_elasticity(0.5));

    let (outcome, tables) = capture(TableSubscriber::new(), || gdp.adjust_gdp(2, -1.0));
    assert!(outcome.is_defaulted());
    assert_eq!(
        count(
            &rows(&tables, "gdp"),
            "ERROR",
            "invalid energy-adjusted GDP, keeping unadjusted value"
        ),
        1
    );
}

// === PPP ===

#[test]
fn undefined_exponent_logs_error() {
    let time = time();
    let config = GdpConfig::constant(4, 1000.0, 0.02, 0.5).with_ppp_conversion(3.0, false);
    let mut gdp = GdpTrajectory::new(&config, &time, CalibrationYears::default()).unwrap();

    let (ratio, tables) = capture(TableSubscriber::new(), || gdp.ppp_mer_ratio(1, 0.0));
    assert!(ratio.is_defaulted());
    assert_eq!(
        count(
            &rows(&tables, "ppp"),
            "ERROR",
            "cannot derive PPP convergence exponent, conversion defaults to 1"
        ),
        1
    );
}

// === SCENARIO ===

#[test]
fn defaulted_adjustment_is_logged_once_per_run() {
    let time = ModelTime::from_years(&[1990, 1995, 2000]).unwrap();
    let config = GdpConfig::constant(3, 1000.0, 0.02, 0.5).with_elasticity(0.5);
    let gdp = GdpTrajectory::new(&config, &time, CalibrationYears::default()).unwrap();
    let region = Region::new("USA", vec![100.0; 3], gdp).with_energy_price_ratio(vec![1.0, 1.0, -1.0]);
    let mut world = World::new();
    world.add_region(region).unwrap();

    let mut scenario = Scenario::new("faulty", time, Some(world));
    let (outcome, tables) = capture(TableSubscriber::new(), || scenario.run());
    assert!(outcome.unwrap().is_solved());

    let logged = rows(&tables, "gdp");
    assert_eq!(logged.iter().filter(|(level, _)| level == "ERROR").count(), 1);
    assert!(logged.iter().all(|(level, _)| level != "WARN"), "{logged:?}");
}

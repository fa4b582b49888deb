//! End-to-end forecasting scenario on a synthetic panel.
//!
//! 100 entities observed 2000-2019, autoregressive linear-with-noise
//! target. Trains on years before 2015, evaluates one-step (teacher
//! forcing) against the recursive 5-year forecast.

use pronosticar::forecast::{ModelSet, RecursiveForecaster};
use pronosticar::linear_model::Ridge;
use pronosticar::model::{
    train_chronological, train_per_cluster, AnyRegressor, HybridRegressor,
};
use pronosticar::panel::Panel;
use pronosticar::pipeline::LinearPipeline;
use pronosticar::preprocessing::OutlierConfig;
use pronosticar::cluster::EntityClusterer;
use pronosticar::tree::GradientBoostingRegressor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SPLIT_YEAR: i32 = 2015;

/// Autoregressive synthetic panel:
/// co2(e, y) = 0.8 * co2(e, y-1) + 0.3 * gdp(e, y) + noise
fn synthetic_panel(n_entities: usize, noise: f32, seed: u64) -> Panel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut entities = Vec::new();
    let mut years = Vec::new();
    let mut co2 = Vec::new();
    let mut gdp = Vec::new();

    for e in 0..n_entities {
        let name = format!("E{e:03}");
        let base = 50.0 + 10.0 * (e % 10) as f32;
        let mut level = base;
        for year in 2000..=2019 {
            let t = (year - 2000) as f32;
            let g = base * 0.2 + 0.5 * t + rng.random_range(-0.5..0.5);
            level = 0.8 * level + 0.3 * g + 5.0 + noise * rng.random_range(-1.0..1.0);

            entities.push(name.clone());
            years.push(year);
            co2.push(level);
            gdp.push(g);
        }
    }

    let mut panel = Panel::new(
        entities,
        years,
        vec![("co2".to_string(), co2), ("gdp".to_string(), gdp)],
    )
    .expect("panel construction");
    panel
        .add_lag_features(&["co2"], 1)
        .expect("lag generation");
    panel
}

#[test]
fn one_step_beats_half_and_recursive_never_beats_one_step() {
    let panel = synthetic_panel(100, 1.0, 7);

    let prepared = LinearPipeline::new("co2", "co2_lag1", SPLIT_YEAR)
        .with_outlier_config(OutlierConfig::default().with_threshold(10.0))
        .run(&panel)
        .expect("pipeline");

    let artifact = train_chronological(
        AnyRegressor::Ridge(Ridge::new(1.0)),
        &prepared.table,
        SPLIT_YEAR,
        prepared.lag_stats,
    )
    .expect("training");
    let models = ModelSet::Global(artifact);

    let (_, test) = prepared.table.split_by_year(SPLIT_YEAR);
    assert!(test.n_rows() > 0, "held-out slice must be non-empty");

    let forecaster = RecursiveForecaster::new("co2_lag1");
    let (tf_preds, tf_report) = forecaster
        .teacher_forcing(&models, &test)
        .expect("teacher forcing");
    let (rec_preds, rec_report) = forecaster.forecast(&models, &test).expect("recursive");

    let r2_one_step = tf_preds.r_squared();
    let r2_recursive = rec_preds.r_squared();

    assert!(
        r2_one_step > 0.5,
        "one-step R² should exceed 0.5 on a well-behaved linear target, got {r2_one_step}"
    );
    assert!(
        r2_recursive <= r2_one_step + 1e-6,
        "recursive forecasting must not beat teacher forcing: {r2_recursive} vs {r2_one_step}"
    );

    // Teacher forcing never mutates lags
    assert_eq!(tf_report.propagated, 0);
    // Recursive propagation covered every non-terminal year with no attrition
    assert_eq!(rec_report.years, vec![2015, 2016, 2017, 2018, 2019]);
    assert!(rec_report.propagated > 0);
    assert_eq!(rec_report.missed_propagations, 0);

    // Macro-MAPE is finite and the per-entity grouping is complete
    let mape = rec_preds.macro_mape(1e-6);
    assert!(mape.median.is_finite());
    assert_eq!(mape.per_entity.len(), 100);
}

#[test]
fn protected_extreme_entity_survives_full_pipeline() {
    let mut panel = synthetic_panel(40, 1.0, 11);

    // Graft an entity two orders of magnitude above the rest
    let mut entities = Vec::new();
    let mut years = Vec::new();
    let mut co2 = Vec::new();
    let mut gdp = Vec::new();
    for year in 2000..=2019 {
        entities.push("China".to_string());
        years.push(year);
        co2.push(9000.0 + 100.0 * (year - 2000) as f32);
        gdp.push(4000.0);
    }
    // Rebuild the panel with the extra entity appended
    let mut all_entities = panel.entities().to_vec();
    let mut all_years = panel.years().to_vec();
    let mut all_co2 = panel.column("co2").expect("co2").to_vec();
    let mut all_gdp = panel.column("gdp").expect("gdp").to_vec();
    let mut all_lag = panel.column("co2_lag1").expect("lag").to_vec();
    all_entities.extend(entities);
    all_years.extend(years);
    all_co2.extend(co2.clone());
    all_gdp.extend(gdp);
    // Lag for the grafted entity: previous year's co2, first year dropped later
    all_lag.extend((0..20).map(|i| {
        if i == 0 {
            co2[0] // placeholder, first year is pre-lagged here
        } else {
            co2[i - 1]
        }
    }));
    panel = Panel::new(
        all_entities,
        all_years,
        vec![
            ("co2".to_string(), all_co2),
            ("gdp".to_string(), all_gdp),
            ("co2_lag1".to_string(), all_lag),
        ],
    )
    .expect("rebuilt panel");

    let rows_before = panel
        .entities()
        .iter()
        .filter(|e| e.as_str() == "China")
        .count();

    let prepared = LinearPipeline::new("co2", "co2_lag1", SPLIT_YEAR)
        .with_outlier_config(OutlierConfig::default().with_threshold(1.5))
        .run(&panel)
        .expect("pipeline");

    let rows_after = prepared
        .table
        .entities()
        .iter()
        .filter(|e| e.as_str() == "China")
        .count();
    assert_eq!(
        rows_after, rows_before,
        "whitelisted entity must keep every row at any threshold"
    );
}

#[test]
fn index_map_recovers_entity_and_year() {
    let panel = synthetic_panel(30, 1.0, 3);
    let prepared = LinearPipeline::new("co2", "co2_lag1", SPLIT_YEAR)
        .with_outlier_config(OutlierConfig::default().with_threshold(1.0))
        .run(&panel)
        .expect("pipeline");

    let map = prepared.index_map.expect("linear pipeline emits an index map");

    // The table the filter consumed had one row per surviving row id; walk
    // the map and confirm entity/year provenance agrees with the panel.
    let mut panel_by_id = std::collections::HashMap::new();
    for i in 0..panel.n_rows() {
        panel_by_id.insert(
            panel.row_ids()[i],
            (panel.entities()[i].clone(), panel.years()[i]),
        );
    }
    for filtered_pos in 0..prepared.table.n_rows() {
        let row_id = map.row_id(filtered_pos).expect("mapped row id");
        let (entity, year) = panel_by_id.get(&row_id).expect("id resolves in panel");
        assert_eq!(entity, &prepared.table.entities()[filtered_pos]);
        assert_eq!(*year, prepared.table.years()[filtered_pos]);
    }
}

#[test]
fn clustered_hybrid_forecast_runs_and_routes_by_cluster() {
    // Three well-separated entity tiers so k-means finds stable groups
    let panel = synthetic_panel(30, 0.5, 19);

    let clusterer = EntityClusterer::new(&["gdp"], SPLIT_YEAR).with_random_state(5);
    let (assignment, report) = clusterer.fit(&panel).expect("clustering");
    assert_eq!(report.unprofiled_entities.len(), 0);

    let prepared = LinearPipeline::new("co2", "co2_lag1", SPLIT_YEAR)
        .run(&panel)
        .expect("pipeline");

    let template = AnyRegressor::Hybrid(HybridRegressor::new(
        Ridge::new(1.0),
        GradientBoostingRegressor::new()
            .with_n_estimators(20)
            .with_random_state(1),
    ));
    let (artifacts, train_report) = train_per_cluster(
        &template,
        &prepared.table,
        SPLIT_YEAR,
        &assignment,
        prepared.lag_stats,
        10,
    )
    .expect("clustered training");

    assert!(!artifacts.is_empty());
    assert_eq!(train_report.unassigned_rows, 0);

    let models = ModelSet::Clustered {
        models: artifacts,
        assignment,
    };
    let (_, test) = prepared.table.split_by_year(SPLIT_YEAR);
    let forecaster = RecursiveForecaster::new("co2_lag1");
    let (preds, fc_report) = forecaster.forecast(&models, &test).expect("forecast");

    assert!(!preds.is_empty());
    assert!(preds.r_squared().is_finite());
    assert_eq!(fc_report.skipped_rows, 0);
}

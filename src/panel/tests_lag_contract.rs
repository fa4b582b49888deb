//! Property tests for the lag-generation contract.

use super::Panel;
use proptest::prelude::*;

/// Builds a panel from (entity index, year, value) triples, deduplicated
/// on (entity, year).
fn panel_from(triples: &[(u8, i32, f32)]) -> Option<Panel> {
    let mut seen = std::collections::HashSet::new();
    let mut entities = Vec::new();
    let mut years = Vec::new();
    let mut values = Vec::new();
    for &(e, y, v) in triples {
        if seen.insert((e, y)) {
            entities.push(format!("E{e}"));
            years.push(y);
            values.push(v);
        }
    }
    Panel::new(entities, years, vec![("x".to_string(), values)]).ok()
}

proptest! {
    /// For every surviving row, the lag equals the source value at
    /// (entity, year - 1); rows without such an observation are absent.
    #[test]
    fn lag_equals_prior_year_value(
        triples in prop::collection::vec(
            (0u8..4, 2000i32..2010, -100.0f32..100.0),
            1..60,
        )
    ) {
        let Some(mut panel) = panel_from(&triples) else {
            return Ok(());
        };

        // Reference copy before lagging
        let mut source = std::collections::HashMap::new();
        for i in 0..panel.n_rows() {
            source.insert(
                (panel.entities()[i].clone(), panel.years()[i]),
                panel.column("x").expect("x")[i],
            );
        }

        match panel.add_lag_features(&["x"], 1) {
            Ok(report) => {
                let lag = panel.column("x_lag1").expect("lag column");
                for i in 0..panel.n_rows() {
                    let key = (panel.entities()[i].clone(), panel.years()[i] - 1);
                    let expected = source.get(&key).expect(
                        "surviving rows must have a prior-year observation",
                    );
                    prop_assert_eq!(lag[i], *expected);
                }
                // Row accounting is exact
                prop_assert_eq!(
                    panel.n_rows() + report.dropped_rows,
                    source.len()
                );
            }
            Err(_) => {
                // Every row lacked a lag; acceptable for sparse draws
            }
        }
    }
}

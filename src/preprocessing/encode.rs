//! Entity encoders for the per-model feature tables.
//!
//! The linear and kernel pipelines one-hot encode the entity as fixed
//! effects; the tree pipeline uses a single ordinal code, which split-based
//! learners handle directly and which avoids the one-hot column explosion.
//!
//! One-hot encoding destroys the original categorical column, so any stage
//! that needs entity identity (outlier whitelisting, per-entity metrics)
//! must take its mask from the panel *before* encoding runs.

use crate::error::{PronosticarError, Result};
use crate::primitives::Matrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One-hot encodes entities into (distinct − 1) indicator columns.
///
/// The first level in sorted order is the dropped reference category.
/// Unknown entities at transform time encode as all zeros, the same row a
/// reference-level entity produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    /// Distinct levels in sorted order; index 0 is the reference.
    categories: Option<Vec<String>>,
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OneHotEncoder {
    /// Creates a new unfitted encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { categories: None }
    }

    /// Learns the distinct levels.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or fewer than two distinct levels.
    pub fn fit(&mut self, entities: &[String]) -> Result<()> {
        if entities.is_empty() {
            return Err(PronosticarError::empty_table("one_hot_fit"));
        }
        let mut levels: Vec<String> = entities.to_vec();
        levels.sort();
        levels.dedup();
        if levels.len() < 2 {
            return Err(PronosticarError::InvalidHyperparameter {
                param: "entities".to_string(),
                value: format!("{} distinct", levels.len()),
                constraint: "at least 2 distinct levels".to_string(),
            });
        }
        self.categories = Some(levels);
        Ok(())
    }

    /// Returns the learned levels (reference level first).
    ///
    /// # Panics
    ///
    /// Panics if the encoder is not fitted.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        self.categories
            .as_ref()
            .expect("Encoder not fitted. Call fit() first.")
    }

    /// Names of the produced columns: `<prefix><level>` for every
    /// non-reference level.
    ///
    /// # Panics
    ///
    /// Panics if the encoder is not fitted.
    #[must_use]
    pub fn column_names(&self, prefix: &str) -> Vec<String> {
        self.categories()[1..]
            .iter()
            .map(|level| format!("{prefix}{level}"))
            .collect()
    }

    /// Encodes entities into a 0/1 matrix with (distinct − 1) columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder is not fitted.
    pub fn transform(&self, entities: &[String]) -> Result<Matrix<f32>> {
        let categories = self
            .categories
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Encoder not fitted"))?;

        let index: HashMap<&str, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let n_cols = categories.len() - 1;
        let mut data = vec![0.0; entities.len() * n_cols];
        for (row, entity) in entities.iter().enumerate() {
            if let Some(&level) = index.get(entity.as_str()) {
                if level > 0 {
                    data[row * n_cols + (level - 1)] = 1.0;
                }
            }
            // Unknown entity: all zeros, indistinguishable from the reference
        }

        Matrix::from_vec(entities.len(), n_cols, data).map_err(Into::into)
    }
}

/// Encodes entities as a single integer code column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    categories: Option<Vec<String>>,
}

impl Default for OrdinalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrdinalEncoder {
    /// Creates a new unfitted encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { categories: None }
    }

    /// Learns the distinct levels in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input.
    pub fn fit(&mut self, entities: &[String]) -> Result<()> {
        if entities.is_empty() {
            return Err(PronosticarError::empty_table("ordinal_fit"));
        }
        let mut levels: Vec<String> = entities.to_vec();
        levels.sort();
        levels.dedup();
        self.categories = Some(levels);
        Ok(())
    }

    /// Returns the learned levels.
    ///
    /// # Panics
    ///
    /// Panics if the encoder is not fitted.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        self.categories
            .as_ref()
            .expect("Encoder not fitted. Call fit() first.")
    }

    /// Encodes entities as codes; unknown entities map to -1.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder is not fitted.
    pub fn transform(&self, entities: &[String]) -> Result<Vec<f32>> {
        let categories = self
            .categories
            .as_ref()
            .ok_or_else(|| PronosticarError::from("Encoder not fitted"))?;

        let index: HashMap<&str, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        Ok(entities
            .iter()
            .map(|e| index.get(e.as_str()).map_or(-1.0, |&i| i as f32))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_one_hot_drops_reference_level() {
        let data = entities(&["China", "Aruba", "Brazil", "China"]);
        let mut enc = OneHotEncoder::new();
        enc.fit(&data).expect("fit");

        // Sorted levels: Aruba (reference), Brazil, China
        assert_eq!(enc.categories(), &["Aruba", "Brazil", "China"]);
        assert_eq!(
            enc.column_names("Entity_"),
            vec!["Entity_Brazil".to_string(), "Entity_China".to_string()]
        );

        let m = enc.transform(&data).expect("transform");
        assert_eq!(m.shape(), (4, 2));
        // China -> [0, 1]
        assert_eq!(m.row(0).as_slice(), &[0.0, 1.0]);
        // Aruba (reference) -> [0, 0]
        assert_eq!(m.row(1).as_slice(), &[0.0, 0.0]);
        // Brazil -> [1, 0]
        assert_eq!(m.row(2).as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_one_hot_unknown_encodes_as_zeros() {
        let mut enc = OneHotEncoder::new();
        enc.fit(&entities(&["A", "B"])).expect("fit");
        let m = enc.transform(&entities(&["Z"])).expect("transform");
        assert_eq!(m.row(0).as_slice(), &[0.0]);
    }

    #[test]
    fn test_one_hot_single_level_rejected() {
        let mut enc = OneHotEncoder::new();
        assert!(enc.fit(&entities(&["A", "A"])).is_err());
    }

    #[test]
    fn test_one_hot_transform_before_fit_errors() {
        let enc = OneHotEncoder::new();
        assert!(enc.transform(&entities(&["A"])).is_err());
    }

    #[test]
    fn test_ordinal_codes_sorted() {
        let data = entities(&["China", "Aruba", "Brazil"]);
        let mut enc = OrdinalEncoder::new();
        enc.fit(&data).expect("fit");
        let codes = enc.transform(&data).expect("transform");
        assert_eq!(codes, vec![2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ordinal_unknown_is_minus_one() {
        let mut enc = OrdinalEncoder::new();
        enc.fit(&entities(&["A", "B"])).expect("fit");
        let codes = enc.transform(&entities(&["B", "Z"])).expect("transform");
        assert_eq!(codes, vec![1.0, -1.0]);
    }
}

//! Pretrained classifier models used by learned filters.
//!
//! Models are opaque blobs produced by an external training step and loaded
//! once at configuration time. Only inference is implemented.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fully connected layer: `weights[output][input]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weight rows, one per output.
    pub weights: Vec<Vec<f64>>,
    /// Bias per output.
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| bias + dot(row, input))
            .collect()
    }
}

/// Binary classifier returning a signal probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    /// Logistic regression.
    Logistic {
        /// Expected feature order.
        feature_names: Vec<String>,
        /// One weight per feature.
        weights: Vec<f64>,
        /// Offset.
        bias: f64,
    },
    /// Multilayer perceptron with tanh hidden layers and a logistic output.
    Mlp {
        /// Expected feature order.
        feature_names: Vec<String>,
        /// Layers from input to output; the last one has a single output.
        layers: Vec<DenseLayer>,
    },
}

impl ClassifierModel {
    /// Parses and validates a model blob.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or inconsistent dimensions.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json).map_err(|e| Error::InvalidModel {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        model.validate(name)?;
        Ok(model)
    }

    /// Feature names in input order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        match self {
            Self::Logistic { feature_names, .. } | Self::Mlp { feature_names, .. } => {
                feature_names
            }
        }
    }

    /// Checks that all dimensions agree and all parameters are finite.
    ///
    /// # Errors
    /// Returns [`Error::InvalidModel`] describing the first inconsistency.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidModel {
            name: name.to_string(),
            reason,
        };
        let n_features = self.feature_names().len();
        if n_features == 0 {
            return Err(invalid("no features".to_string()));
        }
        match self {
            Self::Logistic { weights, bias, .. } => {
                if weights.len() != n_features {
                    return Err(invalid(format!(
                        "{} weights for {n_features} features",
                        weights.len()
                    )));
                }
                if !(bias.is_finite() && weights.iter().all(|w| w.is_finite())) {
                    return Err(invalid("non-finite parameter".to_string()));
                }
            }
            Self::Mlp { layers, .. } => {
                let mut width = n_features;
                for (i, layer) in layers.iter().enumerate() {
                    if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                        return Err(invalid(format!(
                            "layer {i} has {} weight rows and {} biases",
                            layer.weights.len(),
                            layer.bias.len()
                        )));
                    }
                    if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                        return Err(invalid(format!(
                            "layer {i} expects {width} inputs, row has {}",
                            row.len()
                        )));
                    }
                    let finite = layer.bias.iter().all(|b| b.is_finite())
                        && layer.weights.iter().flatten().all(|w| w.is_finite());
                    if !finite {
                        return Err(invalid(format!("layer {i} has a non-finite parameter")));
                    }
                    width = layer.weights.len();
                }
                if layers.is_empty() || width != 1 {
                    return Err(invalid(format!(
                        "network must end in a single output, got {width}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Signal probability for a feature vector.
    ///
    /// Non-finite features give a non-finite result.
    #[must_use]
    pub fn predict(&self, features: &[f64]) -> f64 {
        match self {
            Self::Logistic { weights, bias, .. } => sigmoid(bias + dot(weights, features)),
            Self::Mlp { layers, .. } => {
                let mut activation = features.to_vec();
                let last = layers.len().saturating_sub(1);
                for (i, layer) in layers.iter().enumerate() {
                    activation = layer.forward(&activation);
                    if i < last {
                        activation.iter_mut().for_each(|a| *a = a.tanh());
                    }
                }
                activation.first().map_or(f64::NAN, |&z| sigmoid(z))
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Named collection of classifier models.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    models: BTreeMap<String, Arc<ClassifierModel>>,
}

impl ModelStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds a model, replacing any model of the same name.
    ///
    /// # Errors
    /// Returns [`Error::InvalidModel`] if the model is inconsistent.
    pub fn insert(&mut self, name: &str, model: ClassifierModel) -> Result<()> {
        model.validate(name)?;
        if self.models.insert(name.to_string(), Arc::new(model)).is_some() {
            log::warn!("model '{name}' replaced");
        }
        Ok(())
    }

    /// Parses and adds a model blob.
    ///
    /// # Errors
    /// Returns an error for malformed or inconsistent blobs.
    pub fn insert_json(&mut self, name: &str, json: &str) -> Result<()> {
        let model = ClassifierModel::from_json(name, json)?;
        self.insert(name, model)
    }

    /// Resolves a model by name.
    ///
    /// # Errors
    /// Returns [`Error::UnknownModel`] if no model has that name.
    pub fn get(&self, name: &str) -> Result<Arc<ClassifierModel>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    /// Model names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_logistic_prediction() {
        let model = ClassifierModel::from_json(
            "pair",
            r#"{"kind": "logistic", "feature_names": ["a", "b"], "weights": [1.0, -2.0], "bias": 0.5}"#,
        )
        .unwrap();
        assert_relative_eq!(model.predict(&[1.5, 1.0]), 0.5);
        assert!(model.predict(&[f64::NAN, 0.0]).is_nan());
    }

    #[test]
    fn test_mlp_prediction() {
        let model = ClassifierModel::Mlp {
            feature_names: vec!["a".to_string()],
            layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0], vec![-1.0]],
                    bias: vec![0.0, 0.0],
                },
                DenseLayer {
                    weights: vec![vec![1.0, 1.0]],
                    bias: vec![0.0],
                },
            ],
        };
        model.validate("mlp").unwrap();
        // tanh(x) + tanh(-x) = 0
        assert_relative_eq!(model.predict(&[0.7]), 0.5);
    }

    #[test]
    fn test_inconsistent_models() {
        let err = ClassifierModel::from_json(
            "bad",
            r#"{"kind": "logistic", "feature_names": ["a"], "weights": [1.0, 2.0], "bias": 0.0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidModel { .. }));

        let two_outputs = ClassifierModel::Mlp {
            feature_names: vec!["a".to_string()],
            layers: vec![DenseLayer {
                weights: vec![vec![1.0], vec![1.0]],
                bias: vec![0.0, 0.0],
            }],
        };
        assert!(two_outputs.validate("bad").is_err());
        assert!(ClassifierModel::from_json("bad", "{").is_err());
    }

    #[test]
    fn test_store_lookup() {
        let mut store = ModelStore::new();
        store
            .insert(
                "facet",
                ClassifierModel::Logistic {
                    feature_names: vec!["x".to_string()],
                    weights: vec![1.0],
                    bias: 0.0,
                },
            )
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("facet").is_ok());
        assert!(matches!(store.get("segment"), Err(Error::UnknownModel(_))));
    }
}

use crate::types::{IdepixError, IdepixResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One fully connected layer: `weights[out][in]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetLayer {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

/// Trained network as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetDefinition {
    /// Free-form identifier, e.g. the training run
    #[serde(default)]
    pub name: String,
    pub input_min: Vec<f64>,
    pub input_max: Vec<f64>,
    pub output_min: Vec<f64>,
    pub output_max: Vec<f64>,
    pub layers: Vec<NetLayer>,
}

impl NetDefinition {
    pub fn input_len(&self) -> usize {
        self.input_min.len()
    }

    pub fn output_len(&self) -> usize {
        self.output_min.len()
    }

    /// Check that ranges and layer shapes chain together
    pub fn validate(&self) -> IdepixResult<()> {
        if self.layers.is_empty() {
            return Err(IdepixError::NeuralNet(format!("net '{}' has no layers", self.name)));
        }
        if self.input_max.len() != self.input_len() || self.output_max.len() != self.output_len() {
            return Err(IdepixError::NeuralNet(format!(
                "net '{}' has inconsistent min/max range lengths",
                self.name
            )));
        }
        if let Some(i) = (0..self.input_len()).find(|&i| self.input_max[i] <= self.input_min[i]) {
            return Err(IdepixError::NeuralNet(format!(
                "net '{}' has an empty range for input {}",
                self.name, i
            )));
        }

        let mut fan_in = self.input_len();
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.biases.len() || layer.weights.is_empty() {
                return Err(IdepixError::NeuralNet(format!(
                    "layer {} of net '{}' has {} weight rows and {} biases",
                    idx,
                    self.name,
                    layer.weights.len(),
                    layer.biases.len()
                )));
            }
            if let Some(row) = layer.weights.iter().position(|r| r.len() != fan_in) {
                return Err(IdepixError::NeuralNet(format!(
                    "layer {} row {} of net '{}' expects {} inputs, previous layer gives {}",
                    idx,
                    row,
                    self.name,
                    layer.weights[row].len(),
                    fan_in
                )));
            }
            fan_in = layer.weights.len();
        }

        if fan_in != self.output_len() {
            return Err(IdepixError::NeuralNet(format!(
                "net '{}' produces {} outputs but declares {} output ranges",
                self.name,
                fan_in,
                self.output_len()
            )));
        }
        Ok(())
    }
}

/// Feed-forward network evaluator.
///
/// The trained definition is shared and immutable; the input vector and
/// the layer activations are scratch state owned by this instance. Clone
/// one evaluator per worker instead of sharing it across threads.
#[derive(Debug, Clone)]
pub struct FeedForwardNet {
    definition: Arc<NetDefinition>,
    input: Vec<f64>,
    normalised: Vec<f64>,
    activations: Vec<Vec<f64>>,
}

impl FeedForwardNet {
    pub fn new(definition: NetDefinition) -> IdepixResult<Self> {
        definition.validate()?;
        let input = vec![0.0; definition.input_len()];
        let normalised = input.clone();
        let activations = definition.layers.iter().map(|l| vec![0.0; l.biases.len()]).collect();
        Ok(Self { definition: Arc::new(definition), input, normalised, activations })
    }

    pub fn from_json_str(json: &str) -> IdepixResult<Self> {
        let definition: NetDefinition = serde_json::from_str(json)
            .map_err(|e| IdepixError::NeuralNet(format!("cannot parse net definition: {}", e)))?;
        Self::new(definition)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> IdepixResult<Self> {
        log::info!("Loading neural net from: {}", path.as_ref().display());
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IdepixError::NeuralNet(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let net = Self::from_json_str(&json)?;
        log::debug!(
            "Neural net '{}': {} inputs, {} layers, {} outputs",
            net.definition.name,
            net.input_len(),
            net.definition.layers.len(),
            net.output_len()
        );
        Ok(net)
    }

    pub fn definition(&self) -> &NetDefinition {
        &self.definition
    }

    pub fn input_len(&self) -> usize {
        self.definition.input_len()
    }

    pub fn output_len(&self) -> usize {
        self.definition.output_len()
    }

    /// Mutable input vector, overwritten by the caller before each [`evaluate`](Self::evaluate)
    pub fn input_mut(&mut self) -> &mut [f64] {
        &mut self.input
    }

    /// Run the network on the current input vector
    pub fn evaluate(&mut self) -> &[f64] {
        let def = &*self.definition;

        for (i, (n, v)) in self.normalised.iter_mut().zip(&self.input).enumerate() {
            *n = (v - def.input_min[i]) / (def.input_max[i] - def.input_min[i]);
        }

        for (l, layer) in def.layers.iter().enumerate() {
            let (done, rest) = self.activations.split_at_mut(l);
            let previous: &[f64] = if l == 0 { &self.normalised } else { &done[l - 1] };
            for ((o, row), bias) in rest[0].iter_mut().zip(&layer.weights).zip(&layer.biases) {
                let z: f64 = row.iter().zip(previous).map(|(w, a)| w * a).sum::<f64>() + bias;
                *o = sigmoid(z);
            }
        }

        match self.activations.last_mut() {
            Some(output) => {
                for (i, o) in output.iter_mut().enumerate() {
                    *o = *o * (def.output_max[i] - def.output_min[i]) + def.output_min[i];
                }
                &output[..]
            }
            None => &[],
        }
    }

    /// Copy `input` into the scratch vector and evaluate
    pub fn calc(&mut self, input: &[f64]) -> IdepixResult<&[f64]> {
        if input.len() != self.input.len() {
            return Err(IdepixError::NeuralNet(format!(
                "net expects {} inputs, got {}",
                self.input.len(),
                input.len()
            )));
        }
        self.input.copy_from_slice(input);
        Ok(self.evaluate())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

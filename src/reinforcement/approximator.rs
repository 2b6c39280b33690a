// Value function approximation for the transformation policy
// Maps a state vector to one Q-value per action

use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::reinforcement::{action::ActionId, state::StateVector};

/// Function approximator producing Q-values.
///
/// `predict` must not mutate parameters; only `fit` does.
pub trait ValueApproximator: Send {
    /// Dimension of the state vectors this model accepts
    fn input_dim(&self) -> usize;

    /// Number of Q-values returned by `predict`
    fn action_count(&self) -> usize;

    /// Estimated value of every action from `state`
    fn predict(&self, state: &StateVector) -> EngineResult<Vec<f64>>;

    /// One update nudging `predict(state)[action]` toward `target`.
    /// Returns the squared error measured before the update.
    fn fit(&mut self, state: &StateVector, action: ActionId, target: f64) -> EngineResult<f64>;

    /// Serializable snapshot of the parameters, if supported
    fn parameters(&self) -> EngineResult<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Replace the parameters with a snapshot taken by `parameters`
    fn load_parameters(&mut self, _parameters: serde_json::Value) -> EngineResult<()> {
        Err(EngineError::config(
            "this value approximator does not support checkpoints",
        ))
    }
}

/// Index of the largest value, ties resolved toward the lowest index.
/// NaN never wins unless every value is NaN.
pub fn argmax(values: &[f64]) -> Option<ActionId> {
    if values.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }

    Some(ActionId(best.map(|(index, _)| index).unwrap_or(0)))
}

/// Largest finite-or-infinite value, ignoring NaN; zero when nothing is left
pub fn max_value(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(0.0)
}

/// Adam hyperparameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct AdamParams {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
}

impl AdamParams {
    fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Fully connected layer with its Adam moment estimates
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    /// Shape (outputs, inputs)
    weights: Array2<f64>,
    bias: Array1<f64>,
    m_weights: Array2<f64>,
    v_weights: Array2<f64>,
    m_bias: Array1<f64>,
    v_bias: Array1<f64>,
}

impl DenseLayer {
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = Array2::from_shape_fn((outputs, inputs), |_| rng.random_range(-limit..limit));

        Self {
            weights,
            bias: Array1::zeros(outputs),
            m_weights: Array2::zeros((outputs, inputs)),
            v_weights: Array2::zeros((outputs, inputs)),
            m_bias: Array1::zeros(outputs),
            v_bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        self.weights.dot(input) + &self.bias
    }

    /// Check that every array agrees with a layer fed `inputs` values and
    /// return its output width
    fn check_shapes(&self, inputs: usize) -> EngineResult<usize> {
        let (outputs, actual_inputs) = self.weights.dim();
        if actual_inputs != inputs {
            return Err(EngineError::shape(inputs, actual_inputs));
        }
        for moment in [&self.m_weights, &self.v_weights] {
            if moment.dim() != (outputs, inputs) {
                return Err(EngineError::config(format!(
                    "moment estimate of shape {:?} does not match weights {:?}",
                    moment.dim(),
                    (outputs, inputs)
                )));
            }
        }
        for vector in [&self.bias, &self.m_bias, &self.v_bias] {
            if vector.len() != outputs {
                return Err(EngineError::shape(outputs, vector.len()));
            }
        }
        Ok(outputs)
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    adam: &AdamParams,
    step: i32,
) {
    let bias1 = 1.0 - adam.beta1.powi(step);
    let bias2 = 1.0 - adam.beta2.powi(step);

    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = adam.beta1 * *m + (1.0 - adam.beta1) * g;
            *v = adam.beta2 * *v + (1.0 - adam.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= adam.learning_rate * m_hat / (v_hat.sqrt() + adam.epsilon);
        });
}

/// Multi-layer perceptron: input, two ReLU hidden layers, linear output
/// with one unit per action. Trained with Adam on squared error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpApproximator {
    layers: Vec<DenseLayer>,
    input_dim: usize,
    action_count: usize,
    adam: AdamParams,
    step: i32,
}

impl MlpApproximator {
    /// Create a network with Xavier-uniform weights
    pub fn new(
        input_dim: usize,
        action_count: usize,
        hidden_units: usize,
        learning_rate: f64,
        seed: Option<u64>,
    ) -> EngineResult<Self> {
        if input_dim == 0 || action_count == 0 || hidden_units == 0 {
            return Err(EngineError::config(format!(
                "network dimensions must be positive (input {}, hidden {}, actions {})",
                input_dim, hidden_units, action_count
            )));
        }
        if !(learning_rate > 0.0) {
            return Err(EngineError::config("learning rate must be positive"));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let layers = vec![
            DenseLayer::new(input_dim, hidden_units, &mut rng),
            DenseLayer::new(hidden_units, hidden_units, &mut rng),
            DenseLayer::new(hidden_units, action_count, &mut rng),
        ];

        Ok(Self {
            layers,
            input_dim,
            action_count,
            adam: AdamParams::new(learning_rate),
            step: 0,
        })
    }

    /// Number of parameter updates applied so far
    pub fn updates(&self) -> i32 {
        self.step
    }

    fn check_shape(&self, state: &StateVector) -> EngineResult<Array1<f64>> {
        if state.dimension() != self.input_dim {
            return Err(EngineError::shape(self.input_dim, state.dimension()));
        }
        Ok(state.to_array())
    }

    /// Pre-activations and activations of every layer; activations[0] is the input
    fn forward_trace(&self, input: Array1<f64>) -> (Vec<Array1<f64>>, Vec<Array1<f64>>) {
        let last = self.layers.len() - 1;
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input);

        for (index, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[index]);
            let a = if index == last {
                z.clone()
            } else {
                z.mapv(|x| x.max(0.0))
            };
            pre_activations.push(z);
            activations.push(a);
        }

        (pre_activations, activations)
    }
}

impl ValueApproximator for MlpApproximator {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn action_count(&self) -> usize {
        self.action_count
    }

    fn predict(&self, state: &StateVector) -> EngineResult<Vec<f64>> {
        let input = self.check_shape(state)?;
        let output = self
            .layers
            .iter()
            .enumerate()
            .fold(input, |a, (index, layer)| {
                let z = layer.forward(&a);
                if index + 1 == self.layers.len() {
                    z
                } else {
                    z.mapv(|x| x.max(0.0))
                }
            });
        Ok(output.to_vec())
    }

    fn fit(&mut self, state: &StateVector, action: ActionId, target: f64) -> EngineResult<f64> {
        let input = self.check_shape(state)?;
        if action.index() >= self.action_count {
            return Err(EngineError::shape(self.action_count, action.index() + 1));
        }

        let (pre_activations, activations) = self.forward_trace(input);
        let prediction = activations[self.layers.len()][action.index()];
        let error = prediction - target;

        // Only the chosen action's output carries gradient
        let mut delta = Array1::<f64>::zeros(self.action_count);
        delta[action.index()] = 2.0 * error;

        self.step += 1;
        let step = self.step;
        let adam = self.adam;

        for index in (0..self.layers.len()).rev() {
            let grad_weights = delta
                .view()
                .insert_axis(Axis(1))
                .dot(&activations[index].view().insert_axis(Axis(0)));
            let grad_bias = delta.clone();

            let next_delta = if index > 0 {
                let back = self.layers[index].weights.t().dot(&delta);
                let relu_grad = pre_activations[index - 1].mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
                Some(back * relu_grad)
            } else {
                None
            };

            let layer = &mut self.layers[index];
            adam_update(
                &mut layer.weights,
                &mut layer.m_weights,
                &mut layer.v_weights,
                &grad_weights,
                &adam,
                step,
            );
            adam_update(
                &mut layer.bias,
                &mut layer.m_bias,
                &mut layer.v_bias,
                &grad_bias,
                &adam,
                step,
            );

            match next_delta {
                Some(next) => delta = next,
                None => break,
            }
        }

        Ok(error * error)
    }

    fn parameters(&self) -> EngineResult<Option<serde_json::Value>> {
        Ok(Some(serde_json::to_value(self)?))
    }

    fn load_parameters(&mut self, parameters: serde_json::Value) -> EngineResult<()> {
        let restored: MlpApproximator = serde_json::from_value(parameters)?;
        if restored.input_dim != self.input_dim {
            return Err(EngineError::shape(self.input_dim, restored.input_dim));
        }
        if restored.action_count != self.action_count {
            return Err(EngineError::config(format!(
                "checkpoint has {} actions, engine has {}",
                restored.action_count, self.action_count
            )));
        }
        if restored.layers.is_empty() {
            return Err(EngineError::config("checkpoint network has no layers"));
        }
        let outputs = restored
            .layers
            .iter()
            .try_fold(restored.input_dim, |width, layer| layer.check_shapes(width))?;
        if outputs != restored.action_count {
            return Err(EngineError::shape(restored.action_count, outputs));
        }
        if !(restored.adam.learning_rate > 0.0) || restored.step < 0 {
            return Err(EngineError::config("checkpoint optimizer state is invalid"));
        }
        *self = restored;
        Ok(())
    }
}

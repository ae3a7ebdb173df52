use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder, VarMap};

use crate::brains::learners::{utils::linear, DEVICE};

use super::{Actor, CopyWeights, Critic, Mode};

fn mlp(
    in_len: usize,
    hidden_units: &[usize],
    out_len: usize,
    vs: VarBuilder,
) -> Result<Vec<Linear>> {
    let mut layers = Vec::with_capacity(hidden_units.len() + 1);
    let mut last_out = in_len;
    for (i, next_out) in hidden_units.iter().chain(std::iter::once(&out_len)).enumerate() {
        layers.push(linear(last_out, *next_out, 5.0 / 3.0, vs.pp(format!("l{i}")))?);
        last_out = *next_out;
    }
    Ok(layers)
}

/// Tanh MLP whose tanh head bounds every action component to [-1, 1].
pub struct DeterministicMlpActor {
    pub layers: Vec<Linear>,
    pub varmap: VarMap,
}

impl DeterministicMlpActor {
    pub fn new(state_size: usize, hidden_units: &[usize], action_size: usize) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &DEVICE);
        let layers = mlp(state_size, hidden_units, action_size, vs)?;
        Ok(Self { layers, varmap })
    }
}

impl Actor for DeterministicMlpActor {
    fn forward(&self, states: &Tensor, _mode: Mode) -> Result<Tensor> {
        let mut x = states.clone();
        for layer in self.layers.iter() {
            x = layer.forward(&x)?.tanh()?;
        }
        Ok(x)
    }
}

impl CopyWeights for DeterministicMlpActor {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

/// Tanh MLP over the concatenated joint state and joint action, linear head.
pub struct DeterministicMlpCritic {
    pub layers: Vec<Linear>,
    pub varmap: VarMap,
}

impl DeterministicMlpCritic {
    pub fn new(
        joint_state_size: usize,
        joint_action_size: usize,
        hidden_units: &[usize],
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &DEVICE);
        let layers = mlp(joint_state_size + joint_action_size, hidden_units, 1, vs)?;
        Ok(Self { layers, varmap })
    }
}

impl Critic for DeterministicMlpCritic {
    fn forward(&self, states: &Tensor, actions: &Tensor, _mode: Mode) -> Result<Tensor> {
        let mut x = Tensor::cat(&[states, actions], 1)?;
        let n_layers = self.layers.len();
        for layer in self.layers[..n_layers - 1].iter() {
            x = layer.forward(&x)?.tanh()?;
        }
        self.layers[n_layers - 1].forward(&x)
    }
}

impl CopyWeights for DeterministicMlpCritic {
    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

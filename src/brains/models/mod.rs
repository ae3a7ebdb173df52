use std::{collections::HashMap, sync::MutexGuard};

use candle_core::{Error, Result, Tensor, Var};
use candle_nn::VarMap;

pub mod deterministic_mlp;

/// Forward-pass mode, passed explicitly on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Per-agent policy: own state `(batch, state_size)` to action
/// `(batch, action_size)`.
pub trait Actor: CopyWeights {
    fn forward(&self, states: &Tensor, mode: Mode) -> Result<Tensor>;

    /// Evaluation-mode forward pass, detached from the autograd graph.
    fn infer(&self, states: &Tensor) -> Result<Tensor> {
        Ok(self.forward(states, Mode::Eval)?.detach())
    }
}

/// Centralized value function: joint states `(batch, state_size * n)` and joint
/// actions `(batch, action_size * n)` to `(batch, 1)`.
pub trait Critic: CopyWeights {
    fn forward(&self, states: &Tensor, actions: &Tensor, mode: Mode) -> Result<Tensor>;

    fn infer(&self, states: &Tensor, actions: &Tensor) -> Result<Tensor> {
        Ok(self.forward(states, actions, Mode::Eval)?.detach())
    }
}

pub(crate) fn lock_vars(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| Error::Msg("varmap lock poisoned".to_owned()))
}

/// Parameter access shared by actors and critics. Local and target networks
/// must be built with identical variable names.
pub trait CopyWeights {
    fn varmap(&self) -> &VarMap;

    fn vars(&self) -> Vec<Var> {
        self.varmap().all_vars()
    }

    /// `self = tau * other + (1 - tau) * self`, parameter by parameter.
    fn soft_update(&self, other: &Self, tau: f64) -> Result<()>
    where
        Self: Sized,
    {
        let mine = lock_vars(self.varmap())?;
        let theirs = lock_vars(other.varmap())?;
        for (varname, my_var) in mine.iter() {
            let other_var = theirs
                .get(varname)
                .ok_or_else(|| Error::Msg(format!("missing parameter {varname}")))?;
            let new_var = my_var
                .affine(1.0 - tau, 0.0)?
                .add(&other_var.affine(tau, 0.0)?)?;
            my_var.set(&new_var)?;
        }
        Ok(())
    }

    fn hard_update(&self, other: &Self) -> Result<()>
    where
        Self: Sized,
    {
        let mine = lock_vars(self.varmap())?;
        let theirs = lock_vars(other.varmap())?;
        for (varname, my_var) in mine.iter() {
            let other_var = theirs
                .get(varname)
                .ok_or_else(|| Error::Msg(format!("missing parameter {varname}")))?;
            my_var.set(other_var.as_tensor())?;
        }
        Ok(())
    }

    /// Flattened copy of every parameter, keyed by name.
    fn snapshot(&self) -> Result<HashMap<String, Vec<f32>>> {
        let vars = lock_vars(self.varmap())?;
        vars.iter()
            .map(|(name, var)| Ok((name.clone(), var.flatten_all()?.to_vec1::<f32>()?)))
            .collect()
    }
}

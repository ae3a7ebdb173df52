use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{MaddpgError, Result},
    hparams::*,
};

pub trait Params {
    fn to_yaml(&self) -> Result<String>
    where
        Self: Serialize,
    {
        let s = serde_yaml::to_string(self)?;
        Ok(s)
    }
    fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()>
    where
        Self: Serialize,
    {
        let mut f = File::create(path)?;
        let s = self.to_yaml()?;
        write!(f, "{}", s)?;
        Ok(())
    }
    fn from_yaml<'a>(yaml: &'a str) -> Result<Self>
    where
        Self: Deserialize<'a> + Sized,
    {
        let this = serde_yaml::from_str(yaml)?;
        Ok(this)
    }
    fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: DeserializeOwned + Sized,
    {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        let this = serde_yaml::from_str(s.as_str())?;
        Ok(this)
    }
}

/// Tunables of the MADDPG learner. Missing YAML fields fall back to the
/// defaults in [`crate::hparams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaddpgParams {
    pub replay_buffer_size: usize,
    pub batch_size: usize,
    pub steps_between_training: usize,
    pub gamma: f64,
    pub tau: f64,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub critic_weight_decay: f64,
    pub critic_max_grad_norm: f64,
    pub reward_norm_eps: f64,
    pub ou_mu: f64,
    pub ou_theta: f64,
    pub ou_sigma: f64,
    /// Sigma is annealed linearly from `ou_sigma` to this value.
    pub ou_min_sigma: f64,
    /// Number of noise samples over which sigma is annealed.
    pub ou_decay_period: usize,
    pub actor_hidden: Vec<usize>,
    pub critic_hidden: Vec<usize>,
    pub seed: Option<u64>,
    /// When set, training scalars are written to a timestamped run directory
    /// below this path.
    pub tensorboard_dir: Option<PathBuf>,
}

impl Default for MaddpgParams {
    fn default() -> Self {
        Self {
            replay_buffer_size: REPLAY_BUFFER_SIZE,
            batch_size: BATCH_SIZE,
            steps_between_training: STEPS_BETWEEN_TRAINING,
            gamma: GAMMA,
            tau: TAU,
            actor_lr: ACTOR_LR,
            critic_lr: CRITIC_LR,
            critic_weight_decay: CRITIC_WEIGHT_DECAY,
            critic_max_grad_norm: CRITIC_MAX_GRAD_NORM,
            reward_norm_eps: REWARD_NORM_EPS,
            ou_mu: OU_MU,
            ou_theta: OU_THETA,
            ou_sigma: OU_SIGMA,
            ou_min_sigma: OU_SIGMA,
            ou_decay_period: 1,
            actor_hidden: vec![AGENT_HIDDEN_DIM, AGENT_HIDDEN_DIM],
            critic_hidden: vec![AGENT_HIDDEN_DIM, AGENT_HIDDEN_DIM],
            seed: None,
            tensorboard_dir: None,
        }
    }
}

impl Params for MaddpgParams {}

impl MaddpgParams {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MaddpgError::InvalidParams(msg));
        if self.batch_size == 0 {
            return fail("batch_size must be positive".to_owned());
        }
        if self.steps_between_training == 0 {
            return fail("steps_between_training must be positive".to_owned());
        }
        if self.replay_buffer_size < self.batch_size {
            return fail(format!(
                "replay_buffer_size {} is smaller than batch_size {}",
                self.replay_buffer_size, self.batch_size
            ));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return fail(format!("tau must be in (0, 1], got {}", self.tau));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if self.ou_decay_period == 0 {
            return fail("ou_decay_period must be positive".to_owned());
        }
        if self.actor_hidden.contains(&0) || self.critic_hidden.contains(&0) {
            return fail("hidden layer widths must be positive".to_owned());
        }
        Ok(())
    }
}

//! Multi-agent deep deterministic policy gradient (MADDPG) learner built on
//! candle. Each agent owns a deterministic actor over its own state and a
//! centralized critic over the joint state and joint action of all agents.

pub mod brains;
pub mod error;
pub mod hparams;
pub mod params;
pub mod tb;

pub use brains::{
    learners::{
        maddpg::{
            checkpoint::NetworkRole,
            replay_buffer::{Experience, ReplayBuffer},
            AgentDims, AgentNetworks, MaddpgAgent, MaddpgStatus,
        },
        utils::OuNoise,
        Status, DEVICE,
    },
    models::{
        deterministic_mlp::{DeterministicMlpActor, DeterministicMlpCritic},
        Actor, CopyWeights, Critic, Mode,
    },
};
pub use error::{MaddpgError, Result};
pub use params::{MaddpgParams, Params};
pub use tb::{TbWriter, Timestamp};

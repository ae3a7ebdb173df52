pub const REPLAY_BUFFER_SIZE: usize = 1_000_000;
pub const BATCH_SIZE: usize = 1024;
// Every agent action counts as one step.
pub const STEPS_BETWEEN_TRAINING: usize = 4;

pub const GAMMA: f64 = 0.95;
pub const TAU: f64 = 1e-2;

pub const ACTOR_LR: f64 = 1e-2;
pub const CRITIC_LR: f64 = 1e-2;
pub const CRITIC_WEIGHT_DECAY: f64 = 0.0;
pub const CRITIC_MAX_GRAD_NORM: f64 = 1.0;

pub const REWARD_NORM_EPS: f64 = 1e-5;

pub const OU_MU: f64 = 0.0;
pub const OU_THETA: f64 = 0.15;
pub const OU_SIGMA: f64 = 0.2;

pub const ACTION_LOW: f32 = -1.0;
pub const ACTION_HIGH: f32 = 1.0;

pub const AGENT_HIDDEN_DIM: usize = 128;

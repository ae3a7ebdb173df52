use std::sync::Arc;

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    brains::models::{
        deterministic_mlp::{DeterministicMlpActor, DeterministicMlpCritic},
        Actor, CopyWeights, Critic, Mode,
    },
    error::{ensure_len, MaddpgError, Result},
    hparams::{ACTION_HIGH, ACTION_LOW},
    params::MaddpgParams,
    tb::{TbWriter, Timestamp},
};

use self::replay_buffer::{Experience, ReplayBuffer};

use super::{
    utils::{adam, clip_grad_norm, normalize, OuNoise},
    Status, DEVICE,
};

pub mod checkpoint;
pub mod replay_buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDims {
    pub state_size: usize,
    pub action_size: usize,
    pub num_agents: usize,
}

impl AgentDims {
    pub fn new(state_size: usize, action_size: usize, num_agents: usize) -> Result<Self> {
        if state_size == 0 || action_size == 0 || num_agents == 0 {
            return Err(MaddpgError::InvalidDimensions(format!(
                "state_size={state_size}, action_size={action_size}, num_agents={num_agents} \
                 must all be positive"
            )));
        }
        Ok(Self {
            state_size,
            action_size,
            num_agents,
        })
    }

    pub fn joint_state_size(&self) -> usize {
        self.state_size * self.num_agents
    }

    pub fn joint_action_size(&self) -> usize {
        self.action_size * self.num_agents
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaddpgStatus {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub critic_grad_norm: f32,
    pub train_calls: usize,
}

impl Status for MaddpgStatus {
    fn log(&self, writer: &mut TbWriter, step: usize) {
        writer.add_scalar("Policy/Loss", self.policy_loss, step);
        writer.add_scalar("Value/Loss", self.value_loss, step);
        writer.add_scalar("Value/GradNorm", self.critic_grad_norm, step);
    }
}

/// Everything one agent trains: local and target networks plus optimizers.
pub struct AgentNetworks<A: Actor, C: Critic> {
    pub actor: A,
    pub actor_target: A,
    pub actor_optim: AdamW,
    pub critic: C,
    pub critic_target: C,
    pub critic_optim: AdamW,
}

/// Minibatch tensors, each agent's slice kept separately and also
/// concatenated in agent order.
struct JointBatch {
    states: Vec<Tensor>,
    actions: Vec<Tensor>,
    rewards: Vec<Tensor>,
    dones: Vec<Tensor>,
    next_states: Vec<Tensor>,
    full_states: Tensor,
    full_actions: Tensor,
    full_next_states: Tensor,
}

impl JointBatch {
    fn vectorize(experiences: &[Arc<Experience>], dims: &AgentDims) -> Result<Self> {
        if experiences.is_empty() {
            return Err(MaddpgError::InsufficientData {
                len: 0,
                requested: 1,
            });
        }
        for e in experiences {
            e.validate(dims.state_size, dims.action_size, dims.num_agents)?;
        }
        let batch_size = experiences.len();
        let rows = |f: &dyn Fn(&Experience) -> &[f32], width: usize| {
            let flat = experiences
                .iter()
                .flat_map(|e| f(e).iter().copied())
                .collect_vec();
            Tensor::from_vec(flat, (batch_size, width), &DEVICE)
        };
        let column = |f: &dyn Fn(&Experience) -> f32| {
            let flat = experiences.iter().map(|e| f(e)).collect_vec();
            Tensor::from_vec(flat, (batch_size, 1), &DEVICE)
        };

        let (mut states, mut actions, mut rewards, mut dones, mut next_states) =
            (vec![], vec![], vec![], vec![], vec![]);
        for i in 0..dims.num_agents {
            states.push(rows(&|e| e.states()[i].as_slice(), dims.state_size)?);
            actions.push(rows(&|e| e.actions()[i].as_slice(), dims.action_size)?);
            next_states.push(rows(&|e| e.next_states()[i].as_slice(), dims.state_size)?);
            rewards.push(column(&|e| e.rewards()[i])?);
            dones.push(column(&|e| if e.dones()[i] { 1.0 } else { 0.0 })?);
        }
        Ok(Self {
            full_states: Tensor::cat(&states, 1)?,
            full_actions: Tensor::cat(&actions, 1)?,
            full_next_states: Tensor::cat(&next_states, 1)?,
            states,
            actions,
            rewards,
            dones,
            next_states,
        })
    }

    /// Stored joint action with agent `agent_idx`'s slot replaced.
    fn joint_actions_with(&self, agent_idx: usize, own: &Tensor) -> candle_core::Result<Tensor> {
        let mut parts = self.actions.clone();
        parts[agent_idx] = own.clone();
        Tensor::cat(&parts, 1)
    }
}

/// Trains one actor and one centralized critic per agent from a shared replay
/// buffer and exploration process.
pub struct MaddpgAgent<A: Actor = DeterministicMlpActor, C: Critic = DeterministicMlpCritic> {
    dims: AgentDims,
    params: MaddpgParams,
    agents: Vec<AgentNetworks<A, C>>,
    buffer: ReplayBuffer,
    noise: OuNoise,
    steps: usize,
    rng: ChaCha8Rng,
    status: MaddpgStatus,
    writer: TbWriter,
}

impl MaddpgAgent {
    pub fn new(state_size: usize, action_size: usize, num_agents: usize) -> Result<Self> {
        Self::with_params(
            AgentDims::new(state_size, action_size, num_agents)?,
            MaddpgParams::default(),
        )
    }

    /// Builds the default tanh MLP actors and critics.
    pub fn with_params(dims: AgentDims, params: MaddpgParams) -> Result<Self> {
        let actor_hidden = params.actor_hidden.clone();
        let critic_hidden = params.critic_hidden.clone();
        Self::from_builders(
            dims,
            params,
            |d| DeterministicMlpActor::new(d.state_size, &actor_hidden, d.action_size),
            |d| {
                DeterministicMlpCritic::new(
                    d.joint_state_size(),
                    d.joint_action_size(),
                    &critic_hidden,
                )
            },
        )
    }
}

impl<A: Actor, C: Critic> MaddpgAgent<A, C> {
    /// Builders are called twice per agent and role (local and target); the
    /// two results must share parameter names.
    pub fn from_builders<FA, FC>(
        dims: AgentDims,
        params: MaddpgParams,
        mut build_actor: FA,
        mut build_critic: FC,
    ) -> Result<Self>
    where
        FA: FnMut(&AgentDims) -> candle_core::Result<A>,
        FC: FnMut(&AgentDims) -> candle_core::Result<C>,
    {
        params.validate()?;

        let mut agents = Vec::with_capacity(dims.num_agents);
        for _ in 0..dims.num_agents {
            let actor = build_actor(&dims)?;
            let actor_target = build_actor(&dims)?;
            actor_target.soft_update(&actor, 1.0)?;
            let actor_optim = adam(actor.vars(), params.actor_lr, 0.0)?;

            let critic = build_critic(&dims)?;
            let critic_target = build_critic(&dims)?;
            critic_target.soft_update(&critic, 1.0)?;
            let critic_optim = adam(critic.vars(), params.critic_lr, params.critic_weight_decay)?;

            agents.push(AgentNetworks {
                actor,
                actor_target,
                actor_optim,
                critic,
                critic_target,
                critic_optim,
            });
        }

        let mut rng = match params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let noise = OuNoise::new(
            dims.action_size,
            params.ou_mu,
            params.ou_theta,
            params.ou_sigma,
            params.ou_min_sigma,
            params.ou_decay_period,
            rng.gen(),
        );

        let mut writer = TbWriter::default();
        if let Some(dir) = params.tensorboard_dir.as_ref() {
            writer.init(dir, Some("maddpg"), &Timestamp::default())?;
        }

        log::info!(
            "MADDPG agent: {} agents, state size {}, action size {}, device {:?}",
            dims.num_agents,
            dims.state_size,
            dims.action_size,
            *DEVICE,
        );

        Ok(Self {
            buffer: ReplayBuffer::new(params.replay_buffer_size),
            dims,
            params,
            agents,
            noise,
            steps: 0,
            rng,
            status: MaddpgStatus::default(),
            writer,
        })
    }

    /// One action row per agent, clipped to [-1, 1]. With `noise`, every agent
    /// receives its own fresh exploration sample.
    pub fn act(&mut self, all_states: &[Vec<f32>], noise: bool) -> Result<Vec<Vec<f32>>> {
        ensure_len("act agent count", self.dims.num_agents, all_states.len())?;
        let mut all_actions = Vec::with_capacity(self.dims.num_agents);
        for (i, (state, agent)) in all_states.iter().zip(self.agents.iter()).enumerate() {
            ensure_len(&format!("agent {i} state"), self.dims.state_size, state.len())?;
            let obs = Tensor::from_slice(state.as_slice(), (1, self.dims.state_size), &DEVICE)?;
            let mut actions: Vec<f32> = agent.actor.infer(&obs)?.squeeze(0)?.to_vec1()?;
            ensure_len(&format!("agent {i} action"), self.dims.action_size, actions.len())?;
            if noise {
                for (a, n) in actions.iter_mut().zip(self.noise.sample()) {
                    *a += n;
                }
            }
            for a in actions.iter_mut() {
                *a = a.clamp(ACTION_LOW, ACTION_HIGH);
            }
            all_actions.push(actions);
        }
        Ok(all_actions)
    }

    /// Stores the experience and trains every `steps_between_training` steps
    /// once the buffer holds a full batch. Returns the status when it trained.
    pub fn learn(&mut self, experience: Experience) -> Result<Option<MaddpgStatus>> {
        self.remember(experience)?;
        self.steps += 1;
        if self.steps % self.params.steps_between_training == 0
            && self.buffer.len() >= self.params.batch_size
        {
            let batch = self.buffer.sample(self.params.batch_size, &mut self.rng)?;
            return self.train(&batch).map(Some);
        }
        Ok(None)
    }

    /// Stores an experience without advancing the training cadence.
    pub fn remember(&mut self, experience: Experience) -> Result<()> {
        experience.validate(
            self.dims.state_size,
            self.dims.action_size,
            self.dims.num_agents,
        )?;
        self.buffer.remember(experience);
        Ok(())
    }

    /// Updates every agent's critic, then actor, then both targets. All agents
    /// read the same joint tensors and target actions computed before any
    /// update in this call.
    pub fn train(&mut self, experiences: &[Arc<Experience>]) -> Result<MaddpgStatus> {
        let batch = JointBatch::vectorize(experiences, &self.dims)?;

        let next_actions = self
            .agents
            .iter()
            .zip(batch.next_states.iter())
            .map(|(agent, next_states)| agent.actor_target.infer(next_states))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let next_actions = Tensor::cat(&next_actions, 1)?;

        let mut total_pl = 0.0f32;
        let mut total_vl = 0.0f32;
        let mut total_gn = 0.0f32;
        for (i, agent) in self.agents.iter_mut().enumerate() {
            let rewards = normalize(&batch.rewards[i], self.params.reward_norm_eps)?;
            let non_final = batch.dones[i].affine(-1.0, 1.0)?;

            let q_next = agent
                .critic_target
                .infer(&batch.full_next_states, &next_actions)?;
            let q_target = q_next
                .affine(self.params.gamma, 0.0)?
                .mul(&non_final)?
                .add(&rewards)?
                .detach();
            let q_predicted =
                agent
                    .critic
                    .forward(&batch.full_states, &batch.full_actions, Mode::Train)?;
            let value_loss = candle_nn::loss::mse(&q_predicted, &q_target)?;
            let mut q_grads = value_loss.backward()?;
            let grad_norm = clip_grad_norm(
                &agent.critic.vars(),
                &mut q_grads,
                self.params.critic_max_grad_norm,
            )?;
            agent.critic_optim.step(&q_grads)?;

            let own_actions = agent.actor.forward(&batch.states[i], Mode::Train)?;
            let joint_actions = batch.joint_actions_with(i, &own_actions)?;
            let policy_loss = agent
                .critic
                .forward(&batch.full_states, &joint_actions, Mode::Train)?
                .mean_all()?
                .neg()?;
            agent.actor_optim.backward_step(&policy_loss)?;

            agent.actor_target.soft_update(&agent.actor, self.params.tau)?;
            agent
                .critic_target
                .soft_update(&agent.critic, self.params.tau)?;

            let pl: f32 = policy_loss.to_scalar()?;
            let vl: f32 = value_loss.to_scalar()?;
            log::debug!(
                "agent {i}: policy loss {pl:.5}, value loss {vl:.5}, grad norm {grad_norm:.4}"
            );
            total_pl += pl;
            total_vl += vl;
            total_gn += grad_norm as f32;
        }

        let n = self.dims.num_agents as f32;
        self.status.policy_loss = total_pl / n;
        self.status.value_loss = total_vl / n;
        self.status.critic_grad_norm = total_gn / n;
        self.status.train_calls += 1;
        self.status.log(&mut self.writer, self.status.train_calls);
        Ok(self.status)
    }

    /// Resets the exploration process and restarts the training cadence.
    pub fn end_episode(&mut self) {
        self.noise.reset();
        self.steps = 0;
        self.writer.flush();
    }

    pub fn dims(&self) -> &AgentDims {
        &self.dims
    }

    pub fn params(&self) -> &MaddpgParams {
        &self.params
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn status(&self) -> MaddpgStatus {
        self.status
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn noise(&self) -> &OuNoise {
        &self.noise
    }

    pub fn agents(&self) -> &[AgentNetworks<A, C>] {
        &self.agents
    }
}

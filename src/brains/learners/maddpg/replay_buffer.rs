use std::{collections::VecDeque, sync::Arc};

use rand::Rng;

use crate::error::{ensure_len, MaddpgError, Result};

/// One joint transition, every field indexed by agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    states: Vec<Vec<f32>>,
    actions: Vec<Vec<f32>>,
    rewards: Vec<f32>,
    next_states: Vec<Vec<f32>>,
    dones: Vec<bool>,
}

impl Experience {
    /// Fails unless all five sequences cover the same number of agents.
    pub fn new(
        states: Vec<Vec<f32>>,
        actions: Vec<Vec<f32>>,
        rewards: Vec<f32>,
        next_states: Vec<Vec<f32>>,
        dones: Vec<bool>,
    ) -> Result<Self> {
        let num_agents = states.len();
        ensure_len("experience actions", num_agents, actions.len())?;
        ensure_len("experience rewards", num_agents, rewards.len())?;
        ensure_len("experience next_states", num_agents, next_states.len())?;
        ensure_len("experience dones", num_agents, dones.len())?;
        Ok(Self {
            states,
            actions,
            rewards,
            next_states,
            dones,
        })
    }

    pub fn states(&self) -> &[Vec<f32>] {
        &self.states
    }

    pub fn actions(&self) -> &[Vec<f32>] {
        &self.actions
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn next_states(&self) -> &[Vec<f32>] {
        &self.next_states
    }

    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    pub fn num_agents(&self) -> usize {
        self.states.len()
    }

    /// Checks every per-agent vector against the configured sizes.
    pub fn validate(&self, state_size: usize, action_size: usize, num_agents: usize) -> Result<()> {
        ensure_len("experience agent count", num_agents, self.num_agents())?;
        for i in 0..num_agents {
            ensure_len(&format!("agent {i} state"), state_size, self.states[i].len())?;
            ensure_len(&format!("agent {i} next state"), state_size, self.next_states[i].len())?;
            ensure_len(&format!("agent {i} action"), action_size, self.actions[i].len())?;
        }
        Ok(())
    }
}

/// Bounded FIFO of experiences; the oldest entry is evicted once full.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buf: VecDeque<Arc<Experience>>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            capacity,
        }
    }

    pub fn remember(&mut self, experience: Experience) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(Arc::new(experience));
    }

    /// Draws `batch_size` distinct experiences uniformly at random.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Arc<Experience>>> {
        if self.buf.len() < batch_size {
            return Err(MaddpgError::InsufficientData {
                len: self.buf.len(),
                requested: batch_size,
            });
        }
        Ok(rand::seq::index::sample(rng, self.buf.len(), batch_size)
            .into_iter()
            .map(|i| self.buf[i].clone())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buf.iter().map(|e| e.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn experience(tag: f32) -> Experience {
        Experience::new(
            vec![vec![tag, tag], vec![tag, -tag]],
            vec![vec![0.0], vec![0.0]],
            vec![tag, tag],
            vec![vec![tag + 1.0, tag], vec![tag + 1.0, -tag]],
            vec![false, false],
        )
        .unwrap()
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut buf = ReplayBuffer::new(3);
        for i in 0..5 {
            buf.remember(experience(i as f32));
        }
        assert_eq!(buf.len(), 3);
        let tags = buf.iter().map(|e| e.rewards()[0]).collect_vec();
        assert_eq!(tags, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_distinct() -> Result<()> {
        let mut buf = ReplayBuffer::new(100);
        for i in 0..50 {
            buf.remember(experience(i as f32));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..10 {
            let batch = buf.sample(20, &mut rng)?;
            assert_eq!(batch.len(), 20);
            let unique = batch.iter().map(|e| e.rewards()[0] as i32).unique().count();
            assert_eq!(unique, 20);
        }
        let all = buf.sample(50, &mut rng)?;
        assert_eq!(all.len(), 50);
        Ok(())
    }

    #[test]
    fn test_sample_underfilled_fails() {
        let mut buf = ReplayBuffer::new(10);
        buf.remember(experience(0.0));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            buf.sample(2, &mut rng),
            Err(MaddpgError::InsufficientData {
                len: 1,
                requested: 2
            })
        ));
    }

    #[test]
    fn test_experience_validation() {
        assert!(Experience::new(
            vec![vec![0.0]; 2],
            vec![vec![0.0]; 1],
            vec![0.0; 2],
            vec![vec![0.0]; 2],
            vec![false; 2],
        )
        .is_err());

        let exp = experience(1.0);
        assert!(exp.validate(2, 1, 2).is_ok());
        assert!(matches!(
            exp.validate(3, 1, 2),
            Err(MaddpgError::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            })
        ));
        assert!(exp.validate(2, 2, 2).is_err());
        assert!(exp.validate(2, 1, 3).is_err());
    }
}

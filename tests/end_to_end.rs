use std::collections::HashMap;

use maddpg::{AgentDims, CopyWeights, Experience, MaddpgAgent, MaddpgParams, Result};

fn experience(dims: &AgentDims, step: usize) -> Result<Experience> {
    let v = |i: usize, k: usize| ((step * 5 + i * 2 + k) % 13) as f32 / 6.5 - 1.0;
    Experience::new(
        (0..dims.num_agents)
            .map(|i| (0..dims.state_size).map(|k| v(i, k)).collect())
            .collect(),
        (0..dims.num_agents)
            .map(|i| (0..dims.action_size).map(|k| v(i + 3, k)).collect())
            .collect(),
        (0..dims.num_agents).map(|i| v(i, 7)).collect(),
        (0..dims.num_agents)
            .map(|i| (0..dims.state_size).map(|k| v(i, k + 1)).collect())
            .collect(),
        (0..dims.num_agents).map(|i| (step + i) % 25 == 0).collect(),
    )
}

fn all_weights(agent: &MaddpgAgent) -> Result<Vec<HashMap<String, Vec<f32>>>> {
    let mut out = vec![];
    for nets in agent.agents() {
        out.push(nets.actor.snapshot()?);
        out.push(nets.actor_target.snapshot()?);
        out.push(nets.critic.snapshot()?);
        out.push(nets.critic_target.snapshot()?);
    }
    Ok(out)
}

fn params() -> MaddpgParams {
    MaddpgParams {
        actor_hidden: vec![16, 16],
        critic_hidden: vec![32],
        seed: Some(11),
        ..Default::default()
    }
}

#[test]
fn two_agents_train_on_cadence() -> Result<()> {
    let dims = AgentDims::new(2, 1, 2)?;
    let mut agent = MaddpgAgent::with_params(dims, params())?;
    let batch_size = agent.params().batch_size;
    for step in 0..batch_size {
        agent.remember(experience(&dims, step)?)?;
    }
    assert_eq!(agent.replay_buffer().len(), batch_size);
    assert_eq!(agent.steps(), 0);

    let before = all_weights(&agent)?;
    let mut trained = vec![];
    for step in 0..12 {
        let states = vec![vec![0.1, -0.2], vec![0.4, 0.3]];
        let actions = agent.act(&states, true)?;
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().flatten().all(|a| (-1.0..=1.0).contains(a)));
        if let Some(status) = agent.learn(experience(&dims, batch_size + step)?)? {
            assert!(status.value_loss.is_finite());
            assert!(status.policy_loss.is_finite());
            trained.push(step);
        }
    }
    assert_eq!(trained, vec![3, 7, 11]);
    assert_eq!(agent.status().train_calls, 3);

    let after = all_weights(&agent)?;
    for (b, a) in before.iter().zip(after.iter()) {
        assert_ne!(b, a);
    }

    agent.end_episode();
    assert_eq!(agent.steps(), 0);
    assert!(agent.noise().state().iter().all(|x| *x == 0.0));
    Ok(())
}

#[test]
fn checkpoint_survives_a_new_process_state() -> Result<()> {
    let dims = AgentDims::new(3, 2, 3)?;
    let mut source = MaddpgAgent::with_params(
        dims,
        MaddpgParams {
            batch_size: 32,
            ..params()
        },
    )?;
    for step in 0..40 {
        source.learn(experience(&dims, step)?)?;
    }
    assert!(source.status().train_calls > 0);

    let dir = std::env::temp_dir().join(format!("maddpg-e2e-{}", std::process::id()));
    let filename = dir.join("checkpoint.safetensors");
    source.save(&filename)?;

    let mut restored = MaddpgAgent::with_params(dims, params())?;
    restored.load(&filename)?;
    assert_eq!(all_weights(&restored)?, all_weights(&source)?);

    let states = vec![vec![0.5, 0.0, -0.5]; 3];
    assert_eq!(restored.act(&states, false)?, source.act(&states, false)?);
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

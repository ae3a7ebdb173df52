use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use candle_core::Tensor;
use candle_nn::VarMap;

use crate::{
    brains::{
        learners::DEVICE,
        models::{lock_vars, Actor, CopyWeights, Critic},
    },
    error::{MaddpgError, Result},
};

use super::MaddpgAgent;

type Blob = HashMap<String, Tensor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkRole {
    Actor,
    ActorTarget,
    Critic,
    CriticTarget,
}

impl NetworkRole {
    pub const ALL: [NetworkRole; 4] = [
        NetworkRole::Actor,
        NetworkRole::ActorTarget,
        NetworkRole::Critic,
        NetworkRole::CriticTarget,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            NetworkRole::Actor => "actor",
            NetworkRole::ActorTarget => "actor_target",
            NetworkRole::Critic => "critic",
            NetworkRole::CriticTarget => "critic_target",
        }
    }

    fn local(self) -> Option<NetworkRole> {
        match self {
            NetworkRole::ActorTarget => Some(NetworkRole::Actor),
            NetworkRole::CriticTarget => Some(NetworkRole::Critic),
            _ => None,
        }
    }
}

/// `dir/run.safetensors` becomes `dir/<role>-<index>-run.safetensors`.
pub fn checkpoint_path(
    filename: impl AsRef<Path>,
    role: NetworkRole,
    index: usize,
) -> Result<PathBuf> {
    let filename = filename.as_ref();
    let name = filename.file_name().ok_or_else(|| {
        MaddpgError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("checkpoint path {} has no file name", filename.display()),
        ))
    })?;
    Ok(filename.with_file_name(format!(
        "{}-{}-{}",
        role.prefix(),
        index,
        name.to_string_lossy()
    )))
}

impl<A: Actor, C: Critic> MaddpgAgent<A, C> {
    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.agents.len() {
            Ok(())
        } else {
            Err(MaddpgError::InvalidDimensions(format!(
                "agent index {index} out of range for {} agents",
                self.agents.len()
            )))
        }
    }

    fn varmap(&self, role: NetworkRole, index: usize) -> &VarMap {
        let agent = &self.agents[index];
        match role {
            NetworkRole::Actor => agent.actor.varmap(),
            NetworkRole::ActorTarget => agent.actor_target.varmap(),
            NetworkRole::Critic => agent.critic.varmap(),
            NetworkRole::CriticTarget => agent.critic_target.varmap(),
        }
    }

    /// Reads one blob and checks it against the network's variables without
    /// touching them.
    fn read_blob(&self, role: NetworkRole, index: usize, path: &Path) -> Result<Blob> {
        let mut tensors = candle_core::safetensors::load(path, &DEVICE)?;
        let vars = lock_vars(self.varmap(role, index))?;
        let mut blob = Blob::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            let tensor = tensors.remove(name).ok_or_else(|| {
                candle_core::Error::Msg(format!("{} has no tensor {name}", path.display()))
            })?;
            if tensor.shape() != var.shape() {
                return Err(candle_core::Error::Msg(format!(
                    "{}: {name} has shape {:?}, expected {:?}",
                    path.display(),
                    tensor.shape(),
                    var.shape()
                ))
                .into());
            }
            blob.insert(name.clone(), tensor.to_dtype(var.dtype())?);
        }
        Ok(blob)
    }

    fn apply_blob(&self, role: NetworkRole, index: usize, blob: &Blob) -> Result<()> {
        let vars = lock_vars(self.varmap(role, index))?;
        for (name, var) in vars.iter() {
            if let Some(tensor) = blob.get(name) {
                var.set(tensor)?;
            }
        }
        Ok(())
    }

    /// Writes one safetensors file per agent and network role next to
    /// `filename`.
    pub fn save(&self, filename: impl AsRef<Path>) -> Result<()> {
        let filename = filename.as_ref();
        if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        for index in 0..self.agents.len() {
            for role in NetworkRole::ALL {
                let path = checkpoint_path(filename, role, index)?;
                self.varmap(role, index).save(&path)?;
            }
        }
        log::info!(
            "saved {} agent checkpoints with base name {}",
            self.agents.len(),
            filename.display()
        );
        Ok(())
    }

    /// Restores every network saved by [`MaddpgAgent::save`]. All files are
    /// read and checked before any parameter is overwritten, so a failed load
    /// leaves the agent unchanged. A missing target file is replaced by a copy
    /// of the freshly loaded local network.
    pub fn load(&mut self, filename: impl AsRef<Path>) -> Result<()> {
        let filename = filename.as_ref();
        let mut staged = Vec::with_capacity(self.agents.len() * NetworkRole::ALL.len());
        for index in 0..self.agents.len() {
            for role in NetworkRole::ALL {
                let path = checkpoint_path(filename, role, index)?;
                let blob = if role.local().is_some() && !path.exists() {
                    log::warn!(
                        "{} missing, copying {} weights into the target",
                        path.display(),
                        role.local().map(|r| r.prefix()).unwrap_or_default()
                    );
                    None
                } else {
                    Some(self.read_blob(role, index, &path)?)
                };
                staged.push((role, index, blob));
            }
        }

        // Locals precede their targets in `NetworkRole::ALL`.
        for (role, index, blob) in staged {
            match blob {
                Some(blob) => self.apply_blob(role, index, &blob)?,
                None => {
                    let agent = &self.agents[index];
                    match role {
                        NetworkRole::ActorTarget => agent.actor_target.hard_update(&agent.actor)?,
                        _ => agent.critic_target.hard_update(&agent.critic)?,
                    }
                }
            }
        }
        Ok(())
    }

    /// Restores a single network from its own checkpoint file.
    pub fn load_network(
        &mut self,
        role: NetworkRole,
        index: usize,
        filename: impl AsRef<Path>,
    ) -> Result<()> {
        self.check_index(index)?;
        let path = checkpoint_path(filename, role, index)?;
        let blob = self.read_blob(role, index, &path)?;
        self.apply_blob(role, index, &blob)
    }
}

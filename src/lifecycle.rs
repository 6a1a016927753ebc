//! Lifecycle state machine for the offline cache
//!
//! The cache moves through `Uninstalled → Installing → Installed → Activating →
//! Active`. A new generation can start installing while an older one is still
//! active; the older one keeps serving until the newer one begins activation.
//! This module holds no I/O: the cache manager drives the transitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one cache generation, e.g. `gerador-carimbo-cache-v2`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(String);

impl GenerationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GenerationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where the cache layer currently stands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    /// No generation has ever completed installation
    #[default]
    Uninstalled,
    /// A generation is being populated
    Installing(GenerationId),
    /// A generation is fully populated and waiting for activation
    Installed(GenerationId),
    /// A generation is becoming current; stale stores are being purged
    Activating(GenerationId),
    /// A generation is current and serving
    Active(GenerationId),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Uninstalled => write!(f, "uninstalled"),
            State::Installing(g) => write!(f, "installing '{}'", g),
            State::Installed(g) => write!(f, "installed '{}'", g),
            State::Activating(g) => write!(f, "activating '{}'", g),
            State::Active(g) => write!(f, "active '{}'", g),
        }
    }
}

/// A transition that is not allowed from the current state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} generation '{generation}' while {state}")]
pub struct TransitionError {
    pub action: &'static str,
    pub generation: GenerationId,
    pub state: State,
}

/// The cache layer's state plus the generation requests are served from
///
/// `serving` differs from the generation named in `state` while a new
/// generation installs in the background.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: State,
    serving: Option<GenerationId>,
}

impl Lifecycle {
    /// A fresh layer with nothing installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes a layer whose generation was activated by an earlier process
    pub fn restore(active: GenerationId) -> Self {
        Self {
            state: State::Active(active.clone()),
            serving: Some(active),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// The generation lookups must read from, if any
    pub fn serving(&self) -> Option<&GenerationId> {
        self.serving.as_ref()
    }

    pub fn begin_install(&mut self, generation: GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Installing(_) | State::Activating(_) => {
                Err(self.illegal("install", generation))
            }
            _ => {
                self.state = State::Installing(generation);
                Ok(())
            }
        }
    }

    pub fn install_succeeded(&mut self, generation: &GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Installing(g) if g == generation => {
                self.state = State::Installed(generation.clone());
                Ok(())
            }
            _ => Err(self.illegal("finish installing", generation.clone())),
        }
    }

    /// Abandons an install; the layer falls back to whatever was serving
    pub fn install_failed(&mut self, generation: &GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Installing(g) if g == generation => {
                self.settle();
                Ok(())
            }
            _ => Err(self.illegal("abandon", generation.clone())),
        }
    }

    /// Records a generation installed by an earlier process as ready to activate
    pub fn adopt_installed(&mut self, generation: GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Installing(_) | State::Activating(_) => Err(self.illegal("adopt", generation)),
            _ => {
                self.state = State::Installed(generation);
                Ok(())
            }
        }
    }

    /// Starts activation and switches serving to `generation` immediately
    ///
    /// Re-activating the generation that is already active is allowed so the
    /// stale-store purge can be repeated.
    pub fn begin_activation(&mut self, generation: GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Installed(g) | State::Active(g) if *g == generation => {
                self.serving = Some(generation.clone());
                self.state = State::Activating(generation);
                Ok(())
            }
            _ => Err(self.illegal("activate", generation)),
        }
    }

    pub fn activation_finished(&mut self, generation: &GenerationId) -> Result<(), TransitionError> {
        match &self.state {
            State::Activating(g) if g == generation => {
                self.state = State::Active(generation.clone());
                Ok(())
            }
            _ => Err(self.illegal("finish activating", generation.clone())),
        }
    }

    fn settle(&mut self) {
        self.state = match &self.serving {
            Some(g) => State::Active(g.clone()),
            None => State::Uninstalled,
        };
    }

    fn illegal(&self, action: &'static str, generation: GenerationId) -> TransitionError {
        TransitionError {
            action,
            generation,
            state: self.state.clone(),
        }
    }
}

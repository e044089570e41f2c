//! Generation lifecycle: install, then activate.
//!
//! ```text
//! Uninstalled ──install──▶ Installing ──ok──▶ Installed ──activate──▶ Activating ──ok──▶ Active
//!      ▲                       │                  ▲                        │
//!      └─────── precache err ──┘                  └──── deletion err ──────┘
//! ```
//!
//! The manager is forward-only for one version name. Transitions are
//! serialized by a mutex; request handling only ever reads the controller.

use std::fmt;

use serde::{Deserialize, Serialize};
use shelter_core::cache::hash::request_key;
use shelter_core::{CacheDb, Error, GenerationHandle, ProxyRequest};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::precache;
use crate::origin::Origin;

/// Where the target generation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerationState::Uninstalled => "uninstalled",
            GenerationState::Installing => "installing",
            GenerationState::Installed => "installed",
            GenerationState::Activating => "activating",
            GenerationState::Active => "active",
        })
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: GenerationState,
    /// Generation requests are served from, if any.
    controller: Option<GenerationHandle>,
    /// The target generation once it is fully precached.
    installed: Option<GenerationHandle>,
}

/// Owns the target generation name and drives it to `Active`.
#[derive(Debug)]
pub struct GenerationManager {
    target: String,
    manifest: Vec<Url>,
    current: RwLock<Lifecycle>,
    transition: Mutex<()>,
}

impl GenerationManager {
    pub fn new(target: impl Into<String>, manifest: Vec<Url>) -> Self {
        Self {
            target: target.into(),
            manifest,
            current: RwLock::new(Lifecycle {
                state: GenerationState::Uninstalled,
                controller: None,
                installed: None,
            }),
            transition: Mutex::new(()),
        }
    }

    /// Name of the generation this manager installs.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub async fn state(&self) -> GenerationState {
        self.current.read().await.state
    }

    /// Generation currently answering requests.
    pub async fn controller(&self) -> Option<GenerationHandle> {
        self.current.read().await.controller.clone()
    }

    async fn set_state(&self, state: GenerationState) {
        let mut current = self.current.write().await;
        tracing::debug!(generation = %self.target, from = %current.state, to = %state, "lifecycle transition");
        current.state = state;
    }

    /// Whether every manifest resource is stored in `generation`.
    async fn is_complete(&self, store: &CacheDb, generation: &GenerationHandle) -> Result<bool, Error> {
        for url in &self.manifest {
            if !store.has_entry(generation, &request_key(&ProxyRequest::get(url.clone()))).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Install the target generation.
    ///
    /// When exactly one other generation exists it becomes the controller
    /// until activation, so a failed install leaves the previous deployment
    /// serving. A target generation that already holds every manifest entry is
    /// adopted without refetching.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the manager is `Uninstalled`
    /// - [`Error::PrecacheFailure`] if population failed; the partial
    ///   generation is deleted and the manager returns to `Uninstalled`
    pub async fn install(&self, store: &CacheDb, origin: &dyn Origin) -> Result<(), Error> {
        let _transition = self.transition.lock().await;

        let state = self.state().await;
        if state != GenerationState::Uninstalled {
            return Err(Error::InvalidState { operation: "install", state: state.to_string() });
        }

        let others: Vec<String> = store
            .list_generations()
            .await?
            .into_iter()
            .filter(|name| name != &self.target)
            .collect();

        if let [prior] = others.as_slice() {
            let prior = store.open_generation(prior).await?;
            tracing::info!(generation = %prior, "previous generation keeps serving until activation");
            self.current.write().await.controller = Some(prior);
        }

        if store.has_generation(&self.target).await? {
            let existing = store.open_generation(&self.target).await?;
            if self.is_complete(store, &existing).await? {
                tracing::info!(generation = %self.target, "generation already installed");
                let mut current = self.current.write().await;
                current.installed = Some(existing);
                current.state = GenerationState::Installed;
                return Ok(());
            }
            tracing::warn!(generation = %self.target, "generation incomplete; reinstalling");
        }

        self.set_state(GenerationState::Installing).await;

        match self.populate(store, origin).await {
            Ok(generation) => {
                let mut current = self.current.write().await;
                current.installed = Some(generation);
                current.state = GenerationState::Installed;
                tracing::info!(generation = %self.target, "generation installed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(generation = %self.target, error = %e, "install failed");
                if let Err(cleanup) = store.delete_generation(&self.target).await {
                    tracing::warn!(generation = %self.target, error = %cleanup, "failed to remove partial generation");
                }
                self.set_state(GenerationState::Uninstalled).await;
                Err(e)
            }
        }
    }

    async fn populate(&self, store: &CacheDb, origin: &dyn Origin) -> Result<GenerationHandle, Error> {
        let generation = store.open_generation(&self.target).await?;
        precache::populate(store, origin, &generation, &self.manifest).await?;
        Ok(generation)
    }

    /// Activate the installed generation.
    ///
    /// Deletes every other generation, then reports `Active`. The target is
    /// complete and never deleted here, so it controls requests from the
    /// moment activation starts; superseded generations stop serving before
    /// the first of them is deleted. Activating an already active manager is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the manager is `Installed` or `Active`
    /// - any store error from deletion; the manager returns to `Installed`
    ///   so activation can be retried, and the target keeps serving unless
    ///   it is the generation that went missing
    pub async fn activate(&self, store: &CacheDb) -> Result<(), Error> {
        let _transition = self.transition.lock().await;

        let installed = {
            let mut current = self.current.write().await;
            match (current.state, current.installed.clone()) {
                (GenerationState::Active, _) => return Ok(()),
                (GenerationState::Installed, Some(installed)) => {
                    current.state = GenerationState::Activating;
                    current.controller = Some(installed.clone());
                    installed
                }
                (state, _) => return Err(Error::InvalidState { operation: "activate", state: state.to_string() }),
            }
        };

        match self.remove_superseded(store).await {
            Ok(removed) => {
                let mut current = self.current.write().await;
                current.state = GenerationState::Active;
                tracing::info!(generation = %self.target, superseded = removed, "generation active");
                Ok(())
            }
            Err(e) => {
                tracing::error!(generation = %self.target, error = %e, "activation failed");
                let mut current = self.current.write().await;
                current.controller = controller_after_failed_activation(installed, &e);
                current.state = GenerationState::Installed;
                Err(e)
            }
        }
    }

    async fn remove_superseded(&self, store: &CacheDb) -> Result<usize, Error> {
        let mut removed = 0;
        for name in store.list_generations().await? {
            if name != self.target {
                tracing::info!(generation = %name, "removing superseded generation");
                store.delete_generation(&name).await?;
                removed += 1;
            }
        }

        if !store.has_generation(&self.target).await? {
            return Err(Error::GenerationClosed(self.target.clone()));
        }

        Ok(removed)
    }
}

/// The installed target stays authoritative after a failed activation unless
/// the failure is that the target itself is gone.
fn controller_after_failed_activation(installed: GenerationHandle, err: &Error) -> Option<GenerationHandle> {
    match err {
        Error::GenerationClosed(name) if name == installed.name() => None,
        _ => Some(installed),
    }
}

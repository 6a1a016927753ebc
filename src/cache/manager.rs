//! Asset cache manager
//!
//! Owns the generation stores and the lifecycle state machine, and exposes the
//! three cache operations: `install` populates a generation from its manifest,
//! `activate` makes it current and purges every other generation, `lookup`
//! reads from whichever generation is serving.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::store::{CacheStorage, GenerationState, StorageError, StoredResponse};
use crate::lifecycle::{GenerationId, Lifecycle, State, TransitionError};
use crate::network::{Fetcher, NetworkError, Request, Response};

/// Errors that abort an install; the generation is never activated
#[derive(Debug, Error)]
pub enum InstallError {
    /// The generation id is blank
    #[error("Generation id is empty")]
    EmptyGenerationId,

    /// Nothing to install
    #[error("Manifest is empty")]
    EmptyManifest,

    /// A locator appears twice in the manifest
    #[error("Manifest lists '{0}' more than once")]
    DuplicateLocator(String),

    /// The network refused or failed the request
    #[error("Failed to fetch '{locator}': {source}")]
    Fetch {
        locator: String,
        #[source]
        source: NetworkError,
    },

    /// The network answered with a non-2xx status
    #[error("Fetching '{locator}' returned HTTP {status}")]
    BadStatus { locator: String, status: u16 },

    /// The fetch did not complete in time
    #[error("Fetching '{locator}' timed out after {timeout:?}")]
    Timeout { locator: String, timeout: Duration },

    /// Writing the generation store failed
    #[error("Failed to store generation '{generation}': {source}")]
    Storage {
        generation: GenerationId,
        #[source]
        source: StorageError,
    },

    /// A complete generation is immutable; new content needs a new id
    #[error(
        "Generation '{generation}' is already installed with different content at '{locator}'; \
         use a new generation id to ship changed assets"
    )]
    AlreadyInstalled {
        generation: GenerationId,
        locator: String,
    },

    /// Another install or an activation is in flight
    #[error("Cache is busy: {0}")]
    Busy(#[from] TransitionError),
}

/// A stale generation that could not be deleted
#[derive(Debug, Error)]
#[error("Failed to delete stale generation '{generation}': {source}")]
pub struct CleanupError {
    pub generation: GenerationId,
    #[source]
    pub source: StorageError,
}

/// What an activation did
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Whether the requested generation is now serving
    pub activated: bool,
    /// Stale generations that were deleted
    pub deleted: Vec<GenerationId>,
    /// Stale generations left behind as orphaned storage
    pub failed: Vec<CleanupError>,
}

/// One generation store as seen by `stores()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub id: GenerationId,
    /// `None` when the store has no readable record
    pub state: Option<GenerationState>,
    pub entries: usize,
    pub current: bool,
}

/// Manages versioned asset generations on top of `CacheStorage`
#[derive(Debug)]
pub struct AssetCacheManager {
    storage: CacheStorage,
    lifecycle: Mutex<Lifecycle>,
    fetch_timeout: Option<Duration>,
}

impl AssetCacheManager {
    /// Opens the manager, resuming the generation a previous process activated
    ///
    /// A corrupt `active.json` is ignored; the next activation rewrites it.
    pub fn open(storage: CacheStorage) -> Result<Self, StorageError> {
        let active = match storage.read_active() {
            Ok(active) => active,
            Err(err @ StorageError::Corrupt { .. }) => {
                warn!(error = %err, "active generation pointer is unreadable, ignoring");
                None
            }
            Err(err) => return Err(err),
        };
        let lifecycle = match active {
            Some(active) if storage.is_complete(&active) => {
                debug!(generation = %active, "resuming active generation");
                Lifecycle::restore(active)
            }
            Some(active) => {
                warn!(generation = %active, "active generation has no complete store, ignoring");
                Lifecycle::new()
            }
            None => Lifecycle::new(),
        };

        Ok(Self {
            storage,
            lifecycle: Mutex::new(lifecycle),
            fetch_timeout: None,
        })
    }

    /// Bounds every install fetch by `timeout`
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn state(&self) -> State {
        self.lifecycle().state().clone()
    }

    /// The generation lookups currently read from
    pub fn current(&self) -> Option<GenerationId> {
        self.lifecycle().serving().cloned()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches every manifest entry and stores it under `generation`
    ///
    /// All-or-nothing: any failed fetch, non-2xx status or storage error fails
    /// the whole install and the generation stays out of service. Partial
    /// entries are left for the next activation to purge.
    ///
    /// A generation that already completed is never written again. Installing
    /// it a second time succeeds only if the network still returns exactly
    /// what is stored.
    pub async fn install(
        &self,
        generation: &GenerationId,
        manifest: &[String],
        fetcher: &dyn Fetcher,
    ) -> Result<(), InstallError> {
        if generation.as_str().trim().is_empty() {
            return Err(InstallError::EmptyGenerationId);
        }
        validate_manifest(manifest)?;

        self.lifecycle().begin_install(generation.clone())?;
        info!(generation = %generation, assets = manifest.len(), "installing");

        let result = self.populate(generation, manifest, fetcher).await;

        let mut lifecycle = self.lifecycle();
        match &result {
            Ok(()) => {
                lifecycle.install_succeeded(generation)?;
                info!(generation = %generation, "install complete");
            }
            Err(err) => {
                lifecycle.install_failed(generation)?;
                warn!(generation = %generation, error = %err, "install failed");
            }
        }
        result
    }

    async fn populate(
        &self,
        generation: &GenerationId,
        manifest: &[String],
        fetcher: &dyn Fetcher,
    ) -> Result<(), InstallError> {
        let storage_error = |source: StorageError| InstallError::Storage {
            generation: generation.clone(),
            source,
        };

        let existing = self.storage.record(generation).map_err(storage_error)?;
        if let Some(record) = existing.filter(|r| r.state == GenerationState::Complete) {
            let responses = self.fetch_all(manifest, fetcher).await?;
            return self.verify_unchanged(generation, &record.manifest, manifest, &responses);
        }

        self.storage
            .create_generation(generation, manifest)
            .map_err(storage_error)?;

        let responses = self.fetch_all(manifest, fetcher).await?;

        for (locator, response) in manifest.iter().zip(&responses) {
            self.storage
                .put(generation, locator, response)
                .map_err(storage_error)?;
        }

        self.storage.mark_complete(generation).map_err(storage_error)
    }

    async fn fetch_all(
        &self,
        manifest: &[String],
        fetcher: &dyn Fetcher,
    ) -> Result<Vec<Response>, InstallError> {
        try_join_all(
            manifest
                .iter()
                .map(|locator| self.fetch_asset(locator, fetcher)),
        )
        .await
    }

    /// Compares a fresh fetch against a complete store without writing to it
    fn verify_unchanged(
        &self,
        generation: &GenerationId,
        stored_manifest: &[String],
        manifest: &[String],
        responses: &[Response],
    ) -> Result<(), InstallError> {
        let changed = |locator: &String| InstallError::AlreadyInstalled {
            generation: generation.clone(),
            locator: locator.clone(),
        };

        let added = manifest.iter().find(|l| !stored_manifest.contains(*l));
        let removed = stored_manifest.iter().find(|l| !manifest.contains(*l));
        if let Some(locator) = added.or(removed) {
            return Err(changed(locator));
        }

        for (locator, response) in manifest.iter().zip(responses) {
            let stored = self
                .storage
                .get(generation, locator)
                .map_err(|source| InstallError::Storage {
                    generation: generation.clone(),
                    source,
                })?;
            let unchanged = stored.is_some_and(|s| {
                s.status == response.status
                    && s.headers == response.headers
                    && s.body == response.body
            });
            if !unchanged {
                return Err(changed(locator));
            }
        }

        debug!(generation = %generation, "complete store matches the network, nothing to write");
        Ok(())
    }

    async fn fetch_asset(&self, locator: &str, fetcher: &dyn Fetcher) -> Result<Response, InstallError> {
        let request = Request::get(locator);
        let fetched = match self.fetch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fetcher.fetch(&request))
                .await
                .map_err(|_| InstallError::Timeout {
                    locator: locator.to_string(),
                    timeout,
                })?,
            None => fetcher.fetch(&request).await,
        };

        let response = fetched.map_err(|source| InstallError::Fetch {
            locator: locator.to_string(),
            source,
        })?;

        if !response.is_success() {
            return Err(InstallError::BadStatus {
                locator: locator.to_string(),
                status: response.status,
            });
        }
        debug!(locator, bytes = response.body.len(), "fetched asset");
        Ok(response)
    }

    /// Makes `generation` current and deletes every other generation store
    ///
    /// Never fails. A generation without a complete store is not activated and
    /// nothing is deleted. Stores that cannot be deleted are reported and left
    /// behind.
    pub fn activate(&self, generation: &GenerationId) -> ActivationReport {
        let mut report = ActivationReport::default();

        if !self.storage.is_complete(generation) {
            warn!(generation = %generation, "no complete store for generation, activation skipped");
            return report;
        }

        let began = {
            let mut lifecycle = self.lifecycle();
            lifecycle.begin_activation(generation.clone()).or_else(|_| {
                lifecycle.adopt_installed(generation.clone())?;
                lifecycle.begin_activation(generation.clone())
            })
        };
        if let Err(err) = began {
            warn!(error = %err, "activation skipped");
            return report;
        }
        report.activated = true;

        if let Err(err) = self.storage.write_active(generation) {
            warn!(generation = %generation, error = %err, "could not persist active generation");
        }

        let stored = match self.storage.generations() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "could not enumerate generation stores");
                Vec::new()
            }
        };

        for stale in stored.into_iter().filter(|g| g != generation) {
            match self.storage.delete_generation(&stale) {
                Ok(()) => {
                    info!(generation = %stale, "deleted stale generation");
                    report.deleted.push(stale);
                }
                Err(source) => {
                    let err = CleanupError {
                        generation: stale,
                        source,
                    };
                    warn!(error = %err, "cleanup failed");
                    report.failed.push(err);
                }
            }
        }

        if let Err(err) = self.lifecycle().activation_finished(generation) {
            warn!(error = %err, "activation finished out of order");
        }
        info!(generation = %generation, deleted = report.deleted.len(), "activated");
        report
    }

    /// Exact-match lookup in the serving generation
    pub fn lookup(&self, locator: &str) -> Option<StoredResponse> {
        let generation = self.current()?;
        match self.storage.get(&generation, locator) {
            Ok(hit) => hit,
            Err(err) => {
                warn!(generation = %generation, locator, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Every generation store on disk
    pub fn stores(&self) -> Result<Vec<GenerationSummary>, StorageError> {
        let current = self.current();
        let summaries = self
            .storage
            .generations()?
            .into_iter()
            .map(|id| GenerationSummary {
                state: self.storage.record(&id).ok().flatten().map(|r| r.state),
                entries: self.storage.entry_count(&id),
                current: current.as_ref() == Some(&id),
                id,
            })
            .collect();
        Ok(summaries)
    }
}

fn validate_manifest(manifest: &[String]) -> Result<(), InstallError> {
    if manifest.is_empty() {
        return Err(InstallError::EmptyManifest);
    }
    let mut seen = HashSet::new();
    for locator in manifest {
        if !seen.insert(locator.as_str()) {
            return Err(InstallError::DuplicateLocator(locator.clone()));
        }
    }
    Ok(())
}

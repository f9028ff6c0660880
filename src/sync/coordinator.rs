use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::Instrument;

use super::{ProviderError, SnapshotMetadata, SyncError, SyncProvider, UploadResult};
use crate::prompts::PromptRecord;
use crate::prompts::store::PromptStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

#[derive(Debug, Clone)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub active_provider: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub provider: String,
    pub upload: UploadResult,
    pub downloaded: usize,
    /// Whether the downloaded snapshot replaced the local collection.
    pub replaced_local: bool,
    pub remote: SnapshotMetadata,
    pub finished_at: DateTime<Utc>,
}

/// Somewhere to keep remote object ids learned during upload (the gist id)
/// so later runs reuse the same remote object.
#[async_trait]
pub trait RemoteIdStore: Send + Sync {
    async fn remember_remote_id(&self, provider: &str, remote_id: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Registry {
    providers: BTreeMap<String, Arc<dyn SyncProvider>>,
    active: Option<String>,
}

struct CycleState {
    status: SyncStatus,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Runs upload-then-download cycles against the active provider.
///
/// Reconciliation is last-writer-wins at collection granularity: a
/// non-empty download replaces the whole local collection.
///
/// Provider calls have no deadline unless `with_call_timeout` is used. A
/// call that never resolves keeps the coordinator in `Syncing`.
pub struct SyncCoordinator {
    store: Arc<PromptStore>,
    registry: RwLock<Registry>,
    state: Mutex<CycleState>,
    remote_ids: Option<Arc<dyn RemoteIdStore>>,
    call_timeout: Option<Duration>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<PromptStore>) -> Self {
        Self {
            store,
            registry: RwLock::new(Registry::default()),
            state: Mutex::new(CycleState {
                status: SyncStatus::Idle,
                last_sync: None,
                last_error: None,
            }),
            remote_ids: None,
            call_timeout: None,
        }
    }

    pub fn with_remote_id_store(mut self, remote_ids: Arc<dyn RemoteIdStore>) -> Self {
        self.remote_ids = Some(remote_ids);
        self
    }

    /// Bound every provider call. An elapsed timer fails the cycle like any
    /// other provider error.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn register_provider(&self, name: &str, provider: Arc<dyn SyncProvider>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.providers.insert(name.to_string(), provider).is_some() {
            tracing::debug!(provider = name, "Replaced registered sync provider");
        }
    }

    /// Returns false, leaving the current selection alone, when `name` is
    /// not registered.
    pub fn set_active_provider(&self, name: &str) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if !registry.providers.contains_key(name) {
            tracing::warn!(provider = name, "Unknown sync provider");
            return false;
        }
        registry.active = Some(name.to_string());
        true
    }

    pub fn available_providers(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.providers.keys().cloned().collect()
    }

    pub fn active_provider_name(&self) -> Option<String> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.active.clone()
    }

    pub fn active_provider(&self) -> Option<Arc<dyn SyncProvider>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let name = registry.active.as_ref()?;
        registry.providers.get(name).cloned()
    }

    pub fn state(&self) -> SyncState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        SyncState {
            status: state.status,
            last_sync: state.last_sync,
            last_error: state.last_error.clone(),
            active_provider: self.active_provider_name(),
        }
    }

    /// Sync the store's current contents. The snapshot is taken after the
    /// gate, so a call made while another cycle is still applying its
    /// download is rejected rather than queued.
    pub async fn sync_store(&self) -> Result<SyncReport, SyncError> {
        let (name, provider, cycle) = self.start()?;
        let local = self.store.list().await;
        self.run(name, provider, cycle, local).await
    }

    pub async fn perform_sync(&self, local: Vec<PromptRecord>) -> Result<SyncReport, SyncError> {
        let (name, provider, cycle) = self.start()?;
        self.run(name, provider, cycle, local).await
    }

    /// Resolve the active provider and claim the gate. Runs before the
    /// first await of every cycle.
    fn start(&self) -> Result<(String, Arc<dyn SyncProvider>, CycleGuard<'_>), SyncError> {
        let (name, provider) = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            let name = registry.active.clone().ok_or(SyncError::NoActiveProvider)?;
            let provider = registry
                .providers
                .get(&name)
                .cloned()
                .ok_or(SyncError::NoActiveProvider)?;
            (name, provider)
        };
        let cycle = self.begin()?;
        Ok((name, provider, cycle))
    }

    async fn run(
        &self,
        name: String,
        provider: Arc<dyn SyncProvider>,
        cycle: CycleGuard<'_>,
        local: Vec<PromptRecord>,
    ) -> Result<SyncReport, SyncError> {
        let span = tracing::info_span!("sync", provider = %name);
        let result = self
            .run_cycle(&name, provider.as_ref(), local)
            .instrument(span)
            .await;

        match &result {
            Ok(report) => cycle.finish(Ok(report.finished_at)),
            Err(err) => cycle.finish(Err(err.to_string())),
        }
        result
    }

    fn begin(&self) -> Result<CycleGuard<'_>, SyncError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status == SyncStatus::Syncing {
            return Err(SyncError::AlreadySyncing);
        }
        state.status = SyncStatus::Syncing;
        Ok(CycleGuard {
            state: &self.state,
            finished: false,
        })
    }

    async fn run_cycle(
        &self,
        name: &str,
        provider: &dyn SyncProvider,
        local: Vec<PromptRecord>,
    ) -> Result<SyncReport, SyncError> {
        tracing::info!(count = local.len(), "Uploading local prompts");
        let upload = self
            .call(provider.upload(&local))
            .await
            .map_err(SyncError::Upload)?;

        if let (Some(remote_id), Some(remote_ids)) = (&upload.remote_id, &self.remote_ids) {
            if let Err(e) = remote_ids.remember_remote_id(name, remote_id).await {
                tracing::warn!(error = %e, remote_id = %remote_id, "Failed to persist remote id");
            }
        }

        let download = self
            .call(provider.download())
            .await
            .map_err(SyncError::Download)?;
        let downloaded = download.records.len();

        let replaced_local = if downloaded > 0 {
            self.store
                .replace_all(download.records)
                .await
                .map_err(SyncError::Apply)?;
            true
        } else {
            tracing::info!("Remote snapshot empty, keeping local prompts");
            false
        };

        tracing::info!(downloaded, replaced_local, "Sync finished");
        Ok(SyncReport {
            provider: name.to_string(),
            upload,
            downloaded,
            replaced_local,
            remote: download.metadata,
            finished_at: Utc::now(),
        })
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ProviderError::Timeout(limit))?,
            None => fut.await,
        }
    }
}

/// Moves the coordinator out of `Syncing`. A cycle whose future is dropped
/// before finishing is recorded as an error so the next sync is not blocked.
struct CycleGuard<'a> {
    state: &'a Mutex<CycleState>,
    finished: bool,
}

impl CycleGuard<'_> {
    fn finish(mut self, outcome: Result<DateTime<Utc>, String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(at) => {
                state.status = SyncStatus::Idle;
                state.last_sync = Some(at);
                state.last_error = None;
            }
            Err(message) => {
                tracing::warn!(error = %message, "Sync failed");
                state.status = SyncStatus::Error;
                state.last_error = Some(message);
            }
        }
        self.finished = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.status = SyncStatus::Error;
        state.last_error = Some("sync cycle was cancelled".to_string());
    }
}

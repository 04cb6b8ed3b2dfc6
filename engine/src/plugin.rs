//! Persisted-state setup: restore saved state into a container and keep
//! storage in sync with every qualifying mutation afterwards

use futures::FutureExt;
use rehydrate_core::{
    KvStorage, Mutation, MutationHandler, PersistConfig, RehydrateError, RehydrateResult,
    StateContainer, StateTree, StorageBackend, SubscriptionId,
};
use rehydrate_state::{load_saved_state, reduce};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::merge::{keep_saved, reconcile, ArrayMerger, MergeOptions, Reconciled};
use crate::sync::SyncEngine;

/// Builds the tree handed to the sync engine from the post-mutation state
pub type Reducer = Arc<dyn Fn(&StateTree, Option<&[String]>) -> StateTree + Send + Sync>;

/// Decides whether a mutation triggers a sync
pub type MutationFilter = Arc<dyn Fn(&Mutation) -> bool + Send + Sync>;

/// Attaches the mutation handler to a container
pub type Subscriber =
    Arc<dyn Fn(&dyn StateContainer, MutationHandler) -> SubscriptionId + Send + Sync>;

/// Runs once after saved state replaced the container state
pub type RehydratedCallback = Arc<dyn Fn(&dyn StateContainer) + Send + Sync>;

fn accept_all(_: &Mutation) -> bool {
    true
}

fn subscribe_directly(container: &dyn StateContainer, handler: MutationHandler) -> SubscriptionId {
    container.subscribe(handler)
}

enum SavedState {
    /// Read storage when installing
    Lazy,
    /// Read started at build time
    Pending(JoinHandle<StateTree>),
    /// Eager read finished; reused by every install
    Ready(StateTree),
}

/// Persistence plugin bound to one storage namespace
pub struct PersistedState<S: KvStorage + 'static> {
    storage: Arc<S>,
    config: PersistConfig,
    reducer: Reducer,
    filter: MutationFilter,
    subscriber: Subscriber,
    merge: MergeOptions,
    rehydrated: Option<RehydratedCallback>,
    saved: Mutex<SavedState>,
}

impl<S: KvStorage + 'static> PersistedState<S> {
    /// Start configuring a plugin over `backend`
    pub fn builder<B>(backend: B) -> PersistedStateBuilder<B>
    where
        B: StorageBackend<Storage = S>,
    {
        PersistedStateBuilder::new(backend)
    }
    
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }
    
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
    
    async fn saved_state(&self) -> StateTree {
        let mut slot = self.saved.lock().await;
        // The handle stays in the slot while awaited, so an install dropped
        // mid-wait leaves the eager read for the next one
        let saved = match &mut *slot {
            SavedState::Lazy => return load_saved_state(self.storage.as_ref()).await,
            SavedState::Ready(saved) => return saved.clone(),
            SavedState::Pending(handle) => handle.await.unwrap_or_else(|e| {
                warn!("Eager saved-state read did not finish: {}", e);
                StateTree::new()
            }),
        };
        *slot = SavedState::Ready(saved.clone());
        saved
    }
    
    /// Restore saved state into `container` and start persisting its mutations.
    ///
    /// The saved state is fully read and reconciled before the mutation
    /// handler is attached, so no mutation is ever diffed against a stale
    /// snapshot.
    pub async fn install<C: StateContainer>(&self, container: &C) -> Installation<S> {
        let saved = self.saved_state().await;
        
        match reconcile(container.state(), saved.clone(), &self.merge) {
            Reconciled::Replaced(tree) => {
                info!(
                    "Rehydrating {} keys from '{}'",
                    saved.len(),
                    self.storage.namespace()
                );
                container.replace_state(tree);
                if let Some(rehydrated) = &self.rehydrated {
                    rehydrated(container);
                }
            }
            Reconciled::Unchanged(_) => {
                debug!("Nothing persisted in '{}'", self.storage.namespace());
            }
        }
        
        // Seeded with what storage holds right now
        let engine = Arc::new(SyncEngine::new(self.storage.clone(), saved));
        let subscription = (self.subscriber)(container, self.mutation_handler(engine.clone()));
        
        Installation {
            subscription,
            engine,
        }
    }
    
    fn mutation_handler(&self, engine: Arc<SyncEngine<S>>) -> MutationHandler {
        let filter = self.filter.clone();
        let reducer = self.reducer.clone();
        let paths = self.config.paths.clone();
        
        Arc::new(move |mutation: Mutation, state: StateTree| {
            // Filter and reduce on arrival so the handler sees the state as
            // committed, whenever its sync gets to run
            let reduced = if filter(&mutation) {
                Some(reducer(&state, paths.as_deref()))
            } else {
                None
            };
            let engine = engine.clone();
            
            async move {
                let Some(reduced) = reduced else {
                    debug!("Mutation '{}' filtered out", mutation);
                    return Ok(());
                };
                let report = engine.sync(reduced).await?;
                debug!(
                    "Mutation '{}' persisted: {} written, {} removed",
                    mutation, report.written, report.removed
                );
                Ok::<(), RehydrateError>(())
            }
            .boxed()
        })
    }
}

/// Result of installing the plugin into a container
pub struct Installation<S: KvStorage> {
    subscription: SubscriptionId,
    engine: Arc<SyncEngine<S>>,
}

impl<S: KvStorage> Installation<S> {
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
    
    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }
    
    /// Stop persisting the container's mutations
    pub fn detach(self, container: &dyn StateContainer) -> bool {
        container.unsubscribe(self.subscription)
    }
}

/// Builder for [`PersistedState`]
pub struct PersistedStateBuilder<B: StorageBackend> {
    backend: B,
    config: PersistConfig,
    reducer: Option<Reducer>,
    filter: Option<MutationFilter>,
    subscriber: Option<Subscriber>,
    array_merger: Option<ArrayMerger>,
    rehydrated: Option<RehydratedCallback>,
}

impl<B: StorageBackend> PersistedStateBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: PersistConfig::default(),
            reducer: None,
            filter: None,
            subscriber: None,
            array_merger: None,
            rehydrated: None,
        }
    }
    
    /// Apply every data-only option at once
    pub fn config(mut self, config: PersistConfig) -> Self {
        self.config = config;
        self
    }
    
    pub fn key(mut self, key: &str) -> Self {
        self.config.key = key.to_string();
        self
    }
    
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.config.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }
    
    pub fn fetch_before_use(mut self, enabled: bool) -> Self {
        self.config.fetch_before_use = enabled;
        self
    }
    
    pub fn overwrite(mut self, enabled: bool) -> Self {
        self.config.overwrite = enabled;
        self
    }
    
    pub fn reducer<F>(mut self, reducer: F) -> Self
    where
        F: Fn(&StateTree, Option<&[String]>) -> StateTree + Send + Sync + 'static,
    {
        self.reducer = Some(Arc::new(reducer));
        self
    }
    
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Mutation) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
    
    pub fn subscriber<F>(mut self, subscriber: F) -> Self
    where
        F: Fn(&dyn StateContainer, MutationHandler) -> SubscriptionId + Send + Sync + 'static,
    {
        self.subscriber = Some(Arc::new(subscriber));
        self
    }
    
    pub fn array_merger<F>(mut self, merger: F) -> Self
    where
        F: Fn(Vec<Value>, Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        self.array_merger = Some(Arc::new(merger));
        self
    }
    
    pub fn rehydrated<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn StateContainer) + Send + Sync + 'static,
    {
        self.rehydrated = Some(Arc::new(callback));
        self
    }
    
    /// Open the namespace and, with `fetch_before_use`, start reading it.
    ///
    /// The eager read is spawned on the current tokio runtime; building
    /// outside a runtime is an error in that mode.
    pub fn build(self) -> RehydrateResult<PersistedState<B::Storage>> {
        let storage = Arc::new(self.backend.namespace(self.config.namespace())?);
        
        let saved = if self.config.fetch_before_use {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| RehydrateError::RuntimeUnavailable(e.to_string()))?;
            let storage = storage.clone();
            SavedState::Pending(runtime.spawn(async move { load_saved_state(storage.as_ref()).await }))
        } else {
            SavedState::Lazy
        };
        
        info!(
            "Persisting state in '{}' (paths: {:?}, eager: {}, overwrite: {})",
            self.config.namespace(), self.config.paths, self.config.fetch_before_use, self.config.overwrite
        );
        
        Ok(PersistedState {
            storage,
            merge: MergeOptions {
                overwrite: self.config.overwrite,
                array_merger: self.array_merger.unwrap_or_else(|| Arc::new(keep_saved) as ArrayMerger),
            },
            config: self.config,
            reducer: self.reducer.unwrap_or_else(|| Arc::new(reduce) as Reducer),
            filter: self.filter.unwrap_or_else(|| Arc::new(accept_all) as MutationFilter),
            subscriber: self.subscriber.unwrap_or_else(|| Arc::new(subscribe_directly) as Subscriber),
            rehydrated: self.rehydrated,
            saved: Mutex::new(saved),
        })
    }
}

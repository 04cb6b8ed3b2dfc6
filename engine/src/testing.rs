//! Test doubles shared by the engine's test modules

use async_trait::async_trait;
use parking_lot::Mutex;
use rehydrate_core::{
    EntryVisitor, KvStorage, MutationHandler, RehydrateError, RehydrateResult, StateContainer,
    StateTree, StorageBackend, SubscriptionId,
};
use rehydrate_state::MemoryStorage;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::store::Store;

/// Memory storage that can fail writes to one key, fail or delay iteration,
/// or yield at every operation. Counts writes and removals in flight.
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing_key: Mutex<Option<String>>,
    fail_iterate: AtomicBool,
    read_delay: Option<Duration>,
    slow: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            failing_key: Mutex::new(None),
            fail_iterate: AtomicBool::new(false),
            read_delay: None,
            slow: false,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
    
    pub fn failing_on(key: &str) -> Self {
        let storage = Self::new(MemoryStorage::new("flaky"));
        *storage.failing_key.lock() = Some(key.to_string());
        storage
    }
    
    pub fn broken_iterate(inner: MemoryStorage) -> Self {
        let storage = Self::new(inner);
        storage.fail_iterate.store(true, Ordering::SeqCst);
        storage
    }
    
    pub fn delayed_read(inner: MemoryStorage, delay: Duration) -> Self {
        Self {
            read_delay: Some(delay),
            ..Self::new(inner)
        }
    }
    
    pub fn slow() -> Self {
        Self {
            slow: true,
            ..Self::new(MemoryStorage::new("slow"))
        }
    }
    
    pub fn heal(&self) {
        *self.failing_key.lock() = None;
        self.fail_iterate.store(false, Ordering::SeqCst);
    }
    
    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
    
    /// Highest number of writes and removals seen running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
    
    async fn pause(&self) {
        if self.slow {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
    }
    
    async fn tracked<T>(&self, op: impl std::future::Future<Output = T>) -> T {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.pause().await;
        let result = op.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
    
    fn check(&self, key: &str) -> RehydrateResult<()> {
        match self.failing_key.lock().as_deref() {
            Some(failing) if failing == key => Err(RehydrateError::StorageError(format!(
                "quota exceeded writing '{}'",
                key
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KvStorage for FlakyStorage {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }
    
    async fn iterate(&self, visitor: &mut EntryVisitor<'_>) -> RehydrateResult<()> {
        if self.fail_iterate.load(Ordering::SeqCst) {
            return Err(RehydrateError::StorageError("storage unreadable".into()));
        }
        if let Some(delay) = self.read_delay {
            // Entries are read up front and handed over after the delay
            let entries = self.inner.entries();
            tokio::time::sleep(delay).await;
            for (key, value) in entries {
                visitor(key, value);
            }
            return Ok(());
        }
        self.inner.iterate(visitor).await
    }
    
    async fn get_item(&self, key: &str) -> RehydrateResult<Option<Value>> {
        self.inner.get_item(key).await
    }
    
    async fn set_item(&self, key: &str, value: Value) -> RehydrateResult<Value> {
        self.tracked(async {
            self.check(key)?;
            self.inner.set_item(key, value).await
        })
        .await
    }
    
    async fn remove_item(&self, key: &str) -> RehydrateResult<()> {
        self.tracked(async {
            self.check(key)?;
            self.inner.remove_item(key).await
        })
        .await
    }
    
    async fn clear(&self) -> RehydrateResult<()> {
        self.inner.clear().await
    }
}

/// Container that records replacements and subscriptions on top of a real [`Store`]
pub struct RecordingContainer {
    pub store: Store,
    pub replaced: Mutex<Vec<StateTree>>,
    pub subscribed: AtomicUsize,
}

impl RecordingContainer {
    pub fn new(initial: StateTree) -> Self {
        Self {
            store: Store::new(initial),
            replaced: Mutex::new(Vec::new()),
            subscribed: AtomicUsize::new(0),
        }
    }
    
    pub fn replacements(&self) -> Vec<StateTree> {
        self.replaced.lock().clone()
    }
    
    pub fn subscriptions(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }
}

impl StateContainer for RecordingContainer {
    fn state(&self) -> StateTree {
        self.store.state()
    }
    
    fn replace_state(&self, state: StateTree) {
        self.replaced.lock().push(state.clone());
        self.store.replace_state(state);
    }
    
    fn subscribe(&self, handler: MutationHandler) -> SubscriptionId {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        self.store.subscribe(handler)
    }
    
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }
}

/// Route engine logs to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend handing out the same storage for every namespace
pub struct FixedBackend<S>(pub Arc<S>);

impl<S: KvStorage + 'static> StorageBackend for FixedBackend<S> {
    type Storage = Arc<S>;
    
    fn namespace(&self, _name: &str) -> RehydrateResult<Arc<S>> {
        Ok(self.0.clone())
    }
}

//! In-process state container

use parking_lot::RwLock;
use rehydrate_core::{
    Mutation, MutationHandler, RehydrateResult, StateContainer, StateTree, SubscriptionId,
};
use tracing::{debug, error};

/// Minimal state container: a state tree plus an ordered list of mutation
/// listeners.
pub struct Store {
    state: RwLock<StateTree>,
    subscribers: RwLock<Vec<(SubscriptionId, MutationHandler)>>,
    next_id: RwLock<SubscriptionId>,
}

impl Store {
    pub fn new(initial: StateTree) -> Self {
        Self {
            state: RwLock::new(initial),
            subscribers: RwLock::new(Vec::new()),
            next_id: RwLock::new(SubscriptionId::new(0)),
        }
    }
    
    /// Number of registered listeners
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
    
    /// Apply a mutation, then run every listener in registration order.
    ///
    /// Listeners are awaited one after another. A failing listener does not
    /// stop the others; the first failure is returned once all have run.
    pub async fn commit<F>(&self, mutation: Mutation, mutate: F) -> RehydrateResult<()>
    where
        F: FnOnce(&mut StateTree) + Send,
    {
        let state = {
            let mut state = self.state.write();
            mutate(&mut state);
            state.clone()
        };
        self.notify(mutation, state).await
    }
    
    /// Run every listener with an explicit state, leaving the store untouched
    pub async fn notify(&self, mutation: Mutation, state: StateTree) -> RehydrateResult<()> {
        let handlers: Vec<MutationHandler> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        
        debug!("Notifying {} listeners of '{}'", handlers.len(), mutation);
        
        let mut first_error = None;
        for handler in handlers {
            if let Err(e) = handler(mutation.clone(), state.clone()).await {
                error!("Listener failed on mutation '{}': {}", mutation, e);
                first_error.get_or_insert(e);
            }
        }
        
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StateTree::new())
    }
}

impl StateContainer for Store {
    fn state(&self) -> StateTree {
        self.state.read().clone()
    }
    
    fn replace_state(&self, state: StateTree) {
        *self.state.write() = state;
    }
    
    fn subscribe(&self, handler: MutationHandler) -> SubscriptionId {
        let id = {
            let mut next = self.next_id.write();
            let id = *next;
            *next = id.next();
            id
        };
        self.subscribers.write().push((id, handler));
        id
    }
    
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }
}

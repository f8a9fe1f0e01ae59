//! Product executor registry
//!
//! Maps an executor kind to the delegate client that talks to it.

use scanward_client::DelegateClient;
use scanward_core::domain::executor::ExecutorKind;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct DelegateRegistry {
    clients: HashMap<ExecutorKind, Arc<dyn DelegateClient>>,
}

impl DelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one client serving every delegate protocol kind
    pub fn with_delegate_protocol(client: Arc<dyn DelegateClient>) -> Self {
        let mut registry = Self::new();
        registry.register(ExecutorKind::Pds, client);
        registry
    }

    pub fn register(&mut self, kind: ExecutorKind, client: Arc<dyn DelegateClient>) {
        self.clients.insert(kind, client);
    }

    pub fn client_for(&self, kind: ExecutorKind) -> Option<Arc<dyn DelegateClient>> {
        self.clients.get(&kind).cloned()
    }
}

impl std::fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateRegistry")
            .field("kinds", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

//! Mock client repository for testing.

use crate::client::Client;
use crate::error::{FlowError, Result};
use crate::providers::ClientRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock client repository.
///
/// In-memory client registry.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Debug, Clone, Default)]
pub struct MockClientRepository {
    clients: Arc<Mutex<HashMap<String, Client>>>,
}

impl MockClientRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client (builder style).
    #[must_use]
    pub fn with_client(self, client: Client) -> Self {
        self.insert(client);
        self
    }

    /// Register or replace a client.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn insert(&self, client: Client) {
        self.clients
            .lock()
            .unwrap()
            .insert(client.client_id.clone(), client);
    }
}

impl ClientRepository for MockClientRepository {
    async fn get_client(&self, client_id: &str) -> Result<Client> {
        let clients = self
            .clients
            .lock()
            .map_err(|_| FlowError::Storage("Failed to acquire lock".to_string()))?;
        clients.get(client_id).cloned().ok_or(FlowError::NotFound)
    }
}

//! Mock identity provider for testing.

use crate::error::{FlowError, Result};
use crate::providers::IdentityProviderSessions;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Calls {
    disabled: Vec<(String, String)>,
    unavailable: bool,
}

/// Mock identity provider.
///
/// Records every disabled session. Clones share the record.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    calls: Arc<Mutex<Calls>>,
}

impl MockIdentityProvider {
    /// Create a provider that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    pub fn set_unavailable(&self, unavailable: bool) {
        self.calls.lock().unwrap().unavailable = unavailable;
    }

    /// `(subject, identity provider session id)` pairs disabled so far.
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn disabled(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().disabled.clone()
    }
}

impl IdentityProviderSessions for MockIdentityProvider {
    async fn disable_session(
        &self,
        subject: &str,
        identity_provider_session_id: &str,
    ) -> Result<()> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| FlowError::Storage("Failed to acquire lock".to_string()))?;
        if calls.unavailable {
            return Err(FlowError::Storage("identity provider unavailable".to_string()));
        }
        calls
            .disabled
            .push((subject.to_string(), identity_provider_session_id.to_string()));
        Ok(())
    }
}

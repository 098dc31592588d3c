//! Mock flow store for testing.

use crate::client::Client;
use crate::error::{FlowError, Result};
use crate::flow::{Flow, FlowState};
use crate::providers::FlowStore;
use crate::state::{ForcedObfuscatedLoginSession, LoginSession, LogoutRequest};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Records {
    /// Flows by login challenge id.
    flows: HashMap<String, Flow>,
    /// Consent challenge id to flow id.
    consent_index: HashMap<String, String>,
    sessions: HashMap<String, LoginSession>,
    /// Logout requests by challenge.
    logouts: HashMap<String, LogoutRequest>,
    /// Keyed by (client id, obfuscated subject).
    forced: HashMap<(String, String), ForcedObfuscatedLoginSession>,
}

impl Records {
    fn flow_by_consent(&mut self, challenge: &str) -> Result<&mut Flow> {
        let id = self.consent_index.get(challenge).ok_or(FlowError::NotFound)?;
        self.flows.get_mut(id).ok_or(FlowError::NotFound)
    }

    /// Clients the subject granted consent to within one live session.
    fn clients_in_session(&self, subject: &str, sid: &str) -> Vec<Client> {
        if !self.sessions.contains_key(sid) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        self.flows
            .values()
            .filter(|flow| flow.state == FlowState::ConsentUsed)
            .filter(|flow| flow.login.session_id == sid)
            .filter(|flow| {
                flow.handled_login
                    .as_ref()
                    .is_some_and(|handled| handled.subject == subject)
            })
            .filter(|flow| {
                flow.handled_consent
                    .as_ref()
                    .is_some_and(|handled| handled.error.is_none())
            })
            .filter(|flow| seen.insert(flow.client_id().to_string()))
            .map(|flow| flow.login.client.clone())
            .collect()
    }
}

/// Mock flow store.
///
/// In-memory implementation for testing. All operations run under a single
/// lock, so the `verify_and_invalidate_*` operations are atomic.
///
/// **WARNING**: Do NOT use in production. This is for testing only!
#[derive(Debug, Clone, Default)]
pub struct MockFlowStore {
    records: Arc<Mutex<Records>>,
}

impl MockFlowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>> {
        self.records
            .lock()
            .map_err(|_| FlowError::Storage("Failed to acquire lock".to_string()))
    }

    /// Number of stored login sessions (test helper).
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.records.lock().unwrap().sessions.len()
    }

    /// Stored login session by id, remembered or not (test helper).
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn login_session(&self, id: &str) -> Option<LoginSession> {
        self.records.lock().unwrap().sessions.get(id).cloned()
    }

    /// Number of stored logout requests (test helper).
    #[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
    #[must_use]
    pub fn logout_request_count(&self) -> usize {
        self.records.lock().unwrap().logouts.len()
    }
}

impl FlowStore for MockFlowStore {
    async fn create_login_request(&self, flow: &Flow) -> Result<()> {
        let mut records = self.lock()?;
        if records.flows.contains_key(&flow.id) {
            return Err(FlowError::Conflict(format!("flow {} already exists", flow.id)));
        }
        records.flows.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn get_login_request(&self, challenge: &str) -> Result<Flow> {
        let records = self.lock()?;
        records.flows.get(challenge).cloned().ok_or(FlowError::NotFound)
    }

    async fn handle_login_request(&self, flow: &Flow) -> Result<()> {
        let mut records = self.lock()?;
        let stored = records.flows.get_mut(&flow.id).ok_or(FlowError::NotFound)?;
        if !stored.state.login_handleable() {
            return Err(FlowError::Conflict(
                "The login request was already used and can no longer be changed".to_string(),
            ));
        }
        *stored = flow.clone();
        Ok(())
    }

    async fn verify_and_invalidate_login_request(&self, challenge: &str) -> Result<Flow> {
        let mut records = self.lock()?;
        let stored = records.flows.get_mut(challenge).ok_or(FlowError::NotFound)?;
        stored.invalidate_login_request()?;
        Ok(stored.clone())
    }

    async fn create_consent_request(&self, flow: &Flow) -> Result<()> {
        let challenge = flow
            .consent_challenge()
            .ok_or_else(|| FlowError::Conflict("flow has no consent stage".to_string()))?
            .to_string();

        let mut records = self.lock()?;
        let stored = records.flows.get_mut(&flow.id).ok_or(FlowError::NotFound)?;
        if stored.state != FlowState::LoginUsed {
            return Err(FlowError::Conflict(format!(
                "consent stage cannot start in state {:?}",
                stored.state
            )));
        }
        *stored = flow.clone();
        records.consent_index.insert(challenge, flow.id.clone());
        Ok(())
    }

    async fn get_consent_request(&self, challenge: &str) -> Result<Flow> {
        let mut records = self.lock()?;
        records.flow_by_consent(challenge).map(|flow| flow.clone())
    }

    async fn handle_consent_request(&self, flow: &Flow) -> Result<()> {
        let challenge = flow.consent_challenge().ok_or(FlowError::NotFound)?;
        let mut records = self.lock()?;
        let stored = records.flow_by_consent(challenge)?;
        if !stored.state.consent_handleable() {
            return Err(FlowError::Conflict(
                "The consent request was already used and can no longer be changed".to_string(),
            ));
        }
        *stored = flow.clone();
        Ok(())
    }

    async fn verify_and_invalidate_consent_request(&self, challenge: &str) -> Result<Flow> {
        let mut records = self.lock()?;
        let stored = records.flow_by_consent(challenge)?;
        stored.invalidate_consent_request()?;
        Ok(stored.clone())
    }

    async fn find_granted_and_remembered_consent_requests(
        &self,
        client_id: &str,
        subject: &str,
    ) -> Result<Vec<Flow>> {
        let records = self.lock()?;
        Ok(records
            .flows
            .values()
            .filter(|flow| flow.state == FlowState::ConsentUsed && flow.client_id() == client_id)
            .filter(|flow| {
                flow.handled_login
                    .as_ref()
                    .is_some_and(|handled| handled.subject == subject)
            })
            .filter(|flow| {
                flow.handled_consent
                    .as_ref()
                    .is_some_and(|handled| handled.remember && handled.error.is_none())
            })
            .cloned()
            .collect())
    }

    async fn create_login_session(&self, session: &LoginSession) -> Result<()> {
        let mut records = self.lock()?;
        if records.sessions.contains_key(&session.id) {
            return Err(FlowError::Conflict(format!(
                "login session {} already exists",
                session.id
            )));
        }
        records.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_remembered_login_session(&self, id: &str) -> Result<LoginSession> {
        let records = self.lock()?;
        records
            .sessions
            .get(id)
            .filter(|session| session.remember)
            .cloned()
            .ok_or(FlowError::NotFound)
    }

    async fn get_login_session(&self, id: &str) -> Result<LoginSession> {
        let records = self.lock()?;
        records.sessions.get(id).cloned().ok_or(FlowError::NotFound)
    }

    async fn confirm_login_session(&self, session: &LoginSession) -> Result<()> {
        let mut records = self.lock()?;
        let stored = records.sessions.get_mut(&session.id).ok_or(FlowError::NotFound)?;
        *stored = session.clone();
        Ok(())
    }

    async fn delete_login_session(&self, id: &str) -> Result<LoginSession> {
        let mut records = self.lock()?;
        records.sessions.remove(id).ok_or(FlowError::NotFound)
    }

    async fn revoke_subject_login_session(&self, subject: &str) -> Result<()> {
        let mut records = self.lock()?;
        let before = records.sessions.len();
        records.sessions.retain(|_, session| session.subject != subject);
        if records.sessions.len() == before {
            return Err(FlowError::NotFound);
        }
        Ok(())
    }

    async fn create_logout_request(&self, request: &LogoutRequest) -> Result<()> {
        let mut records = self.lock()?;
        records
            .logouts
            .insert(request.challenge.clone(), request.clone());
        Ok(())
    }

    async fn get_logout_request(&self, challenge: &str) -> Result<LogoutRequest> {
        let records = self.lock()?;
        records.logouts.get(challenge).cloned().ok_or(FlowError::NotFound)
    }

    async fn accept_logout_request(&self, challenge: &str) -> Result<LogoutRequest> {
        let mut records = self.lock()?;
        let stored = records.logouts.get_mut(challenge).ok_or(FlowError::NotFound)?;
        if stored.used {
            return Err(FlowError::AlreadyUsed);
        }
        stored.accepted = true;
        stored.rejected = false;
        Ok(stored.clone())
    }

    async fn reject_logout_request(&self, challenge: &str) -> Result<()> {
        let mut records = self.lock()?;
        records
            .logouts
            .remove(challenge)
            .map(|_| ())
            .ok_or(FlowError::NotFound)
    }

    async fn verify_and_invalidate_logout_request(&self, verifier: &str) -> Result<LogoutRequest> {
        let mut records = self.lock()?;
        let stored = records
            .logouts
            .values_mut()
            .find(|request| request.verifier == verifier)
            .ok_or(FlowError::NotFound)?;
        if stored.used {
            return Err(FlowError::AlreadyUsed);
        }
        if !stored.accepted || stored.rejected {
            return Err(FlowError::NotFound);
        }
        stored.used = true;
        Ok(stored.clone())
    }

    async fn create_forced_obfuscated_login_session(
        &self,
        session: &ForcedObfuscatedLoginSession,
    ) -> Result<()> {
        let mut records = self.lock()?;
        records.forced.insert(
            (session.client_id.clone(), session.subject_obfuscated.clone()),
            session.clone(),
        );
        Ok(())
    }

    async fn get_forced_obfuscated_login_session(
        &self,
        client_id: &str,
        subject_obfuscated: &str,
    ) -> Result<ForcedObfuscatedLoginSession> {
        let records = self.lock()?;
        records
            .forced
            .get(&(client_id.to_string(), subject_obfuscated.to_string()))
            .cloned()
            .ok_or(FlowError::NotFound)
    }

    async fn list_clients_with_front_channel_logout(
        &self,
        subject: &str,
        sid: &str,
    ) -> Result<Vec<Client>> {
        let records = self.lock()?;
        Ok(records
            .clients_in_session(subject, sid)
            .into_iter()
            .filter(|client| {
                client
                    .frontchannel_logout_uri
                    .as_deref()
                    .is_some_and(|uri| !uri.is_empty())
            })
            .collect())
    }

    async fn list_clients_with_back_channel_logout(
        &self,
        subject: &str,
        sid: &str,
    ) -> Result<Vec<Client>> {
        let records = self.lock()?;
        Ok(records
            .clients_in_session(subject, sid)
            .into_iter()
            .filter(|client| {
                client
                    .backchannel_logout_uri
                    .as_deref()
                    .is_some_and(|uri| !uri.is_empty())
            })
            .collect())
    }
}

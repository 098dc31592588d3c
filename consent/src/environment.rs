//! Flow environment.
//!
//! This module defines the environment type for dependency injection in the
//! flow controllers.

use crate::metrics::FlowMetrics;
use crate::providers::{
    ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use std::sync::Arc;

/// Flow environment.
///
/// Contains all external dependencies needed by the controllers.
///
/// # Type Parameters
///
/// - `S`: Flow store
/// - `C`: Client repository
/// - `J`: ID token strategy
/// - `K`: Clock
/// - `I`: Identity provider sessions
#[derive(Clone)]
pub struct FlowEnvironment<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// Flow, session and logout storage.
    pub store: S,

    /// Registered clients.
    pub clients: C,

    /// ID token hint decoding and logout token signing.
    pub jwt: J,

    /// Time source.
    pub clock: K,

    /// Upstream identity provider sessions ended on logout.
    pub identity: I,

    /// Flow counters.
    pub metrics: Arc<FlowMetrics>,
}

impl<S, C, J, K, I> FlowEnvironment<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// Create a new flow environment with fresh counters.
    #[must_use]
    pub fn new(store: S, clients: C, jwt: J, clock: K, identity: I) -> Self {
        Self {
            store,
            clients,
            jwt,
            clock,
            identity,
            metrics: Arc::new(FlowMetrics::new()),
        }
    }

    /// Share existing counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<FlowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

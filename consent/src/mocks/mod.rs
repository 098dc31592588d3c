//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests.

pub mod client;
pub mod clock;
pub mod flow_store;
pub mod identity;

pub use client::MockClientRepository;
pub use clock::MockClock;
pub use flow_store::MockFlowStore;
pub use identity::MockIdentityProvider;

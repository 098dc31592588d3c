//! Flow engine providers.
//!
//! This module defines traits for all external dependencies of the flow
//! engine. The controllers depend on these traits and the embedding service
//! provides concrete implementations.
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐
//! │ DefaultStrategy  │─────▶│ FlowStore        │  flows, sessions, logouts
//! │ (controllers)    │      ├──────────────────┤
//! │                  │─────▶│ ClientRepository │  registered clients
//! │                  │      ├──────────────────┤
//! │                  │─────▶│ IdTokenStrategy  │  id_token_hint, logout tokens
//! │                  │      ├──────────────────┤
//! │                  │─────▶│ Clock            │  request ages, iat checks
//! │                  │      ├──────────────────┤
//! │                  │─────▶│ IdentityProvider │  upstream sessions ended
//! │                  │      │ Sessions         │  on logout
//! └──────────────────┘      └──────────────────┘
//! ```
//!
//! This enables:
//! - **Testing**: Use mocks (in-memory, deterministic clock)
//! - **Production**: Use real services (SQL store, JWKS-backed signer)

pub mod client;
pub mod clock;
pub mod flow_store;
pub mod identity;
pub mod jwt;

pub use client::ClientRepository;
pub use clock::{Clock, SystemClock};
pub use flow_store::FlowStore;
pub use identity::{IdentityProviderSessions, NoIdentityProvider};
pub use jwt::{Claims, IdTokenStrategy, JwtStrategy};

//! # Composable Rust Consent
//!
//! Login, consent and logout flows for an OAuth 2.0 / OpenID Connect
//! provider that delegates user interaction to external UIs.
//!
//! ## Features
//!
//! - **Stateless redirects**: flow state travels in encrypted, purpose-bound tokens
//! - **Single use**: every verifier is redeemed exactly once through the store
//! - **CSRF bound**: each challenge is tied to a per-client cookie
//! - **Pairwise subjects**: per-sector subject obfuscation
//! - **Logout propagation**: front-channel URLs and concurrent back-channel delivery
//!
//! ## Flow
//!
//! ```text
//! client ─▶ /oauth2/auth ─▶ login UI ─▶ /oauth2/auth?login_verifier
//!        ─▶ consent UI ─▶ /oauth2/auth?consent_verifier ─▶ ConsentResult
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use composable_rust_consent::*;
//!
//! let strategy = DefaultStrategy::new(config, cipher, env)?;
//!
//! // 1. Authorization request: the user agent goes to the login UI
//! let outcome = strategy.handle_authorization_request(&mut jar, &request).await?;
//!
//! // 2. The login UI accepts and sends the user agent back with a verifier
//! let redirect = strategy.accept_login_request(&challenge, accept).await?;
//!
//! // 3. ...and after consent, the flow completes
//! if let Outcome::Continue(result) = outcome {
//!     issue_tokens(result);
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod client;
pub mod codec;
pub mod config;
pub mod constants;
pub mod cookies;
pub mod csrf;
pub mod environment;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod obfuscation;
pub mod providers;
pub mod request;
pub mod state;
pub mod strategy;
pub mod utils;

// Mock implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use client::{Client, SubjectType};
pub use codec::{FlowCipher, Purpose};
pub use config::{CookieConfig, FlowConfig, GrantTieBreak, SameSiteMode};
pub use environment::FlowEnvironment;
pub use error::{FlowError, RequestDeniedError, Result};
pub use flow::{Flow, FlowState};
pub use request::{AuthorizeParams, AuthorizeRequest, LogoutParams};
pub use state::{ConsentResult, LoginSession, LogoutResult, Outcome, RedirectTo};
pub use strategy::{AcceptConsentRequest, AcceptLoginRequest, ConsentRequest, DefaultStrategy};

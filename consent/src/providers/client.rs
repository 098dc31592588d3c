//! Client registry trait.

use crate::client::Client;
use crate::error::Result;

/// Read access to registered OAuth 2.0 clients.
pub trait ClientRepository: Send + Sync {
    /// Load a client by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the client is not registered.
    fn get_client(
        &self,
        client_id: &str,
    ) -> impl std::future::Future<Output = Result<Client>> + Send;
}

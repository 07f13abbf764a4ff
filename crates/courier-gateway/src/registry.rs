use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use courier_types::ClientIdentity;

use crate::connection::ConnectionHandle;
use crate::error::RegistryError;

/// A registered client and the connection it registered on.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub identity: ClientIdentity,
    pub connection: ConnectionHandle,
}

/// Live map of client id -> connection, shared by every connection task.
///
/// Lookups and snapshots take the read lock; registration and removal take
/// the write lock. Nothing is written to a socket while the lock is held.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, RegisteredClient>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client. Fails if the id is currently taken.
    pub async fn register(
        &self,
        identity: ClientIdentity,
        connection: ConnectionHandle,
    ) -> Result<(), RegistryError> {
        let mut clients = self.inner.write().await;
        if clients.contains_key(&identity.id) {
            return Err(RegistryError::AlreadyRegistered { id: identity.id });
        }
        clients.insert(
            identity.id.clone(),
            RegisteredClient {
                identity,
                connection,
            },
        );
        Ok(())
    }

    /// Remove whatever this connection registered, if anything.
    ///
    /// Keyed by connection rather than client id, so cleanup of an old
    /// connection can never evict a newer one that reused the id.
    pub async fn unregister(&self, conn_id: Uuid) -> Option<ClientIdentity> {
        let mut clients = self.inner.write().await;
        let id = clients
            .iter()
            .find(|(_, client)| client.connection.id() == conn_id)
            .map(|(id, _)| id.clone())?;
        clients.remove(&id).map(|client| client.identity)
    }

    pub async fn lookup(&self, id: &str) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .await
            .get(id)
            .map(|client| client.connection.clone())
    }

    /// Point-in-time copy of every registered client.
    pub async fn snapshot(&self) -> Vec<RegisteredClient> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove every client and force its connection closed.
    pub async fn drain(&self) -> Vec<RegisteredClient> {
        let drained: Vec<RegisteredClient> = {
            let mut clients = self.inner.write().await;
            clients.drain().map(|(_, client)| client).collect()
        };
        for client in &drained {
            client.connection.close();
        }
        drained
    }
}

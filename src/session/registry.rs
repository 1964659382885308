//! Identity-to-session registry with idle eviction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::{RemoteSession, SessionConfig};
use crate::error::GatewayError;
use crate::transport::Connector;
use crate::Result;

/// Thread-safe map of chat identity to live session.
///
/// Guarantees at most one session per identity: concurrent events for
/// the same identity share the session and queue on its operation
/// mutex. Sessions are constructed lazily and evicted either by
/// explicit logout or by the idle sweep.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<RemoteSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry. Sessions it constructs dial through
    /// `connector` using `config`.
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the identity's session, constructing and registering a
    /// new one if none exists.
    pub fn get_or_create(&self, identity: &str) -> Result<Arc<RemoteSession>> {
        {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| GatewayError::LockPoisoned)?;
            if let Some(session) = sessions.get(identity) {
                return Ok(Arc::clone(session));
            }
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| GatewayError::LockPoisoned)?;
        let session = sessions.entry(identity.to_string()).or_insert_with(|| {
            debug!("registry: creating session for {}", identity);
            Arc::new(RemoteSession::new(
                identity,
                self.config.clone(),
                Arc::clone(&self.connector),
            ))
        });
        Ok(Arc::clone(session))
    }

    /// Get the identity's session without creating one.
    pub fn get(&self, identity: &str) -> Result<Option<Arc<RemoteSession>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| GatewayError::LockPoisoned)?;
        Ok(sessions.get(identity).cloned())
    }

    /// Close and discard the identity's session (explicit logout).
    ///
    /// Returns whether a session existed. The close happens after the
    /// map lock is released.
    pub async fn remove(&self, identity: &str) -> bool {
        let removed = {
            match self.sessions.write() {
                Ok(mut sessions) => sessions.remove(identity),
                Err(_) => None,
            }
        };
        match removed {
            Some(session) => {
                session.close().await;
                info!("registry: removed session for {}", identity);
                true
            }
            None => false,
        }
    }

    /// Close and remove every session idle past its timeout.
    ///
    /// Returns how many sessions were evicted. Idle candidates are
    /// collected under the read lock, then re-checked under the write
    /// lock so a session revived in between survives.
    pub async fn sweep(&self) -> usize {
        let candidates: Vec<(String, Arc<RemoteSession>)> = {
            match self.sessions.read() {
                Ok(sessions) => sessions
                    .iter()
                    .filter(|(_, session)| session.is_idle())
                    .map(|(identity, session)| (identity.clone(), Arc::clone(session)))
                    .collect(),
                Err(_) => return 0,
            }
        };

        let mut evicted = 0;
        for (identity, candidate) in candidates {
            let removed = {
                match self.sessions.write() {
                    Ok(mut sessions) => match sessions.get(&identity) {
                        Some(current) if Arc::ptr_eq(current, &candidate) && current.is_idle() => {
                            sessions.remove(&identity)
                        }
                        _ => None,
                    },
                    Err(_) => None,
                }
            };
            if let Some(session) = removed {
                session.close().await;
                info!("registry: evicted idle session for {}", identity);
                evicted += 1;
            }
        }
        evicted
    }

    /// Close and remove every session (shutdown path).
    pub async fn close_all(&self) {
        let drained: Vec<Arc<RemoteSession>> = {
            match self.sessions.write() {
                Ok(mut sessions) => sessions.drain().map(|(_, session)| session).collect(),
                Err(_) => return,
            }
        };
        for session in drained {
            session.close().await;
        }
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// List registered identities.
    pub fn identities(&self) -> Result<Vec<String>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| GatewayError::LockPoisoned)?;
        Ok(sessions.keys().cloned().collect())
    }
}

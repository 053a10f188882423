//! Control-plane credential handling
//!
//! A worker holds at most one bearer token. It can arrive from the
//! environment, from a persisted token file, or from the control
//! plane's registration response (bootstrap). The token is monotonic:
//! once set it is never replaced and never cleared.

use crate::{CoreError, Result};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Process-wide holder for the control-plane bearer token.
///
/// Shared between the driver loop (which may adopt a bootstrap token)
/// and anything attaching auth headers. Adoption is first-write-wins,
/// so a later bootstrap response can never downgrade or replace an
/// existing credential.
#[derive(Debug)]
pub struct CredentialStore {
    token: RwLock<Option<String>>,
    file: Option<PathBuf>,
}

impl CredentialStore {
    /// Create a store, optionally seeded with a token supplied at start.
    pub fn new(initial: Option<String>, file: Option<PathBuf>) -> Self {
        let initial = initial
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self {
            token: RwLock::new(initial),
            file,
        }
    }

    /// Load the token from the persisted file, if the store is still
    /// empty and a file path is configured.
    ///
    /// A missing file is not an error; anything else unreadable is.
    pub fn load_from_file(&self) -> Result<bool> {
        let Some(path) = &self.file else {
            return Ok(false);
        };

        if self.has_token() {
            return Ok(false);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CoreError::Io(e)),
        };

        let token = content.trim();
        if token.is_empty() {
            return Ok(false);
        }

        let mut slot = self.token.write().expect("credential lock poisoned");
        if slot.is_none() {
            *slot = Some(token.to_string());
            info!("loaded worker auth token from {}", path.display());
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether a token is currently held.
    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .expect("credential lock poisoned")
            .is_some()
    }

    /// Current bearer token, if any.
    pub fn bearer(&self) -> Option<String> {
        self.token.read().expect("credential lock poisoned").clone()
    }

    /// Adopt a bootstrap token issued by the control plane.
    ///
    /// Returns `true` if the token was adopted. A no-op when a token is
    /// already held or the candidate is blank. Adopted tokens are
    /// persisted to the configured file so restarts reuse them.
    pub fn adopt(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }

        {
            let mut slot = self.token.write().expect("credential lock poisoned");
            if slot.is_some() {
                debug!("ignoring bootstrap token, credential already held");
                return false;
            }
            *slot = Some(token.to_string());
        }

        info!("adopted bootstrap token from control plane");

        // Persistence is best-effort: a write failure costs a re-bootstrap
        // on restart, not the current session.
        if let Err(e) = self.persist(token) {
            warn!("failed to persist worker auth token: {}", e);
        }

        true
    }

    fn persist(&self, token: &str) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, format!("{}\n", token))?;
        debug!("persisted worker auth token to {}", path.display());
        Ok(())
    }
}

//! Worker identity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of this worker, fixed at process start.
///
/// The control plane keys its fleet inventory on `(instance_id,
/// worker_id)`. The worker id is generated when the environment does
/// not supply one; it never changes for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Cloud/provisioning instance identifier (may be empty in dev)
    pub instance_id: String,

    /// Unique worker identifier within the fleet
    pub worker_id: String,

    /// Model this worker is expected to serve, if pinned
    pub model_id: Option<String>,
}

impl WorkerIdentity {
    /// Create an identity, generating a worker id if none was supplied.
    pub fn new(instance_id: String, worker_id: Option<String>, model_id: Option<String>) -> Self {
        let worker_id = worker_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            instance_id,
            worker_id,
            model_id: model_id.filter(|m| !m.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keeps_supplied_ids() {
        let identity = WorkerIdentity::new(
            "i-0abc".to_string(),
            Some("worker-7".to_string()),
            Some("demo-model".to_string()),
        );

        assert_eq!(identity.instance_id, "i-0abc");
        assert_eq!(identity.worker_id, "worker-7");
        assert_eq!(identity.model_id.as_deref(), Some("demo-model"));
    }

    #[test]
    fn test_identity_generates_worker_id() {
        let a = WorkerIdentity::new(String::new(), None, None);
        let b = WorkerIdentity::new(String::new(), Some("  ".to_string()), None);

        assert!(!a.worker_id.is_empty());
        assert!(!b.worker_id.is_empty());
        assert_ne!(a.worker_id, b.worker_id);
        assert!(a.model_id.is_none());
    }

    #[test]
    fn test_identity_blank_model_is_none() {
        let identity = WorkerIdentity::new(String::new(), None, Some("".to_string()));
        assert!(identity.model_id.is_none());
    }
}

//! Session module - durable identity bindings for connected agents.
//!
//! A session is immutable after creation; closure is its only mutation. The
//! server synchronizes creation and closure to the peer through notification
//! messages, and tracks which agents currently hold each session in the
//! [`SessionRegistry`].

mod file_store;
mod registry;

pub use file_store::FileSessionManager;
pub use registry::SessionRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Client;
use crate::error::Result;

/// Number of random bytes behind a default session key.
const SESSION_KEY_RANDOM_BYTES: usize = 48;

/// A session: opaque key, creation time, and an embedder-provided info
/// attachment (any JSON-encodable value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session key.
    pub key: String,
    /// Creation timestamp.
    pub creation: DateTime<Utc>,
    /// Embedder attachment, JSON-encoded on the wire and in storage.
    pub info: Option<Value>,
}

impl Session {
    /// Create a session with the given key and info attachment, stamped now.
    pub fn new(key: impl Into<String>, info: Option<Value>) -> Self {
        Self {
            key: key.into(),
            creation: Utc::now(),
            info,
        }
    }

    /// Look up a field of the info attachment by name.
    ///
    /// Returns `None` if there is no attachment, the attachment is not an
    /// object, or the field is absent.
    pub fn info_field(&self, field: &str) -> Option<Value> {
        self.info.as_ref()?.get(field).cloned()
    }
}

/// Pluggable session key minter.
pub trait SessionKeyGenerator: Send + Sync {
    /// Produce a new unique session key.
    fn generate(&self) -> String;
}

/// Default key generator: 48 cryptographically random bytes, URL-safe
/// base64 encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKeyGenerator;

impl SessionKeyGenerator for RandomKeyGenerator {
    fn generate(&self) -> String {
        generate_session_key()
    }
}

/// Generate a default random printable session key.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// Everything session-related a connected agent needs: the enable gate, the
/// registry, and the pluggable manager and key generator.
pub(crate) struct SessionContext {
    pub(crate) enabled: bool,
    pub(crate) registry: SessionRegistry,
    pub(crate) manager: Arc<dyn SessionManager>,
    pub(crate) key_generator: Arc<dyn SessionKeyGenerator>,
}

/// Pluggable session persistence layer.
///
/// The default is the file-backed [`FileSessionManager`]; embedders replace
/// it to persist sessions in a database or elsewhere.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Persist the session currently attached to the given agent.
    ///
    /// A failure here rolls the session creation back entirely.
    async fn on_session_created(&self, client: &Arc<Client>) -> Result<()>;

    /// Look up a session by key. `Ok(None)` means the key is unknown.
    async fn on_session_lookup(&self, key: &str) -> Result<Option<Session>>;

    /// Discard the persisted session attached to the given agent.
    async fn on_session_closed(&self, client: &Arc<Client>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_keys_are_unique_and_printable() {
        let first = generate_session_key();
        let second = generate_session_key();
        assert_ne!(first, second);
        assert!(first.bytes().all(|b| (0x20..=0x7E).contains(&b)));
    }

    #[test]
    fn test_info_field_lookup() {
        let session = Session::new(
            "somekey",
            Some(json!({"uid": "user-1", "some-number": 12345})),
        );
        assert_eq!(session.info_field("uid"), Some(json!("user-1")));
        assert_eq!(session.info_field("some-number"), Some(json!(12345)));
        assert_eq!(session.info_field("missing"), None);
    }

    #[test]
    fn test_info_field_without_attachment() {
        let session = Session::new("somekey", None);
        assert_eq!(session.info_field("uid"), None);
    }

    #[test]
    fn test_session_json_round_trip() {
        let session = Session::new("key-1", Some(json!({"role": "admin"})));
        let encoded = serde_json::to_vec(&session).unwrap();
        let decoded: Session = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, session);
    }
}

use log::{info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{GalleryError, GalleryResult};
use crate::models::hex_digest;
use crate::pending_store::PendingStore;

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_digest(hasher)
}

fn new_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(rand::random::<u64>().to_le_bytes());
    hasher.update(rand::random::<u64>().to_le_bytes());
    hasher.update(crate::models::generate_id().as_bytes());
    hex_digest(hasher)
}

/// One logged-in admin tab. The pending store lives here so each session
/// prepares its own batch.
#[derive(Default)]
pub struct AdminSession {
    pub pending: tokio::sync::Mutex<PendingStore>,
}

struct Credentials {
    email: String,
    password_digest: String,
}

pub struct AdminSessions {
    credentials: Option<Credentials>,
    sessions: Mutex<HashMap<String, Arc<AdminSession>>>,
}

impl AdminSessions {
    /// Admin login stays disabled unless both email and password are set.
    pub fn new(email: Option<&str>, password: Option<&str>) -> Self {
        let credentials = match (email, password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Some(Credentials {
                    email: email.trim().to_string(),
                    password_digest: sha256_hex(password),
                })
            }
            _ => {
                warn!("Admin credentials not configured, admin login is disabled");
                None
            }
        };
        Self {
            credentials,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<AdminSession>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn login(&self, email: &str, password: &str) -> GalleryResult<String> {
        let credentials = self.credentials.as_ref().ok_or(GalleryError::Auth)?;
        let email_ok = credentials.email.eq_ignore_ascii_case(email.trim());
        let password_ok = credentials.password_digest == sha256_hex(password);
        if !(email_ok && password_ok) {
            warn!("Rejected admin login for '{}'", email.trim());
            return Err(GalleryError::Auth);
        }

        let token = new_token();
        self.sessions()
            .insert(token.clone(), Arc::new(AdminSession::default()));
        info!("Admin logged in");
        Ok(token)
    }

    /// Drops the session and its pending batch. Unknown tokens are ignored.
    pub fn logout(&self, token: &str) {
        if self.sessions().remove(token).is_some() {
            info!("Admin logged out");
        }
    }

    pub fn session(&self, token: &str) -> Option<Arc<AdminSession>> {
        self.sessions().get(token).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.sessions().len()
    }
}

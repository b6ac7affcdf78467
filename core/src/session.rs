/// Session provider seam: who is signed in, and with which token
use std::sync::RwLock;

pub trait SessionProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;

    fn auth_token(&self) -> Option<String>;

    fn is_signed_in(&self) -> bool {
        self.user_id().is_some()
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    user_id: String,
    auth_token: String,
}

/// In-memory session, for the binary and for tests
#[derive(Debug, Default)]
pub struct MemorySession {
    credentials: RwLock<Option<Credentials>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(user_id, auth_token);
        session
    }

    pub fn sign_in(&self, user_id: impl Into<String>, auth_token: impl Into<String>) {
        let creds = Credentials {
            user_id: user_id.into(),
            auth_token: auth_token.into(),
        };
        if let Ok(mut slot) = self.credentials.write() {
            *slot = Some(creds);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.credentials.write() {
            *slot = None;
        }
    }
}

impl SessionProvider for MemorySession {
    fn user_id(&self) -> Option<String> {
        self.credentials
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.user_id.clone()))
    }

    fn auth_token(&self) -> Option<String> {
        self.credentials
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|c| c.auth_token.clone()))
    }
}

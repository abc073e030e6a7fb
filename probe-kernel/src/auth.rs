/**
 * AUTH - Identifiant admin unique + sessions en mémoire
 *
 * RÔLE :
 * - CredentialStore : collaborateur injecté (verify/update) qui détient le hash argon2
 * - SessionStore : jetons opaques (UUID v4) créés au login, détruits au logout
 *   ou au redémarrage du process (aucune persistance)
 */

use crate::config::AdminConf;
use crate::state::{new_state, Shared};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthError {
    #[error("authentication required")]
    MissingSession,
    #[error("session expired or invalid")]
    InvalidSession,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("new passwords do not match")]
    PasswordMismatch,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Hash argon2id au format PHC, sel aléatoire à chaque appel.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Paramètres argon2 minimaux pour les tests ; la vérification relit les paramètres du PHC.
#[cfg(test)]
pub(crate) fn cheap_hash(password: &str) -> String {
    use argon2::{Algorithm, Params, Version};
    let params = Params::new(1024, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn verify_hash(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            error!("[auth] stored hash unreadable: {e}");
            false
        }
    }
}

pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
    fn update(&self, username: &str, new_hash: String) -> Result<(), AuthError>;
}

/// Implémentation par défaut : hashes en mémoire, initialisés depuis la config.
pub struct InMemoryCredentials {
    hashes: Shared<HashMap<String, String>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self { hashes: new_state(HashMap::new()) }
    }

    pub fn with_user(self, username: &str, phc_hash: String) -> Self {
        self.hashes.lock().insert(username.to_string(), phc_hash);
        self
    }

    pub fn from_config(admin: &AdminConf) -> Result<Self, AuthError> {
        let store = Self::new();
        if let Some(plain) = &admin.password_plain {
            info!("[auth] admin password taken from PROBE_ADMIN_PASSWORD");
            return Ok(store.with_user(&admin.username, hash_password(plain)?));
        }
        match &admin.password_hash {
            Some(phc) => {
                PasswordHash::new(phc).map_err(|e| AuthError::Hash(e.to_string()))?;
                Ok(store.with_user(&admin.username, phc.clone()))
            }
            None => {
                error!("SECURITY: no admin credential configured - dashboard login disabled");
                Ok(store)
            }
        }
    }
}

impl Default for InMemoryCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let stored = self.hashes.lock().get(username).cloned();
        stored.is_some_and(|phc| verify_hash(password, &phc))
    }

    fn update(&self, username: &str, new_hash: String) -> Result<(), AuthError> {
        let mut hashes = self.hashes.lock();
        match hashes.get_mut(username) {
            Some(slot) => {
                *slot = new_hash;
                Ok(())
            }
            None => Err(AuthError::UnknownUser(username.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Shared<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let session = Session { username: username.to_string(), created_at: OffsetDateTime::now_utc() };
        self.sessions.lock().insert(token.clone(), session);
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().get(token).cloned()
    }

    pub fn destroy(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[derive(Clone)]
pub struct Auth {
    credentials: Arc<dyn CredentialStore>,
    sessions: SessionStore,
}

impl Auth {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials, sessions: SessionStore::default() }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if !self.credentials.verify(username, password) {
            warn!(user = %username, "[auth] login refused");
            return Err(AuthError::InvalidCredentials);
        }
        info!(user = %username, "[auth] login");
        Ok(self.sessions.create(username))
    }

    pub fn session(&self, token: Option<&str>) -> Result<Session, AuthError> {
        let token = token.ok_or(AuthError::MissingSession)?;
        self.sessions.get(token).ok_or(AuthError::InvalidSession)
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.destroy(token)
    }

    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        if new_password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }
        if !self.credentials.verify(username, old_password) {
            warn!(user = %username, "[auth] password change refused: wrong old password");
            return Err(AuthError::InvalidCredentials);
        }
        self.credentials.update(username, hash_password(new_password)?)?;
        info!(user = %username, "[auth] password changed");
        Ok(())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

//! Identity provider contract and an in-memory account directory.
//!
//! Sign-in yields a [`Principal`]: the stable identity the rest of the
//! system keys on. Profile data (role, avatar) is not the identity
//! provider's business; it lives in the document store's `users`
//! collection.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user identifier, also the profile document id.
    pub user_id: String,
    /// Sign-in email address.
    pub email: String,
    /// Name supplied at sign-up.
    pub display_name: String,
}

/// Whether anyone is currently signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active session.
    #[default]
    SignedOut,
    /// A principal holds the session.
    SignedIn(Principal),
}

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("invalid credentials for {email}")]
    InvalidCredentials {
        /// Email that attempted to sign in.
        email: String,
    },
    /// Sign-up attempted with an email that already has an account.
    #[error("an account already exists for {email}")]
    EmailTaken {
        /// Email that attempted to sign up.
        email: String,
    },
}

/// Authentication service the session layer is written against.
pub trait IdentityProvider: Send + Sync {
    /// Authenticates an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or a
    /// wrong password.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send;

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmailTaken`] when the email already has an
    /// account.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send;

    /// Ends the current session. Signing out with no session is a no-op.
    fn sign_out(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Watch stream of session changes. The current state is observable
    /// immediately; every sign-in and sign-out updates it.
    fn session_changes(&self) -> watch::Receiver<SessionState>;
}

/// One registered account.
#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
    display_name: String,
}

/// In-memory [`IdentityProvider`] for tests and the demo binary.
///
/// Holds credentials in plain text; it stands in for a managed auth
/// service and is not a credential store.
#[derive(Debug)]
pub struct MemoryIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    session_tx: watch::Sender<SessionState>,
}

impl MemoryIdentity {
    /// Creates an empty directory with no active session.
    #[must_use]
    pub fn new() -> Self {
        let (session_tx, _) = watch::channel(SessionState::SignedOut);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session_tx,
        }
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for MemoryIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let accounts = self.accounts.lock();
        let Some(account) = accounts.get(email) else {
            return Err(AuthError::InvalidCredentials {
                email: email.to_string(),
            });
        };
        if account.password != password {
            return Err(AuthError::InvalidCredentials {
                email: email.to_string(),
            });
        }
        let principal = Principal {
            user_id: account.user_id.clone(),
            email: email.to_string(),
            display_name: account.display_name.clone(),
        };
        drop(accounts);

        tracing::debug!(email, user_id = %principal.user_id, "signed in");
        self.session_tx
            .send_replace(SessionState::SignedIn(principal.clone()));
        Ok(principal)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Principal, AuthError> {
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(email) {
            return Err(AuthError::EmailTaken {
                email: email.to_string(),
            });
        }
        let account = Account {
            user_id: Uuid::now_v7().to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
        };
        let principal = Principal {
            user_id: account.user_id.clone(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        accounts.insert(email.to_string(), account);
        drop(accounts);

        tracing::debug!(email, user_id = %principal.user_id, "account created");
        self.session_tx
            .send_replace(SessionState::SignedIn(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) {
        tracing::debug!("signed out");
        self.session_tx.send_replace(SessionState::SignedOut);
    }

    fn session_changes(&self) -> watch::Receiver<SessionState> {
        self.session_tx.subscribe()
    }
}

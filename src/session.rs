use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::api::ScoreApi;
use crate::error::ApiError;
use crate::models::{Credential, User};
use crate::token_store::TokenStore;

/// The client's current belief about who is signed in.
///
/// `user.is_some()` implies `token.is_some()`. `initializing` starts true and
/// drops to false once, when the startup identity check has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    pub initializing: bool,
}

impl Session {
    fn cold() -> Self {
        Self {
            token: None,
            user: None,
            initializing: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }
}

struct SessionCell {
    session: Session,
    // Bumped by every login/logout so a slow identity check can tell it lost the race.
    epoch: u64,
}

/// Owner of the session. Built once by the application root and shared by
/// `Arc`; every mutation goes through `initialize`, `login` or `logout`.
pub struct SessionStore {
    api: Arc<dyn ScoreApi>,
    tokens: Arc<dyn TokenStore>,
    cell: RwLock<SessionCell>,
    started: AtomicBool,
}

impl SessionStore {
    pub fn new(api: Arc<dyn ScoreApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            cell: RwLock::new(SessionCell {
                session: Session::cold(),
                epoch: 0,
            }),
            started: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> Arc<dyn ScoreApi> {
        self.api.clone()
    }

    /// Resumes a persisted session, if any. Only the first call does work.
    pub fn initialize(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("session already initialized");
            return;
        }
        let _finish = FinishInit { store: self };

        // Taken before the token is read so a login or logout racing the load is seen.
        let epoch = self.read().epoch;
        let Some(token) = self.tokens.load() else {
            info!("no persisted session token");
            return;
        };

        {
            let mut cell = self.write();
            if cell.epoch != epoch || cell.session.token.is_some() {
                debug!("session changed before startup check, skipping it");
                return;
            }
            cell.session.token = Some(token.clone());
        }

        let checked = self.api.me(&token);

        let mut cell = self.write();
        if cell.epoch != epoch {
            debug!("session changed during identity check, discarding result");
            return;
        }
        match checked {
            Ok(user) => {
                info!(user = %user.username, admin = user.is_admin, "session resumed");
                cell.session.user = Some(user);
            }
            Err(err) => {
                info!("persisted session rejected: {err}");
                cell.session.token = None;
                cell.session.user = None;
                if let Err(err) = self.tokens.clear() {
                    warn!("failed to remove persisted token: {err:#}");
                }
            }
        }
    }

    /// Exchanges credentials for a session. On failure nothing is written.
    pub fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let credential = Credential::new(username, password);
        let reply = self.api.login(&credential).map_err(|err| {
            warn!(username, "login failed: {err}");
            err.into_auth()
        })?;

        let mut cell = self.write();
        if let Err(err) = self.tokens.save(&reply.token) {
            warn!("failed to persist session token: {err:#}");
        }
        cell.session.token = Some(reply.token);
        cell.session.user = Some(reply.user.clone());
        cell.epoch += 1;
        info!(user = %reply.user.username, admin = reply.user.is_admin, "logged in");
        Ok(reply.user)
    }

    /// Drops the session locally. Never talks to the controller.
    pub fn logout(&self) {
        let mut cell = self.write();
        let had_session = cell.session.token.is_some() || cell.session.user.is_some();
        cell.session.token = None;
        cell.session.user = None;
        cell.epoch += 1;
        if had_session {
            info!("logged out");
        }
        if let Err(err) = self.tokens.clear() {
            warn!("failed to remove persisted token: {err:#}");
        }
    }

    pub fn snapshot(&self) -> Session {
        self.read().session.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().session.token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().session.user.clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.read().session.initializing
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionCell> {
        self.cell.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionCell> {
        self.cell.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `initializing` when the startup path exits, however it exits.
struct FinishInit<'a> {
    store: &'a SessionStore,
}

impl Drop for FinishInit<'_> {
    fn drop(&mut self) {
        let mut cell = self.store.write();
        if cell.session.initializing {
            cell.session.initializing = false;
            debug!(
                authenticated = cell.session.user.is_some(),
                "session initialization finished"
            );
        }
    }
}

//! Explicit session and navigation context handed to view controllers.

use std::sync::{Arc, PoisonError, RwLock};

use shared::{
    domain::{Role, UserId},
    protocol::UserSummary,
};
use tracing::info;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserSummary,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard(Role),
    Leads,
    PendingConversions,
    Clients,
    Tasks,
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that goes nowhere.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: Route) {}
}

pub struct SessionContext {
    session: RwLock<Option<Session>>,
    navigator: Arc<dyn Navigator>,
}

impl SessionContext {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session: RwLock::new(None),
            navigator,
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|session| session.token)
    }

    pub fn sign_in(&self, session: Session) {
        let role = session.role();
        info!(user_id = session.user_id().0, %role, "signed in");
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.navigator.navigate(Route::Dashboard(role));
    }

    pub fn sign_out(&self) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.navigator.navigate(Route::Login);
    }

    pub fn go(&self, route: Route) -> Result<(), CoreError> {
        let Some(session) = self.current() else {
            self.navigator.navigate(Route::Login);
            return Err(CoreError::Unauthorized("not signed in".to_string()));
        };
        if route == Route::PendingConversions && !session.role().is_manager_or_admin() {
            return Err(CoreError::Forbidden(
                "conversion review is for managers".to_string(),
            ));
        }
        self.navigator.navigate(route);
        Ok(())
    }

    /// Hook for errors surfaced by the core. An invalid session ends it and
    /// sends the user to the login screen; everything else passes through.
    pub fn observe<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                self.sign_out();
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

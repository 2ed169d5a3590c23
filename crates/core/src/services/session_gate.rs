use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::session::Session;
use crate::providers::traits::IdentityGateway;

/// The three screens of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Unauthenticated entry point
    Login,
    Register,
    /// Transaction list and balance; requires a session
    Ledger,
}

impl View {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            View::Login => "/",
            View::Register => "/register",
            View::Ledger => "/transactions",
        }
    }

    /// Match a request path, ignoring any query string, fragment or
    /// trailing slash.
    #[must_use]
    pub fn from_path(path: &str) -> Option<View> {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(View::Login),
            "/register" => Some(View::Register),
            "/transactions" => Some(View::Ledger),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, View::Ledger)
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// What the navigation layer should do for a requested view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Show the view. Protected views always carry the session they were
    /// granted with.
    Render {
        view: View,
        session: Option<Session>,
    },
    /// Go to another view instead, without rendering or fetching anything.
    Redirect(View),
}

/// Decides, each time a protected view is entered, whether a session exists.
///
/// The gateway is asked at the moment of the check; nothing is cached, so
/// a session that ends mid-view is only noticed at the next check or when
/// the store rejects a call.
pub struct SessionGate {
    identity: Arc<dyn IdentityGateway>,
}

impl SessionGate {
    pub fn new(identity: Arc<dyn IdentityGateway>) -> Self {
        Self { identity }
    }

    /// The current session, if any.
    #[must_use]
    pub fn check(&self) -> Option<Session> {
        self.identity.current_session()
    }

    /// The current session, or `Unauthorized`.
    pub fn require(&self) -> Result<Session, CoreError> {
        self.check().ok_or(CoreError::Unauthorized)
    }

    #[must_use]
    pub fn guard(&self, view: View) -> RouteDecision {
        if !view.is_protected() {
            return RouteDecision::Render {
                view,
                session: None,
            };
        }
        match self.check() {
            Some(session) => RouteDecision::Render {
                view,
                session: Some(session),
            },
            None => {
                tracing::debug!(%view, "no session, redirecting to login");
                RouteDecision::Redirect(View::Login)
            }
        }
    }

    /// Guard a raw path. Unknown paths go to the login view.
    #[must_use]
    pub fn route(&self, path: &str) -> RouteDecision {
        match View::from_path(path) {
            Some(view) => self.guard(view),
            None => RouteDecision::Redirect(View::Login),
        }
    }
}

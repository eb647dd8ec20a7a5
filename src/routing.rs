//! Route gating: which pages need a session, and a debounced guard that
//! re-evaluates the decision on every navigation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::session::{AuthStatus, SessionGate};

pub const SIGN_IN_ROUTE: &str = "/signin";
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Sign-in URL that returns the user to `return_to` afterwards.
pub fn sign_in_redirect(return_to: &str) -> String {
    format!("{}?redirect={}", SIGN_IN_ROUTE, urlencoding::encode(return_to))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToSignIn { return_to: String },
    RedirectToDashboard,
}

impl RouteDecision {
    /// Where to navigate, or `None` to stay.
    pub fn target(&self) -> Option<String> {
        match self {
            RouteDecision::Allow => None,
            RouteDecision::RedirectToSignIn { return_to } => Some(sign_in_redirect(return_to)),
            RouteDecision::RedirectToDashboard => Some(DASHBOARD_ROUTE.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    public_routes: Vec<String>,
    public_prefixes: Vec<String>,
    auth_only_routes: Vec<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            public_routes: ["/", "/signin", "/signup", "/verify-email", "/templates"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            public_prefixes: vec!["/portfolio/".to_string()],
            auth_only_routes: ["/signin", "/signup", "/verify-email"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RoutePolicy {
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public_routes.iter().any(|r| r == path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn is_auth_only(&self, path: &str) -> bool {
        let path = normalize(path);
        self.auth_only_routes.iter().any(|r| r == path)
    }

    /// An unconfirmed token counts as signed out.
    pub fn decide(&self, path: &str, status: AuthStatus) -> RouteDecision {
        let authenticated = status == AuthStatus::Authenticated;
        if authenticated && self.is_auth_only(path) {
            RouteDecision::RedirectToDashboard
        } else if authenticated || self.is_public(path) {
            RouteDecision::Allow
        } else {
            RouteDecision::RedirectToSignIn {
                return_to: path.to_string(),
            }
        }
    }
}

/// Strip query, fragment and a trailing slash.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Page-level guard around a [`SessionGate`].
pub struct NavigationGuard {
    gate: Arc<SessionGate>,
    policy: RoutePolicy,
    debounce: Duration,
    initial_check: OnceCell<bool>,
    generation: AtomicU64,
}

impl NavigationGuard {
    pub fn new(gate: Arc<SessionGate>, policy: RoutePolicy, debounce: Duration) -> Self {
        Self {
            gate,
            policy,
            debounce,
            initial_check: OnceCell::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Decide for `path` once the session has settled.
    ///
    /// Returns `None` when a later route change superseded this one inside
    /// the debounce window.
    pub async fn on_route_change(&self, path: &str) -> Option<RouteDecision> {
        let verified = *self
            .initial_check
            .get_or_init(|| async { self.gate.check_auth_state().await })
            .await;

        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::trace!(path = %path, "route change superseded");
            return None;
        }

        let status = self.gate.status().await;
        let decision = self.policy.decide(path, status);
        tracing::debug!(path = %path, verified, ?status, ?decision, "route decision");
        Some(decision)
    }
}

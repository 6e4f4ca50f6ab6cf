//! Route guard: gates a view on the session state and an optional capability.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::rbac::{Capability, Role};
use crate::session::{LoadState, SessionState};

pub const LOGIN_ROUTE: &str = "/login";
pub const UNAUTHORIZED_ROUTE: &str = "/unauthorized";

/// Moves the user somewhere else: an in-app route or an absolute URL.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Login,
    Unauthorized,
}

impl Redirect {
    pub fn route(self) -> &'static str {
        match self {
            Redirect::Login => LOGIN_ROUTE,
            Redirect::Unauthorized => UNAUTHORIZED_ROUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still resolving: show a placeholder, do not navigate.
    Wait,
    Redirect(Redirect),
    Render,
}

/// Result of one evaluation. `navigate` is set only when the decision is a
/// redirect and the resolved inputs differ from the last resolved evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOutcome {
    pub decision: GuardDecision,
    pub navigate: Option<Redirect>,
}

/// What a resolved decision depends on. Loading states are not recorded, so a
/// round trip through `Loading` back to the same state does not redirect again.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GuardInputs {
    user: Option<(String, Role)>,
    required: Option<Capability>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    required: Option<Capability>,
    last: Option<GuardInputs>,
}

impl RouteGuard {
    pub fn new(required: Option<Capability>) -> Self {
        Self {
            required,
            last: None,
        }
    }

    pub fn requiring(capability: impl Into<Capability>) -> Self {
        Self::new(Some(capability.into()))
    }

    pub fn required(&self) -> Option<Capability> {
        self.required
    }

    pub fn set_required(&mut self, required: Option<Capability>) {
        self.required = required;
    }

    /// Pure decision for one state.
    pub fn decide(required: Option<Capability>, state: &SessionState) -> GuardDecision {
        if state.load != LoadState::Resolved {
            return GuardDecision::Wait;
        }
        match (&state.user, required) {
            (None, _) => GuardDecision::Redirect(Redirect::Login),
            (Some(user), Some(cap)) if !cap.allows(user.role) => {
                GuardDecision::Redirect(Redirect::Unauthorized)
            }
            (Some(_), _) => GuardDecision::Render,
        }
    }

    /// Evaluate on every render; redirects fire once per distinct resolved state.
    pub fn evaluate(&mut self, state: &SessionState) -> GuardOutcome {
        let decision = Self::decide(self.required, state);
        if decision == GuardDecision::Wait {
            return GuardOutcome {
                decision,
                navigate: None,
            };
        }
        let inputs = GuardInputs {
            user: state.user.as_ref().map(|u| (u.id.clone(), u.role)),
            required: self.required,
        };
        let changed = self.last.as_ref() != Some(&inputs);
        self.last = Some(inputs);

        let navigate = match decision {
            GuardDecision::Redirect(r) if changed => Some(r),
            _ => None,
        };
        GuardOutcome { decision, navigate }
    }

    /// Follow the session until the store goes away, navigating on redirects.
    pub async fn run(mut self, mut states: watch::Receiver<SessionState>, navigator: Arc<dyn Navigator>) {
        loop {
            let state = states.borrow_and_update().clone();
            let outcome = self.evaluate(&state);
            debug!(decision = ?outcome.decision, "Route guard evaluated");
            if let Some(redirect) = outcome.navigate {
                navigator.navigate(redirect.route());
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::rbac::Permission;
    use crate::session::testing;

    fn resolved(role: Option<Role>) -> SessionState {
        SessionState {
            load: LoadState::Resolved,
            user: role.map(testing::user),
        }
    }

    #[test]
    fn waits_while_loading() {
        let loading = SessionState {
            load: LoadState::Loading,
            user: None,
        };
        assert_eq!(RouteGuard::decide(None, &loading), GuardDecision::Wait);
        assert_eq!(
            RouteGuard::decide(None, &SessionState::default()),
            GuardDecision::Wait
        );
    }

    #[test]
    fn decisions_for_resolved_states() {
        let admin_only = Some(Capability::Role(Role::Admin));
        assert_eq!(
            RouteGuard::decide(admin_only, &resolved(None)),
            GuardDecision::Redirect(Redirect::Login)
        );
        assert_eq!(
            RouteGuard::decide(admin_only, &resolved(Some(Role::User))),
            GuardDecision::Redirect(Redirect::Unauthorized)
        );
        assert_eq!(
            RouteGuard::decide(admin_only, &resolved(Some(Role::Admin))),
            GuardDecision::Render
        );
        assert_eq!(
            RouteGuard::decide(None, &resolved(Some(Role::Viewer))),
            GuardDecision::Render
        );
        assert_eq!(
            RouteGuard::decide(
                Some(Permission::CreateDataset.into()),
                &resolved(Some(Role::Viewer))
            ),
            GuardDecision::Redirect(Redirect::Unauthorized)
        );
    }

    #[test]
    fn redirects_once_per_state_change() {
        let mut guard = RouteGuard::requiring("admin".parse::<Capability>().unwrap());
        let user = resolved(Some(Role::User));

        let first = guard.evaluate(&user);
        assert_eq!(first.navigate, Some(Redirect::Unauthorized));
        for _ in 0..3 {
            let again = guard.evaluate(&user);
            assert_eq!(again.decision, GuardDecision::Redirect(Redirect::Unauthorized));
            assert_eq!(again.navigate, None);
        }

        // Logout is a new state: one more redirect, to login this time.
        assert_eq!(guard.evaluate(&resolved(None)).navigate, Some(Redirect::Login));
        assert_eq!(guard.evaluate(&resolved(None)).navigate, None);
    }

    #[test]
    fn failed_login_does_not_redirect_twice() {
        let mut guard = RouteGuard::requiring(Role::User);
        let loading = SessionState {
            load: LoadState::Loading,
            user: None,
        };

        assert_eq!(guard.evaluate(&resolved(None)).navigate, Some(Redirect::Login));
        // login attempt: Loading, then rejected back to no user
        let pending = guard.evaluate(&loading);
        assert_eq!(pending.decision, GuardDecision::Wait);
        assert_eq!(pending.navigate, None);
        let rejected = guard.evaluate(&resolved(None));
        assert_eq!(rejected.decision, GuardDecision::Redirect(Redirect::Login));
        assert_eq!(rejected.navigate, None);

        // a real change still redirects
        guard.evaluate(&loading);
        assert_eq!(
            guard.evaluate(&resolved(Some(Role::Viewer))).navigate,
            Some(Redirect::Unauthorized)
        );
    }

    #[test]
    fn changing_the_requirement_re_evaluates() {
        let mut guard = RouteGuard::new(None);
        let viewer = resolved(Some(Role::Viewer));
        assert_eq!(guard.evaluate(&viewer).decision, GuardDecision::Render);

        guard.set_required(Some(Permission::StartTraining.into()));
        assert_eq!(
            guard.evaluate(&viewer).navigate,
            Some(Redirect::Unauthorized)
        );
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Navigator for Recorder {
        fn navigate(&self, target: &str) {
            self.0.lock().unwrap().push(target.to_string());
        }
    }

    #[tokio::test]
    async fn follows_the_session_store() {
        let (store, _) = testing::store();
        let store = Arc::new(store);
        let recorder = Arc::new(Recorder::default());

        let guard = RouteGuard::requiring(Role::Admin);
        let task = tokio::spawn(guard.run(store.subscribe(), recorder.clone()));

        store.init().await;
        tokio::task::yield_now().await;
        store.login("user", "secret").await.unwrap();
        tokio::task::yield_now().await;
        store.login("admin", "secret").await.unwrap();
        tokio::task::yield_now().await;

        drop(store);
        task.await.unwrap();

        let visited = recorder.0.lock().unwrap().clone();
        assert_eq!(visited.first().map(String::as_str), Some(LOGIN_ROUTE));
        assert_eq!(
            visited.iter().filter(|r| *r == UNAUTHORIZED_ROUTE).count(),
            1
        );
    }
}

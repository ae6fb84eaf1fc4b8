use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Home,
    Admin,
    Details,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Home => "/",
            Route::Admin => "/admin",
            Route::Details => "/details",
        }
    }

    /// `None` for routes anyone may open.
    pub fn required_role(self) -> Option<RequiredRole> {
        match self {
            Route::Login => None,
            Route::Home | Route::Details => Some(RequiredRole::Authenticated),
            Route::Admin => Some(RequiredRole::Admin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredRole {
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still resolving; show a neutral placeholder.
    Loading,
    Render,
    Redirect(Route),
}

pub fn decide(session: &Session, required: RequiredRole) -> GuardDecision {
    if session.initializing {
        return GuardDecision::Loading;
    }
    let Some(user) = session.user.as_ref() else {
        return GuardDecision::Redirect(Route::Login);
    };
    if required == RequiredRole::Admin && !user.is_admin {
        return GuardDecision::Redirect(Route::Home);
    }
    GuardDecision::Render
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOutcome {
    pub decision: GuardDecision,
    /// Set only on the evaluation that entered the failing state.
    pub redirect: Option<Route>,
}

/// Per-view guard. Remembers whether it already redirected so repeated
/// evaluations of the same failing state do not redirect again.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    required: RequiredRole,
    redirected_to: Option<Route>,
}

impl AccessGuard {
    pub fn new(required: RequiredRole) -> Self {
        Self {
            required,
            redirected_to: None,
        }
    }

    pub fn for_route(route: Route) -> Option<Self> {
        route.required_role().map(Self::new)
    }

    pub fn required(&self) -> RequiredRole {
        self.required
    }

    pub fn evaluate(&mut self, session: &Session) -> GuardOutcome {
        let decision = decide(session, self.required);
        let redirect = match decision {
            GuardDecision::Redirect(target) => {
                if self.redirected_to == Some(target) {
                    None
                } else {
                    self.redirected_to = Some(target);
                    Some(target)
                }
            }
            GuardDecision::Render => {
                self.redirected_to = None;
                None
            }
            GuardDecision::Loading => None,
        };
        GuardOutcome { decision, redirect }
    }
}

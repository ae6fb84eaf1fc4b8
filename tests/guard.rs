use ioc_scoreboard::guard::{AccessGuard, GuardDecision, RequiredRole, Route, decide};
use ioc_scoreboard::session::Session;
use ioc_scoreboard::models::User;

fn user(admin: bool) -> User {
    User {
        id: if admin { 1 } else { 2 },
        username: if admin { "admin" } else { "blue1" }.to_string(),
        is_admin: admin,
        is_blue_team: !admin,
        blue_team_number: (!admin).then_some(1),
    }
}

fn session(initializing: bool, who: Option<User>) -> Session {
    Session {
        token: who.as_ref().map(|_| "tok".to_string()),
        user: who,
        initializing,
    }
}

#[test]
fn never_redirects_while_initializing() {
    let states = [
        session(true, None),
        session(true, Some(user(false))),
        session(true, Some(user(true))),
        Session {
            token: Some("tok".to_string()),
            user: None,
            initializing: true,
        },
    ];
    for state in &states {
        for role in [RequiredRole::Authenticated, RequiredRole::Admin] {
            assert_eq!(decide(state, role), GuardDecision::Loading);
            let mut guard = AccessGuard::new(role);
            let outcome = guard.evaluate(state);
            assert_eq!(outcome.decision, GuardDecision::Loading);
            assert!(outcome.redirect.is_none());
        }
    }
}

#[test]
fn decisions_after_initialization() {
    let anon = session(false, None);
    let member = session(false, Some(user(false)));
    let admin = session(false, Some(user(true)));

    assert_eq!(
        decide(&anon, RequiredRole::Authenticated),
        GuardDecision::Redirect(Route::Login)
    );
    assert_eq!(
        decide(&anon, RequiredRole::Admin),
        GuardDecision::Redirect(Route::Login)
    );
    assert_eq!(
        decide(&member, RequiredRole::Authenticated),
        GuardDecision::Render
    );
    assert_eq!(
        decide(&member, RequiredRole::Admin),
        GuardDecision::Redirect(Route::Home)
    );
    assert_eq!(decide(&admin, RequiredRole::Admin), GuardDecision::Render);
    assert_eq!(
        decide(&admin, RequiredRole::Authenticated),
        GuardDecision::Render
    );
}

#[test]
fn redirects_once_per_transition() {
    let mut guard = AccessGuard::new(RequiredRole::Admin);

    let anon = session(false, None);
    assert_eq!(guard.evaluate(&anon).redirect, Some(Route::Login));
    assert_eq!(guard.evaluate(&anon).redirect, None);
    assert_eq!(
        guard.evaluate(&anon).decision,
        GuardDecision::Redirect(Route::Login)
    );

    let member = session(false, Some(user(false)));
    assert_eq!(guard.evaluate(&member).redirect, Some(Route::Home));
    assert_eq!(guard.evaluate(&member).redirect, None);

    let admin = session(false, Some(user(true)));
    let outcome = guard.evaluate(&admin);
    assert_eq!(outcome.decision, GuardDecision::Render);
    assert!(outcome.redirect.is_none());

    assert_eq!(guard.evaluate(&anon).redirect, Some(Route::Login));
}

#[test]
fn routes_map_to_required_roles() {
    assert!(AccessGuard::for_route(Route::Login).is_none());
    assert_eq!(
        AccessGuard::for_route(Route::Home).map(|g| g.required()),
        Some(RequiredRole::Authenticated)
    );
    assert_eq!(
        AccessGuard::for_route(Route::Details).map(|g| g.required()),
        Some(RequiredRole::Authenticated)
    );
    assert_eq!(
        AccessGuard::for_route(Route::Admin).map(|g| g.required()),
        Some(RequiredRole::Admin)
    );
    assert_eq!(Route::Login.path(), "/login");
}

use ioc_scoreboard::guard::Route;
use ioc_scoreboard::models::{ActionReply, AdminAction, ManagedUser, User};
use ioc_scoreboard::op::Op;
use ioc_scoreboard::orchestrator::Invocation;
use ioc_scoreboard::state::{AdminFocus, AppState, Delta, Screen, apply_delta, parse_new_user};

fn admin() -> User {
    User {
        id: 1,
        username: "admin".to_string(),
        is_admin: true,
        is_blue_team: false,
        blue_team_number: None,
    }
}

fn managed(id: i64, name: &str) -> ManagedUser {
    ManagedUser {
        user_id: id,
        username: name.to_string(),
        is_admin: false,
        is_blue_team: true,
        blue_team_num: Some(1),
    }
}

#[test]
fn login_redirect_returns_to_requested_screen() {
    let mut state = AppState::new();
    state.screen = Screen::Admin;
    state.redirect(Route::Login);
    assert_eq!(state.screen, Screen::Login);
    assert_eq!(state.return_to, Some(Screen::Admin));

    state.login.username = "admin".to_string();
    state.login.password = "admin".to_string();
    state.login.submitting = true;
    apply_delta(&mut state, Delta::LoginFinished(Ok(admin())));

    assert_eq!(state.screen, Screen::Admin);
    assert!(state.return_to.is_none());
    assert!(state.login.password.is_empty());
    assert!(!state.login.submitting);
    assert_eq!(state.logs.back().map(String::as_str), Some("[INFO] Logged in as admin"));
}

#[test]
fn failed_login_stays_on_form_with_error() {
    let mut state = AppState::new();
    state.redirect(Route::Login);
    state.login.submitting = true;
    state.login.password = "nope".to_string();

    apply_delta(
        &mut state,
        Delta::LoginFinished(Err("authentication failed: Invalid credentials".to_string())),
    );

    assert_eq!(state.screen, Screen::Login);
    assert_eq!(
        state.login.error.as_deref(),
        Some("authentication failed: Invalid credentials")
    );
    assert!(state.login.password.is_empty());
    assert!(!state.login.submitting);
}

#[test]
fn admin_redirect_lands_on_scoreboard_with_warning() {
    let mut state = AppState::new();
    state.screen = Screen::Admin;
    state.redirect(Route::Home);
    assert_eq!(state.screen, Screen::Scoreboard);
    assert_eq!(state.logs.back().map(String::as_str), Some("[WARN] Admin access required"));
}

#[test]
fn action_outcomes_are_logged() {
    let mut state = AppState::new();

    apply_delta(
        &mut state,
        Delta::ActionFinished {
            action: AdminAction::RunChecks,
            outcome: Invocation::Succeeded(ActionReply {
                status: "success".to_string(),
                message: "Check cycle initiated".to_string(),
                details: Default::default(),
            }),
        },
    );
    apply_delta(
        &mut state,
        Delta::ActionFinished {
            action: AdminAction::ResetData,
            outcome: Invocation::Failed(
                "Reset data failed: Cannot reset data while competition is running".to_string(),
            ),
        },
    );
    apply_delta(
        &mut state,
        Delta::ActionFinished {
            action: AdminAction::StopCompetition,
            outcome: Invocation::Skipped,
        },
    );

    let logs: Vec<&str> = state.logs.iter().map(String::as_str).collect();
    assert_eq!(
        logs,
        vec![
            "[INFO] Checks run (Check cycle initiated)",
            "[WARN] Reset data failed: Cannot reset data while competition is running",
            "[INFO] Stop competition ignored: another action is still running",
        ]
    );
}

#[test]
fn user_list_updates_clamp_selection() {
    let mut state = AppState::new();
    state.screen = Screen::Admin;
    state.admin_focus = AdminFocus::Users;

    apply_delta(
        &mut state,
        Delta::SetUsers(Ok(vec![managed(2, "blue1"), managed(3, "blue2"), managed(4, "blue3")])),
    );
    state.admin_next();
    state.admin_next();
    state.admin_next();
    assert_eq!(state.users_selected, 2);
    assert_eq!(state.selected_user().map(|u| u.user_id), Some(4));

    apply_delta(&mut state, Delta::SetUsers(Ok(vec![managed(2, "blue1")])));
    assert_eq!(state.users_selected, 0);

    apply_delta(&mut state, Delta::SetUsers(Err("Get users failed: Invalid token".to_string())));
    assert_eq!(
        state.users,
        Op::Failure("Get users failed: Invalid token".to_string())
    );
    assert!(state.selected_user().is_none());
}

#[test]
fn action_selection_stays_in_bounds() {
    let mut state = AppState::new();
    for _ in 0..10 {
        state.admin_next();
    }
    assert_eq!(state.selected_action(), AdminAction::RunChecks);
    for _ in 0..10 {
        state.admin_prev();
    }
    assert_eq!(state.selected_action(), AdminAction::StartCompetition);
}

#[test]
fn console_keeps_latest_entries() {
    let mut state = AppState::new();
    for idx in 0..250 {
        apply_delta(&mut state, Delta::Log(format!("[INFO] entry {idx}")));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("[INFO] entry 50"));
}

#[test]
fn parses_add_user_prompt() {
    let user = parse_new_user("12 blue4 s3cret blue=4").expect("valid line");
    assert_eq!(user.user_id, 12);
    assert_eq!(user.username, "blue4");
    assert!(user.is_blue_team);
    assert_eq!(user.blue_team_num, Some(4));
    assert!(!user.is_admin);

    let admin = parse_new_user("13 ops pw admin").expect("valid line");
    assert!(admin.is_admin);
    assert_eq!(admin.blue_team_num, None);

    assert!(parse_new_user("x name pw").is_err());
    assert!(parse_new_user("14 name").is_err());
    assert!(parse_new_user("14 name pw blue=x").is_err());
    assert!(parse_new_user("14 name pw root").is_err());
}

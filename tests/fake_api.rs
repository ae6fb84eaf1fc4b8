use ioc_scoreboard::api::ScoreApi;
use ioc_scoreboard::error::ApiError;
use ioc_scoreboard::fake_api::FakeApi;
use ioc_scoreboard::models::{AdminAction, CompetitionPhase, Credential, NewUser};

fn login(api: &FakeApi, username: &str, password: &str) -> String {
    api.login(&Credential::new(username, password))
        .expect("login should succeed")
        .token
}

#[test]
fn admin_endpoints_reject_non_admins() {
    let api = FakeApi::seeded();
    let blue = login(&api, "blue1", "blue");

    let err = api.system_status(Some(&blue)).expect_err("not an admin");
    assert_eq!(err, ApiError::Action("Get status failed: Admin access required".to_string()));

    let err = api.users(None).expect_err("no token");
    assert_eq!(err, ApiError::Action("Get users failed: Invalid token".to_string()));

    let err = api
        .run_action(AdminAction::StartCompetition, Some("forged"))
        .expect_err("forged token");
    assert!(err.to_string().starts_with("Start competition failed"));
}

#[test]
fn competition_lifecycle_follows_controller_rules() {
    let api = FakeApi::seeded();
    let token = login(&api, "admin", "admin");
    let token = Some(token.as_str());

    api.run_action(AdminAction::DeployIocs, token).expect("deploy before start");
    let err = api.run_action(AdminAction::RunChecks, token).expect_err("not running");
    assert!(err.to_string().contains("Cannot run checks in state: Not started"));

    api.run_action(AdminAction::StartCompetition, token).expect("start");
    assert_eq!(api.phase(), CompetitionPhase::Running);
    assert!(api.run_action(AdminAction::ResetData, token).is_err());
    assert!(api.run_action(AdminAction::DeployIocs, token).is_err());

    api.run_action(AdminAction::RunChecks, token).expect("run checks");
    let status = api.system_status(token).expect("status");
    assert_eq!(status.total_checks_run(), Some(1));
    assert!(status.last_check_time().is_some());

    let scoreboard = api.scoreboard().expect("scoreboard");
    assert_eq!(scoreboard.teams.len(), 3);
    for team in &scoreboard.teams {
        assert_eq!(team.total_score, team.last_check_delta);
        assert!(team.last_check_at.is_some());
    }
    let details = api.team_details(2, token).expect("details");
    assert_eq!(details.len(), 4);
    assert!(details.iter().all(|row| row.team_number == 2));
    assert!(details.iter().all(|row| row.passed() == (row.points > 0)));

    api.run_action(AdminAction::StopCompetition, token).expect("stop");
    api.run_action(AdminAction::ResetData, token).expect("reset");
    assert_eq!(api.phase(), CompetitionPhase::NotStarted);
    assert!(api.scoreboard().expect("scoreboard").teams.iter().all(|t| t.total_score == 0));
    assert!(api.team_details(2, token).expect("details").is_empty());
}

#[test]
fn user_directory_round_trip() {
    let api = FakeApi::seeded();
    let token = login(&api, "admin", "admin");
    let token = Some(token.as_str());
    let before = api.users(token).expect("users").len();

    let new_user = NewUser {
        user_id: 20,
        username: "blue9".to_string(),
        password: "first".to_string(),
        is_admin: false,
        is_blue_team: true,
        blue_team_num: Some(2),
    };
    api.add_user(&new_user, token).expect("add");
    let err = api.add_user(&new_user, token).expect_err("duplicate");
    assert_eq!(err, ApiError::Action("Add user failed: User already exists".to_string()));

    let listed = api.users(token).expect("users");
    assert_eq!(listed.len(), before + 1);
    let added = listed.iter().find(|u| u.user_id == 20).expect("new user listed");
    assert!(added.is_blue_team);
    assert_eq!(added.blue_team_num, Some(2));

    api.change_password(20, "second", token).expect("change password");
    assert!(api.login(&Credential::new("blue9", "first")).is_err());
    let session = login(&api, "blue9", "second");
    assert_eq!(api.me(&session).expect("me").blue_team_number, Some(2));

    api.remove_user(20, token).expect("remove");
    assert!(api.me(&session).is_err(), "sessions of removed users end");
    assert!(api.remove_user(20, token).is_err());
    assert_eq!(api.users(token).expect("users").len(), before);
}

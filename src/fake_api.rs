use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use serde_json::json;

use crate::api::ScoreApi;
use crate::error::ApiError;
use crate::models::{
    ActionReply, AdminAction, CompetitionPhase, Credential, IocDetailRow, LoginReply,
    ManagedUser, NewUser, ScoreboardSnapshot, SystemStatus, TeamScore, User,
};

const DEMO_TEAMS: u32 = 3;
const DEMO_CHECKS: [(&str, i32); 4] = [
    ("cron_persistence", 1),
    ("ssh_backdoor_key", 2),
    ("suid_shell", 2),
    ("kernel_module", 3),
];

struct Account {
    user: ManagedUser,
    password: String,
}

struct World {
    phase: CompetitionPhase,
    accounts: Vec<Account>,
    sessions: HashMap<String, i64>,
    teams: Vec<TeamScore>,
    details: Vec<IocDetailRow>,
    checks_run: u64,
    iocs_deployed: u64,
    started_at: Option<NaiveDateTime>,
    stopped_at: Option<NaiveDateTime>,
    last_check_at: Option<NaiveDateTime>,
}

/// In-process stand-in for the scoring controller. Drives the dashboard in
/// demo mode and backs the integration tests.
pub struct FakeApi {
    world: Mutex<World>,
    calls: AtomicUsize,
}

impl FakeApi {
    pub fn seeded() -> Self {
        let mut accounts = vec![account(1, "admin", "admin", true, None)];
        for team in 1..=DEMO_TEAMS {
            let id = 1 + i64::from(team);
            accounts.push(account(id, &format!("blue{team}"), "blue", false, Some(team)));
        }
        accounts.push(account(7, "red1", "red", false, Some(3)));

        let teams = (1..=DEMO_TEAMS)
            .map(|team_number| TeamScore {
                team_number,
                total_score: 0,
                last_check_delta: 0,
                last_check_at: None,
            })
            .collect();

        Self {
            world: Mutex::new(World {
                phase: CompetitionPhase::NotStarted,
                accounts,
                sessions: HashMap::new(),
                teams,
                details: Vec::new(),
                checks_run: 0,
                iocs_deployed: 0,
                started_at: None,
                stopped_at: None,
                last_check_at: None,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Registers `token` as an already-issued session of `user_id`.
    pub fn issue_token(&self, token: &str, user_id: i64) {
        self.world().sessions.insert(token.to_string(), user_id);
    }

    pub fn phase(&self) -> CompetitionPhase {
        self.world().phase.clone()
    }

    pub fn set_team_score(&self, team_number: u32, total: i64) {
        let mut world = self.world();
        if let Some(team) = world.teams.iter_mut().find(|t| t.team_number == team_number) {
            team.last_check_delta = total - team.total_score;
            team.total_score = total;
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn served(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn require_user(world: &World, token: Option<&str>) -> Option<ManagedUser> {
        let user_id = token.and_then(|t| world.sessions.get(t))?;
        world
            .accounts
            .iter()
            .find(|a| a.user.user_id == *user_id)
            .map(|a| a.user.clone())
    }

    fn require_admin(world: &World, token: Option<&str>, what: &str) -> Result<(), ApiError> {
        match Self::require_user(world, token) {
            Some(user) if user.is_admin => Ok(()),
            Some(_) => Err(ApiError::Action(format!("{what} failed: Admin access required"))),
            None => Err(ApiError::Action(format!("{what} failed: Invalid token"))),
        }
    }
}

impl ScoreApi for FakeApi {
    fn login(&self, credential: &Credential) -> Result<LoginReply, ApiError> {
        self.served();
        let mut world = self.world();
        let Some(user) = world
            .accounts
            .iter()
            .find(|a| a.user.username == credential.username && a.password == credential.password)
            .map(|a| a.user.clone())
        else {
            return Err(ApiError::Auth("login failed: Invalid credentials".to_string()));
        };
        let suffix: u32 = rand::thread_rng().r#gen();
        let token = format!("demo-{}-{suffix:08x}", user.user_id);
        world.sessions.insert(token.clone(), user.user_id);
        Ok(LoginReply {
            token,
            user: to_user(&user),
        })
    }

    fn me(&self, token: &str) -> Result<User, ApiError> {
        self.served();
        let world = self.world();
        Self::require_user(&world, Some(token))
            .map(|u| to_user(&u))
            .ok_or_else(|| ApiError::Auth("identity check rejected: 401 Unauthorized".to_string()))
    }

    fn scoreboard(&self) -> Result<ScoreboardSnapshot, ApiError> {
        self.served();
        let world = self.world();
        Ok(ScoreboardSnapshot {
            teams: world.teams.clone(),
            last_update: world.last_check_at.map(|t| t.format("%H:%M").to_string()),
        })
    }

    fn system_status(&self, token: Option<&str>) -> Result<SystemStatus, ApiError> {
        self.served();
        let world = self.world();
        Self::require_admin(&world, token, "Get status")?;
        Ok(status_payload(&world))
    }

    fn run_action(
        &self,
        action: AdminAction,
        token: Option<&str>,
    ) -> Result<ActionReply, ApiError> {
        self.served();
        let mut world = self.world();
        Self::require_admin(&world, token, action.title())?;
        let now = Utc::now().naive_utc();
        let reject = |detail: String| {
            Err(ApiError::Action(format!(
                "{} failed: {detail}",
                action.title()
            )))
        };

        let message = match action {
            AdminAction::StartCompetition => {
                if world.phase == CompetitionPhase::Running {
                    return reject("Competition already running".to_string());
                }
                world.phase = CompetitionPhase::Running;
                world.started_at = Some(now);
                world.stopped_at = None;
                "Competition started"
            }
            AdminAction::StopCompetition => {
                world.phase = CompetitionPhase::Stopped;
                world.stopped_at = Some(now);
                "Competition stopped"
            }
            AdminAction::ResetData => {
                if world.phase == CompetitionPhase::Running {
                    return reject("Cannot reset data while competition is running".to_string());
                }
                world.phase = CompetitionPhase::NotStarted;
                world.started_at = None;
                world.stopped_at = None;
                world.last_check_at = None;
                world.checks_run = 0;
                world.details.clear();
                for team in &mut world.teams {
                    team.total_score = 0;
                    team.last_check_delta = 0;
                    team.last_check_at = None;
                }
                "Competition data reset successfully"
            }
            AdminAction::DeployIocs => {
                if world.phase != CompetitionPhase::NotStarted {
                    return reject(format!(
                        "Cannot deploy IOCs in state: {}",
                        world.phase.label()
                    ));
                }
                world.iocs_deployed += u64::from(DEMO_TEAMS) * DEMO_CHECKS.len() as u64;
                "IOCs deployment initiated"
            }
            AdminAction::RunChecks => {
                if world.phase != CompetitionPhase::Running {
                    return reject(format!(
                        "Cannot run checks in state: {}",
                        world.phase.label()
                    ));
                }
                run_check_cycle(&mut world, now);
                "Check cycle initiated"
            }
        };

        Ok(ActionReply {
            status: "success".to_string(),
            message: message.to_string(),
            details: status_payload(&world).raw().clone(),
        })
    }

    fn team_details(
        &self,
        team_number: u32,
        token: Option<&str>,
    ) -> Result<Vec<IocDetailRow>, ApiError> {
        self.served();
        let world = self.world();
        if Self::require_user(&world, token).is_none() {
            return Err(ApiError::Action("Get details failed: Invalid token".to_string()));
        }
        Ok(world
            .details
            .iter()
            .filter(|row| row.team_number == team_number)
            .cloned()
            .collect())
    }

    fn users(&self, token: Option<&str>) -> Result<Vec<ManagedUser>, ApiError> {
        self.served();
        let world = self.world();
        Self::require_admin(&world, token, "Get users")?;
        Ok(world.accounts.iter().map(|a| a.user.clone()).collect())
    }

    fn add_user(&self, user: &NewUser, token: Option<&str>) -> Result<(), ApiError> {
        self.served();
        let mut world = self.world();
        Self::require_admin(&world, token, "Add user")?;
        if world
            .accounts
            .iter()
            .any(|a| a.user.user_id == user.user_id || a.user.username == user.username)
        {
            return Err(ApiError::Action("Add user failed: User already exists".to_string()));
        }
        let user = user.clone().normalized();
        world.accounts.push(account(
            user.user_id,
            &user.username,
            &user.password,
            user.is_admin,
            user.blue_team_num,
        ));
        if let Some(last) = world.accounts.last_mut() {
            last.user.is_blue_team = user.is_blue_team;
        }
        Ok(())
    }

    fn remove_user(&self, user_id: i64, token: Option<&str>) -> Result<(), ApiError> {
        self.served();
        let mut world = self.world();
        Self::require_admin(&world, token, "Remove user")?;
        let before = world.accounts.len();
        world.accounts.retain(|a| a.user.user_id != user_id);
        if world.accounts.len() == before {
            return Err(ApiError::Action("Remove user failed: User not found".to_string()));
        }
        world.sessions.retain(|_, id| *id != user_id);
        Ok(())
    }

    fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
        token: Option<&str>,
    ) -> Result<(), ApiError> {
        self.served();
        let mut world = self.world();
        Self::require_admin(&world, token, "Change password")?;
        let Some(account) = world.accounts.iter_mut().find(|a| a.user.user_id == user_id) else {
            return Err(ApiError::Action("Change password failed: User not found".to_string()));
        };
        account.password = new_password.to_string();
        Ok(())
    }
}

/// Runs a check cycle every `interval` while the demo competition is running.
pub fn spawn_auto_checks(api: Arc<FakeApi>, interval: Duration) {
    thread::spawn(move || {
        loop {
            thread::sleep(interval);
            let mut world = api.world();
            if world.phase == CompetitionPhase::Running {
                let now = Utc::now().naive_utc();
                run_check_cycle(&mut world, now);
            }
        }
    });
}

fn run_check_cycle(world: &mut World, now: NaiveDateTime) {
    let mut rng = rand::thread_rng();
    let mut details = Vec::new();
    for team in &mut world.teams {
        let mut earned = 0;
        for (host, (check, level)) in DEMO_CHECKS.iter().enumerate() {
            let failed = rng.gen_bool(0.35);
            let points = if failed { 0 } else { i64::from(*level) * 5 };
            earned += points;
            details.push(IocDetailRow {
                team_number: team.team_number,
                box_address: format!("10.{}.0.{}", team.team_number, 10 + host),
                check_name: (*check).to_string(),
                difficulty: *level,
                status_code: i32::from(failed),
                error_message: failed.then(|| "indicator still present".to_string()),
                points,
            });
        }
        team.total_score += earned;
        team.last_check_delta = earned;
        team.last_check_at = Some(now);
    }
    world.details = details;
    world.checks_run += 1;
    world.last_check_at = Some(now);
}

fn status_payload(world: &World) -> SystemStatus {
    let iso = |t: Option<NaiveDateTime>| t.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string());
    let phase = match &world.phase {
        CompetitionPhase::NotStarted => "not_started".to_string(),
        CompetitionPhase::Initializing => "initializing".to_string(),
        CompetitionPhase::Running => "running".to_string(),
        CompetitionPhase::Paused => "paused".to_string(),
        CompetitionPhase::Stopped => "stopped".to_string(),
        CompetitionPhase::Error => "error".to_string(),
        CompetitionPhase::Other(raw) => raw.clone(),
    };
    SystemStatus::new(json!({
        "status": phase,
        "start_time": iso(world.started_at),
        "end_time": iso(world.stopped_at),
        "last_check_time": iso(world.last_check_at),
        "total_checks_run": world.checks_run,
        "total_iocs_deployed": world.iocs_deployed,
        "configuration": {
            "num_teams": DEMO_TEAMS,
            "num_iocs": DEMO_CHECKS.len(),
        },
        "components": {
            "database": "ready",
        },
    }))
}

fn account(id: i64, username: &str, password: &str, admin: bool, team: Option<u32>) -> Account {
    Account {
        user: ManagedUser {
            user_id: id,
            username: username.to_string(),
            is_admin: admin,
            is_blue_team: team.is_some() && !admin,
            blue_team_num: team,
        },
        password: password.to_string(),
    }
}

fn to_user(user: &ManagedUser) -> User {
    User {
        id: user.user_id,
        username: user.username.clone(),
        is_admin: user.is_admin,
        is_blue_team: user.is_blue_team,
        blue_team_number: user.blue_team_num,
    }
}

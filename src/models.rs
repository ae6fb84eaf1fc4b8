use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Username/password pair. Lives only for the duration of one login call.
#[derive(Clone, Serialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity resolved by the controller from a session token.
///
/// The controller has shipped several field spellings over time, so the
/// deserializer accepts all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(
        alias = "user_id",
        alias = "userid",
        alias = "userId",
        deserialize_with = "de_loose_id"
    )]
    pub id: i64,
    pub username: String,
    #[serde(default, alias = "admin", alias = "is_admin")]
    pub is_admin: bool,
    #[serde(default, alias = "is_blue_team")]
    pub is_blue_team: bool,
    #[serde(default, alias = "blueteam_num", alias = "blue_team_num")]
    pub blue_team_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamScore {
    pub team_number: u32,
    pub total_score: i64,
    pub last_check_delta: i64,
    pub last_check_at: Option<NaiveDateTime>,
}

/// Complete scoreboard as of one poll. Never merged with a previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreboardSnapshot {
    pub teams: Vec<TeamScore>,
    /// Label of the newest sample when the controller reports a time series.
    pub last_update: Option<String>,
}

impl ScoreboardSnapshot {
    pub fn team(&self, team_number: u32) -> Option<&TeamScore> {
        self.teams.iter().find(|t| t.team_number == team_number)
    }

    /// Highest total; ties go to the lower team number.
    pub fn leader(&self) -> Option<&TeamScore> {
        self.teams.iter().max_by(|a, b| {
            a.total_score
                .cmp(&b.total_score)
                .then(b.team_number.cmp(&a.team_number))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompetitionPhase {
    NotStarted,
    Initializing,
    Running,
    Paused,
    Stopped,
    Error,
    Other(String),
}

impl CompetitionPhase {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "not_started" => CompetitionPhase::NotStarted,
            "initializing" => CompetitionPhase::Initializing,
            "running" => CompetitionPhase::Running,
            "paused" => CompetitionPhase::Paused,
            "stopped" => CompetitionPhase::Stopped,
            "error" => CompetitionPhase::Error,
            other => CompetitionPhase::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CompetitionPhase::NotStarted => "Not started",
            CompetitionPhase::Initializing => "Initializing",
            CompetitionPhase::Running => "Running",
            CompetitionPhase::Paused => "Paused",
            CompetitionPhase::Stopped => "Stopped",
            CompetitionPhase::Error => "Error",
            CompetitionPhase::Other(raw) => raw,
        }
    }
}

/// Controller status payload. Its shape belongs to the controller; callers
/// narrow it through the accessors below and otherwise treat it as opaque.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemStatus(Value);

impl SystemStatus {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn phase(&self) -> Option<CompetitionPhase> {
        self.0
            .get("status")
            .and_then(Value::as_str)
            .map(CompetitionPhase::parse)
    }

    pub fn total_checks_run(&self) -> Option<u64> {
        self.0.get("total_checks_run").and_then(Value::as_u64)
    }

    pub fn last_check_time(&self) -> Option<&str> {
        self.0.get("last_check_time").and_then(Value::as_str)
    }

    pub fn pretty(&self) -> String {
        if self.0.is_null() {
            return "No status available".to_string();
        }
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminAction {
    StartCompetition,
    StopCompetition,
    ResetData,
    DeployIocs,
    RunChecks,
}

impl AdminAction {
    pub const ALL: [AdminAction; 5] = [
        AdminAction::StartCompetition,
        AdminAction::StopCompetition,
        AdminAction::ResetData,
        AdminAction::DeployIocs,
        AdminAction::RunChecks,
    ];

    pub fn path(self) -> &'static str {
        match self {
            AdminAction::StartCompetition => "/admin/start_comp",
            AdminAction::StopCompetition => "/admin/stop_comp",
            AdminAction::ResetData => "/admin/reset_data",
            AdminAction::DeployIocs => "/admin/deploy_iocs",
            AdminAction::RunChecks => "/admin/run_checks",
        }
    }

    pub fn success_label(self) -> &'static str {
        match self {
            AdminAction::StartCompetition => "Competition started",
            AdminAction::StopCompetition => "Competition stopped",
            AdminAction::ResetData => "Competition data reset",
            AdminAction::DeployIocs => "IOCs deployed",
            AdminAction::RunChecks => "Checks run",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AdminAction::StartCompetition => "Start competition",
            AdminAction::StopCompetition => "Stop competition",
            AdminAction::ResetData => "Reset data",
            AdminAction::DeployIocs => "Deploy IOCs",
            AdminAction::RunChecks => "Run checks",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "results")]
    pub details: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Other(i32),
}

impl Difficulty {
    pub fn from_level(level: i32) -> Self {
        match level {
            1 => Difficulty::Easy,
            2 => Difficulty::Medium,
            3 => Difficulty::Hard,
            n => Difficulty::Other(n),
        }
    }

    pub fn label(self) -> String {
        match self {
            Difficulty::Easy => "Easy".to_string(),
            Difficulty::Medium => "Medium".to_string(),
            Difficulty::Hard => "Hard".to_string(),
            Difficulty::Other(n) => format!("L{n}"),
        }
    }
}

/// Latest result of one indicator check on one box.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IocDetailRow {
    #[serde(alias = "teamNumber", alias = "team_num")]
    pub team_number: u32,
    #[serde(alias = "boxAddress", alias = "box_ip")]
    pub box_address: String,
    #[serde(alias = "checkName", alias = "ioc_name")]
    pub check_name: String,
    #[serde(default)]
    pub difficulty: i32,
    #[serde(alias = "statusCode", alias = "status")]
    pub status_code: i32,
    #[serde(default, alias = "errorMessage", alias = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub points: i64,
}

impl IocDetailRow {
    pub fn passed(&self) -> bool {
        self.status_code == 0
    }

    pub fn difficulty(&self) -> Difficulty {
        Difficulty::from_level(self.difficulty)
    }
}

/// Entry of the controller's user directory, as listed to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    #[serde(alias = "id", alias = "userId")]
    pub user_id: i64,
    pub username: String,
    #[serde(default, alias = "admin", alias = "isAdmin")]
    pub is_admin: bool,
    #[serde(default, alias = "isBlueTeam")]
    pub is_blue_team: bool,
    #[serde(default, alias = "blueTeamNumber", alias = "blueteam_num")]
    pub blue_team_num: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub user_id: i64,
    pub username: String,
    pub password: String,
    pub is_admin: bool,
    pub is_blue_team: bool,
    pub blue_team_num: Option<u32>,
}

impl NewUser {
    /// Team number is only sent for blue-team accounts.
    pub fn normalized(mut self) -> Self {
        if !self.is_blue_team {
            self.blue_team_num = None;
        }
        self
    }
}

pub fn parse_check_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn de_loose_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match &raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("id out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric id: {s}"))),
        other => Err(serde::de::Error::custom(format!("unexpected id: {other}"))),
    }
}

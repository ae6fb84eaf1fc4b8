use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::http_client::http_client;
use crate::models::{
    ActionReply, AdminAction, Credential, IocDetailRow, LoginReply, ManagedUser, NewUser,
    ScoreboardSnapshot, SystemStatus, TeamScore, User, parse_check_time,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Request/response surface of the scoring controller.
///
/// Implementations own no session state: every authenticated call receives the
/// bearer token it should present.
pub trait ScoreApi: Send + Sync {
    fn login(&self, credential: &Credential) -> Result<LoginReply, ApiError>;

    /// Resolves the user behind `token`. Any non-success means the token is no
    /// longer valid.
    fn me(&self, token: &str) -> Result<User, ApiError>;

    fn scoreboard(&self) -> Result<ScoreboardSnapshot, ApiError>;

    fn system_status(&self, token: Option<&str>) -> Result<SystemStatus, ApiError>;

    fn run_action(&self, action: AdminAction, token: Option<&str>)
    -> Result<ActionReply, ApiError>;

    fn team_details(
        &self,
        team_number: u32,
        token: Option<&str>,
    ) -> Result<Vec<IocDetailRow>, ApiError>;

    fn users(&self, token: Option<&str>) -> Result<Vec<ManagedUser>, ApiError>;

    fn add_user(&self, user: &NewUser, token: Option<&str>) -> Result<(), ApiError>;

    fn remove_user(&self, user_id: i64, token: Option<&str>) -> Result<(), ApiError>;

    fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
        token: Option<&str>,
    ) -> Result<(), ApiError>;
}

pub struct HttpApi {
    base_url: String,
    client: &'static Client,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(
        &self,
        req: RequestBuilder,
        token: Option<&str>,
    ) -> Result<(StatusCode, String), ApiError> {
        let req = match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text()?;
        Ok((status, body))
    }

    /// Sends a bearer-authenticated request and maps any non-success reply to
    /// an `Action` failure carrying the controller's own explanation.
    fn admin_call(
        &self,
        req: RequestBuilder,
        token: Option<&str>,
        what: &str,
    ) -> Result<String, ApiError> {
        let (status, body) = self.send(req, token)?;
        if status.is_success() {
            return Ok(body);
        }
        let detail = error_detail(&body).unwrap_or_else(|| status.to_string());
        Err(ApiError::Action(format!("{what} failed: {detail}")))
    }
}

impl ScoreApi for HttpApi {
    fn login(&self, credential: &Credential) -> Result<LoginReply, ApiError> {
        let req = self.client.post(self.url("/login")).json(credential);
        let (status, body) = self.send(req, None)?;
        if !status.is_success() {
            let detail = error_detail(&body).unwrap_or_else(|| status.to_string());
            return Err(ApiError::Auth(format!("login failed: {detail}")));
        }
        parse_login_json(&body)
    }

    fn me(&self, token: &str) -> Result<User, ApiError> {
        let req = self.client.get(self.url("/me"));
        let (status, body) = self.send(req, Some(token))?;
        if !status.is_success() {
            return Err(ApiError::Auth(format!("identity check rejected: {status}")));
        }
        parse_me_json(&body)
    }

    fn scoreboard(&self) -> Result<ScoreboardSnapshot, ApiError> {
        let req = self.client.get(self.url("/scoreboard"));
        let (status, body) = self.send(req, None)?;
        if !status.is_success() {
            return Err(ApiError::Transport(format!(
                "failed to fetch scoreboard: {status}"
            )));
        }
        parse_scoreboard_json(&body)
    }

    fn system_status(&self, token: Option<&str>) -> Result<SystemStatus, ApiError> {
        let req = self.client.get(self.url("/admin/status"));
        let body = self.admin_call(req, token, "Get status")?;
        parse_status_json(&body)
    }

    fn run_action(
        &self,
        action: AdminAction,
        token: Option<&str>,
    ) -> Result<ActionReply, ApiError> {
        let req = self.client.post(self.url(action.path()));
        let body = self.admin_call(req, token, action.title())?;
        parse_action_json(&body)
    }

    fn team_details(
        &self,
        team_number: u32,
        token: Option<&str>,
    ) -> Result<Vec<IocDetailRow>, ApiError> {
        let req = self.client.get(self.url(&format!("/details/{team_number}")));
        let body = self.admin_call(req, token, "Get details")?;
        parse_details_json(&body)
    }

    fn users(&self, token: Option<&str>) -> Result<Vec<ManagedUser>, ApiError> {
        let req = self.client.get(self.url("/admin/get_users"));
        let body = self.admin_call(req, token, "Get users")?;
        parse_users_json(&body)
    }

    fn add_user(&self, user: &NewUser, token: Option<&str>) -> Result<(), ApiError> {
        let req = self
            .client
            .post(self.url("/admin/add_user"))
            .json(&user.clone().normalized());
        self.admin_call(req, token, "Add user").map(|_| ())
    }

    fn remove_user(&self, user_id: i64, token: Option<&str>) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url("/admin/remove_user"))
            .json(&json!({ "user_id": user_id }));
        self.admin_call(req, token, "Remove user").map(|_| ())
    }

    fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
        token: Option<&str>,
    ) -> Result<(), ApiError> {
        let req = self
            .client
            .post(self.url("/admin/change_password"))
            .json(&json!({ "user_id": user_id, "new_password": new_password }));
        self.admin_call(req, token, "Change password").map(|_| ())
    }
}

/// Pulls a human-readable reason out of an error body (`{"detail": ...}`,
/// `{"message": ...}`, or short plain text).
pub fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(root) = serde_json::from_str::<Value>(trimmed) {
        for key in ["detail", "message", "error"] {
            match root.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                Some(Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }
        return None;
    }
    const MAX_PLAIN: usize = 200;
    Some(trimmed.chars().take(MAX_PLAIN).collect())
}

/// The token sits at the root; the identity either alongside it or nested
/// under `user`.
pub fn parse_login_json(raw: &str) -> Result<LoginReply, ApiError> {
    let root: Value = serde_json::from_str(raw.trim())?;
    let token = root
        .get("token")
        .or_else(|| root.get("access_token"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if token.is_empty() {
        return Err(ApiError::Auth("login reply carried no token".to_string()));
    }
    let user = match root.get("user") {
        Some(inner) => inner.clone(),
        None => root,
    };
    Ok(LoginReply {
        token,
        user: serde_json::from_value(user)?,
    })
}

pub fn parse_me_json(raw: &str) -> Result<User, ApiError> {
    let root: Value = serde_json::from_str(raw.trim())?;
    let user = match root.get("user") {
        Some(inner) => inner.clone(),
        None => root,
    };
    Ok(serde_json::from_value(user)?)
}

#[derive(Debug, Deserialize)]
struct TeamScoreWire {
    #[serde(alias = "teamNumber", alias = "team_num")]
    team_number: u32,
    #[serde(default, alias = "totalScore")]
    total_score: i64,
    #[serde(default, alias = "lastCheckScore")]
    last_check_score: i64,
    #[serde(default, alias = "lastCheckTime")]
    last_check_time: Option<String>,
}

/// Accepts the `{teams: [...]}` feed as well as the older time-series shape
/// `{time: [...], team1: [...], ...}` where each team key holds running totals.
pub fn parse_scoreboard_json(raw: &str) -> Result<ScoreboardSnapshot, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ScoreboardSnapshot::default());
    }

    let root: Value = serde_json::from_str(trimmed)?;
    if let Some(teams) = root.get("teams") {
        let rows: Vec<TeamScoreWire> = serde_json::from_value(teams.clone())?;
        let teams = rows
            .into_iter()
            .map(|row| TeamScore {
                team_number: row.team_number,
                total_score: row.total_score,
                last_check_delta: row.last_check_score,
                last_check_at: row.last_check_time.as_deref().and_then(parse_check_time),
            })
            .collect();
        return Ok(ScoreboardSnapshot {
            teams,
            last_update: None,
        });
    }

    let Some(obj) = root.as_object() else {
        return Err(ApiError::Decode("scoreboard is not an object".to_string()));
    };
    let times = obj
        .get("time")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if times.is_empty() {
        return Ok(ScoreboardSnapshot::default());
    }
    let last = times.len() - 1;
    let prev = last.saturating_sub(1);

    let mut teams = Vec::new();
    for (key, series) in obj {
        let Some(team_number) = key.strip_prefix("team").and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        let Some(series) = series.as_array() else {
            continue;
        };
        let sample = |idx: usize| series.get(idx).and_then(Value::as_i64).unwrap_or(0);
        let total = sample(last);
        teams.push(TeamScore {
            team_number,
            total_score: total,
            last_check_delta: total - sample(prev),
            last_check_at: None,
        });
    }
    teams.sort_by_key(|t| t.team_number);

    Ok(ScoreboardSnapshot {
        teams,
        last_update: times.get(last).cloned(),
    })
}

pub fn parse_status_json(raw: &str) -> Result<SystemStatus, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(SystemStatus::default());
    }
    Ok(SystemStatus::new(serde_json::from_str(trimmed)?))
}

pub fn parse_action_json(raw: &str) -> Result<ActionReply, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ActionReply::default());
    }
    Ok(serde_json::from_str(trimmed)?)
}

pub fn parse_details_json(raw: &str) -> Result<Vec<IocDetailRow>, ApiError> {
    parse_listing(raw, "details")
}

pub fn parse_users_json(raw: &str) -> Result<Vec<ManagedUser>, ApiError> {
    parse_listing(raw, "users")
}

/// Lists arrive either bare or wrapped under a single key.
fn parse_listing<T: for<'de> Deserialize<'de>>(raw: &str, key: &str) -> Result<Vec<T>, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let root: Value = serde_json::from_str(trimmed)?;
    let list = match root {
        Value::Array(_) => root,
        Value::Object(mut obj) => obj.remove(key).unwrap_or(Value::Array(Vec::new())),
        other => {
            return Err(ApiError::Decode(format!("expected {key} list, got {other}")));
        }
    };
    if list.is_null() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(list)?)
}

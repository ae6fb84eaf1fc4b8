use std::collections::VecDeque;

use crate::guard::Route;
use crate::models::{
    ActionReply, AdminAction, ManagedUser, NewUser, ScoreboardSnapshot, TeamScore, User,
};
use crate::op::Op;
use crate::orchestrator::Invocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Scoreboard,
    Admin,
    Details { team_number: u32 },
}

impl Screen {
    pub fn route(self) -> Route {
        match self {
            Screen::Login => Route::Login,
            Screen::Scoreboard => Route::Home,
            Screen::Admin => Route::Admin,
            Screen::Details { .. } => Route::Details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

#[derive(Debug, Clone)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub focus: LoginField,
    pub submitting: bool,
    pub error: Option<String>,
}

impl LoginForm {
    fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: LoginField::Username,
            submitting: false,
            error: None,
        }
    }

    pub fn push_char(&mut self, c: char) {
        match self.focus {
            LoginField::Username => self.username.push(c),
            LoginField::Password => self.password.push(c),
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            LoginField::Username => self.username.pop(),
            LoginField::Password => self.password.pop(),
        };
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    pub fn ready(&self) -> bool {
        !self.submitting && !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminFocus {
    Actions,
    Users,
}

/// One-line input opened from the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    AddUser,
    ChangePassword { user_id: i64, username: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
}

impl Prompt {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            input: String::new(),
        }
    }

    pub fn title(&self) -> String {
        match &self.kind {
            PromptKind::AddUser => {
                "Add user: <id> <username> <password> [admin] [blue=<team>]".to_string()
            }
            PromptKind::ChangePassword { username, .. } => format!("New password for {username}"),
        }
    }
}

/// Parses the add-user prompt line.
pub fn parse_new_user(line: &str) -> Result<NewUser, String> {
    let mut parts = line.split_whitespace();
    let (Some(id), Some(username), Some(password)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("expected: <id> <username> <password> [admin] [blue=<team>]".to_string());
    };
    let user_id = id
        .parse::<i64>()
        .map_err(|_| format!("invalid user id: {id}"))?;

    let mut user = NewUser {
        user_id,
        username: username.to_string(),
        password: password.to_string(),
        is_admin: false,
        is_blue_team: false,
        blue_team_num: None,
    };
    for flag in parts {
        if flag.eq_ignore_ascii_case("admin") {
            user.is_admin = true;
        } else if let Some(team) = flag.strip_prefix("blue=") {
            let team = team
                .parse::<u32>()
                .map_err(|_| format!("invalid blue team number: {team}"))?;
            user.is_blue_team = true;
            user.blue_team_num = Some(team);
        } else {
            return Err(format!("unknown option: {flag}"));
        }
    }
    Ok(user.normalized())
}

/// Results of background work, applied on the UI thread.
#[derive(Debug, Clone)]
pub enum Delta {
    LoginFinished(Result<User, String>),
    ActionFinished {
        action: AdminAction,
        outcome: Invocation<ActionReply>,
    },
    SetUsers(Result<Vec<ManagedUser>, String>),
    UserChanged {
        what: String,
        result: Result<(), String>,
    },
    Log(String),
}

pub struct AppState {
    pub screen: Screen,
    pub return_to: Option<Screen>,
    pub login: LoginForm,
    pub selected: usize,
    pub admin_focus: AdminFocus,
    pub admin_selected: usize,
    pub users: Op<Vec<ManagedUser>>,
    pub users_selected: usize,
    pub prompt: Option<Prompt>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            screen: Screen::Scoreboard,
            return_to: None,
            login: LoginForm::new(),
            selected: 0,
            admin_focus: AdminFocus::Actions,
            admin_selected: 0,
            users: Op::Idle,
            users_selected: 0,
            prompt: None,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    /// Follows a guard redirect. A trip to the login screen remembers where the
    /// user was headed.
    pub fn redirect(&mut self, target: Route) {
        match target {
            Route::Login => {
                if self.screen != Screen::Login {
                    self.return_to = Some(self.screen);
                }
                self.screen = Screen::Login;
            }
            Route::Home => {
                self.push_log("[WARN] Admin access required");
                self.screen = Screen::Scoreboard;
            }
            Route::Admin => self.screen = Screen::Admin,
            Route::Details => {}
        }
    }

    pub fn select_next(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1).min(len - 1);
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn admin_next(&mut self) {
        match self.admin_focus {
            AdminFocus::Actions => {
                self.admin_selected = (self.admin_selected + 1).min(AdminAction::ALL.len() - 1);
            }
            AdminFocus::Users => {
                let len = self.users.success().map_or(0, Vec::len);
                self.users_selected = (self.users_selected + 1).min(len.saturating_sub(1));
            }
        }
    }

    pub fn admin_prev(&mut self) {
        match self.admin_focus {
            AdminFocus::Actions => self.admin_selected = self.admin_selected.saturating_sub(1),
            AdminFocus::Users => self.users_selected = self.users_selected.saturating_sub(1),
        }
    }

    pub fn selected_action(&self) -> AdminAction {
        AdminAction::ALL[self.admin_selected.min(AdminAction::ALL.len() - 1)]
    }

    pub fn selected_user(&self) -> Option<&ManagedUser> {
        self.users.success().and_then(|users| users.get(self.users_selected))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::LoginFinished(result) => {
            state.login.submitting = false;
            state.login.password.clear();
            match result {
                Ok(user) => {
                    state.login.error = None;
                    state.push_log(format!("[INFO] Logged in as {}", user.username));
                    state.screen = state.return_to.take().unwrap_or(Screen::Scoreboard);
                }
                Err(err) => {
                    state.push_log(format!("[WARN] {err}"));
                    state.login.error = Some(err);
                }
            }
        }
        Delta::ActionFinished { action, outcome } => match outcome {
            Invocation::Succeeded(reply) => {
                let detail = if reply.message.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", reply.message)
                };
                state.push_log(format!("[INFO] {}{detail}", action.success_label()));
            }
            Invocation::Failed(err) => state.push_log(format!("[WARN] {err}")),
            Invocation::Skipped => state.push_log(format!(
                "[INFO] {} ignored: another action is still running",
                action.title()
            )),
        },
        Delta::SetUsers(result) => {
            if let Err(err) = &result {
                state.push_log(format!("[WARN] {err}"));
            }
            state.users = Op::settle(result);
            let len = state.users.success().map_or(0, Vec::len);
            state.users_selected = state.users_selected.min(len.saturating_sub(1));
        }
        Delta::UserChanged { what, result } => match result {
            Ok(()) => state.push_log(format!("[INFO] {what}")),
            Err(err) => state.push_log(format!("[WARN] {err}")),
        },
        Delta::Log(msg) => state.push_log(msg),
    }
}

/// Teams ordered for display: highest total first, ties by team number.
pub fn ranked_teams(snapshot: &ScoreboardSnapshot) -> Vec<&TeamScore> {
    let mut teams: Vec<&TeamScore> = snapshot.teams.iter().collect();
    teams.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.team_number.cmp(&b.team_number))
    });
    teams
}

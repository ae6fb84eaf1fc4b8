use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ioc_scoreboard::api::{HttpApi, ScoreApi};
use ioc_scoreboard::config::Config;
use ioc_scoreboard::fake_api::{self, FakeApi};
use ioc_scoreboard::guard::{AccessGuard, GuardDecision, Route};
use ioc_scoreboard::models::{AdminAction, IocDetailRow, ScoreboardSnapshot, SystemStatus};
use ioc_scoreboard::op::Op;
use ioc_scoreboard::orchestrator::ActionOrchestrator;
use ioc_scoreboard::poller::{FeedState, Poller};
use ioc_scoreboard::session::SessionStore;
use ioc_scoreboard::state::{
    AdminFocus, AppState, Delta, LoginField, Prompt, PromptKind, Screen, apply_delta,
    parse_new_user, ranked_teams,
};
use ioc_scoreboard::token_store;

const DEMO_CHECK_SECS: u64 = 20;
const LOG_DIR: &str = "ioc_scoreboard";
const LOG_FILE: &str = "client.log";

/// Pollers and orchestrator belonging to the view currently on screen.
/// Dropping it stops every feed it owns.
struct MountedView {
    screen: Screen,
    scoreboard: Option<Poller<ScoreboardSnapshot>>,
    status: Option<Poller<SystemStatus>>,
    details: Option<Poller<Vec<IocDetailRow>>>,
    orchestrator: Option<Arc<ActionOrchestrator>>,
}

struct App {
    state: AppState,
    config: Config,
    session: Arc<SessionStore>,
    tx: mpsc::Sender<Delta>,
    guard: Option<(Route, AccessGuard)>,
    guard_decision: Option<GuardDecision>,
    mounted: Option<MountedView>,
    pending_delete: Option<i64>,
    should_quit: bool,
}

impl App {
    fn new(config: Config, session: Arc<SessionStore>, tx: mpsc::Sender<Delta>) -> Self {
        Self {
            state: AppState::new(),
            config,
            session,
            tx,
            guard: None,
            guard_decision: None,
            mounted: None,
            pending_delete: None,
            should_quit: false,
        }
    }

    /// Consults the access guard for the current screen and mounts or
    /// unmounts the view's feeds to match.
    fn sync_view(&mut self) {
        let route = self.state.screen.route();
        if self.guard.as_ref().map(|(r, _)| *r) != Some(route) {
            self.guard = AccessGuard::for_route(route).map(|guard| (route, guard));
        }

        let decision = match self.guard.as_mut() {
            Some((_, guard)) => {
                let outcome = guard.evaluate(&self.session.snapshot());
                if let Some(target) = outcome.redirect {
                    self.unmount();
                    self.state.redirect(target);
                    self.guard_decision = Some(outcome.decision);
                    return;
                }
                outcome.decision
            }
            None => GuardDecision::Render,
        };
        self.guard_decision = Some(decision);

        if decision == GuardDecision::Render {
            self.mount(self.state.screen);
        } else {
            self.unmount();
        }
    }

    fn mount(&mut self, screen: Screen) {
        if self.mounted.as_ref().is_some_and(|m| m.screen == screen) {
            return;
        }
        self.unmount();

        let mut view = MountedView {
            screen,
            scoreboard: None,
            status: None,
            details: None,
            orchestrator: None,
        };
        match screen {
            Screen::Login => {}
            Screen::Scoreboard => {
                let api = self.session.api();
                view.scoreboard = Some(Poller::start(
                    "scoreboard",
                    self.config.scoreboard_interval,
                    move || api.scoreboard(),
                ));
            }
            Screen::Admin => {
                let session = self.session.clone();
                let status = Poller::start("status", self.config.status_interval, move || {
                    session.api().system_status(session.token().as_deref())
                });
                view.orchestrator = Some(Arc::new(ActionOrchestrator::with_resync(Arc::new(
                    status.handle(),
                ))));
                view.status = Some(status);
                self.request_users();
            }
            Screen::Details { team_number } => {
                let session = self.session.clone();
                view.details = Some(Poller::start(
                    "details",
                    self.config.scoreboard_interval,
                    move || {
                        session
                            .api()
                            .team_details(team_number, session.token().as_deref())
                    },
                ));
            }
        }
        self.mounted = Some(view);
    }

    fn unmount(&mut self) {
        self.mounted = None;
        self.pending_delete = None;
        self.state.prompt = None;
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.state.screen == Screen::Login {
            self.on_login_key(key);
            return;
        }
        if self.state.prompt.is_some() {
            self.on_prompt_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('1') => self.state.screen = Screen::Scoreboard,
            KeyCode::Char('2') => self.state.screen = Screen::Admin,
            KeyCode::Char('o') => self.logout(),
            KeyCode::Char('r') => self.refresh_current(),
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Char('b') | KeyCode::Esc => self.state.screen = Screen::Scoreboard,
            KeyCode::Char('j') | KeyCode::Down => self.move_down(),
            KeyCode::Char('k') | KeyCode::Up => self.move_up(),
            KeyCode::Tab if self.state.screen == Screen::Admin => {
                self.state.admin_focus = match self.state.admin_focus {
                    AdminFocus::Actions => AdminFocus::Users,
                    AdminFocus::Users => AdminFocus::Actions,
                };
                self.pending_delete = None;
            }
            KeyCode::Char('x') if self.state.screen == Screen::Admin => self.delete_selected_user(),
            KeyCode::Char('a') if self.users_focused() => {
                self.state.prompt = Some(Prompt::new(PromptKind::AddUser));
            }
            KeyCode::Char('p') if self.users_focused() => {
                let kind = self.state.selected_user().map(|user| PromptKind::ChangePassword {
                    user_id: user.user_id,
                    username: user.username.clone(),
                });
                self.state.prompt = kind.map(Prompt::new);
            }
            KeyCode::Char('d') | KeyCode::Enter => match self.state.screen {
                Screen::Scoreboard => self.open_details(),
                Screen::Admin if self.state.admin_focus == AdminFocus::Actions => {
                    self.trigger_action(self.state.selected_action());
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn on_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up => self.state.login.toggle_focus(),
            KeyCode::Backspace => self.state.login.backspace(),
            KeyCode::Enter => {
                if self.state.login.focus == LoginField::Username {
                    self.state.login.toggle_focus();
                } else {
                    self.submit_login();
                }
            }
            KeyCode::Char(c) => self.state.login.push_char(c),
            _ => {}
        }
    }

    fn on_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.state.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.state.prompt = None,
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Char(c) => prompt.input.push(c),
            KeyCode::Enter => {
                if let Some(prompt) = self.state.prompt.take() {
                    self.submit_prompt(prompt);
                }
            }
            _ => {}
        }
    }

    fn submit_prompt(&mut self, prompt: Prompt) {
        let session = self.session.clone();
        let tx = self.tx.clone();
        match prompt.kind {
            PromptKind::AddUser => {
                let user = match parse_new_user(&prompt.input) {
                    Ok(user) => user,
                    Err(err) => {
                        self.state.push_log(format!("[WARN] {err}"));
                        return;
                    }
                };
                thread::spawn(move || {
                    let api = session.api();
                    let token = session.token();
                    let result = api
                        .add_user(&user, token.as_deref())
                        .map_err(|err| err.to_string());
                    let _ = tx.send(Delta::UserChanged {
                        what: format!("Added user {}", user.username),
                        result,
                    });
                    let users = api.users(token.as_deref()).map_err(|err| err.to_string());
                    let _ = tx.send(Delta::SetUsers(users));
                });
            }
            PromptKind::ChangePassword { user_id, username } => {
                let password = prompt.input;
                if password.is_empty() {
                    self.state.push_log("[WARN] Password cannot be empty");
                    return;
                }
                thread::spawn(move || {
                    let result = session
                        .api()
                        .change_password(user_id, &password, session.token().as_deref())
                        .map_err(|err| err.to_string());
                    let _ = tx.send(Delta::UserChanged {
                        what: format!("Changed password for {username}"),
                        result,
                    });
                });
            }
        }
    }

    fn users_focused(&self) -> bool {
        self.state.screen == Screen::Admin && self.state.admin_focus == AdminFocus::Users
    }

    fn submit_login(&mut self) {
        if !self.state.login.ready() {
            return;
        }
        self.state.login.submitting = true;
        self.state.login.error = None;
        let username = self.state.login.username.trim().to_string();
        let password = self.state.login.password.clone();
        let session = self.session.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = session
                .login(&username, &password)
                .map_err(|err| err.to_string());
            let _ = tx.send(Delta::LoginFinished(result));
        });
    }

    fn logout(&mut self) {
        self.unmount();
        self.session.logout();
        self.state.users = Op::Idle;
        self.state.return_to = None;
        self.state.screen = Screen::Scoreboard;
        self.state.push_log("[INFO] Logged out");
    }

    fn move_down(&mut self) {
        match self.state.screen {
            Screen::Scoreboard => {
                let len = self
                    .scoreboard_state()
                    .and_then(|s| s.snapshot)
                    .map_or(0, |s| s.teams.len());
                self.state.select_next(len);
            }
            Screen::Admin => {
                self.state.admin_next();
                self.pending_delete = None;
            }
            _ => {}
        }
    }

    fn move_up(&mut self) {
        match self.state.screen {
            Screen::Scoreboard => self.state.select_prev(),
            Screen::Admin => {
                self.state.admin_prev();
                self.pending_delete = None;
            }
            _ => {}
        }
    }

    fn open_details(&mut self) {
        let Some(snapshot) = self.scoreboard_state().and_then(|s| s.snapshot) else {
            self.state.push_log("[INFO] No scoreboard yet");
            return;
        };
        let ranked = ranked_teams(&snapshot);
        let Some(team) = ranked.get(self.state.selected) else {
            return;
        };
        self.state.screen = Screen::Details {
            team_number: team.team_number,
        };
    }

    /// Forces one out-of-cycle fetch of the visible feed.
    fn refresh_current(&mut self) {
        let Some(view) = self.mounted.as_ref() else {
            return;
        };
        let refresh: Option<Box<dyn FnOnce() + Send>> =
            if let Some(poller) = view.scoreboard.as_ref() {
                let handle = poller.handle();
                Some(Box::new(move || {
                    handle.refresh_now();
                }))
            } else if let Some(poller) = view.status.as_ref() {
                let handle = poller.handle();
                Some(Box::new(move || {
                    handle.refresh_now();
                }))
            } else if let Some(poller) = view.details.as_ref() {
                let handle = poller.handle();
                Some(Box::new(move || {
                    handle.refresh_now();
                }))
            } else {
                None
            };
        if self.state.screen == Screen::Admin {
            self.request_users();
        }
        if let Some(refresh) = refresh {
            thread::spawn(refresh);
        }
    }

    fn trigger_action(&mut self, action: AdminAction) {
        let Some(orchestrator) = self.mounted.as_ref().and_then(|m| m.orchestrator.clone()) else {
            return;
        };
        let session = self.session.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = orchestrator.invoke(
                || session.api().run_action(action, session.token().as_deref()),
                action.success_label(),
            );
            let _ = tx.send(Delta::ActionFinished { action, outcome });
        });
    }

    fn request_users(&mut self) {
        if !self.state.users.is_pending() && self.state.users.success().is_none() {
            self.state.users = Op::Pending;
        }
        let session = self.session.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = session
                .api()
                .users(session.token().as_deref())
                .map_err(|err| err.to_string());
            let _ = tx.send(Delta::SetUsers(result));
        });
    }

    fn delete_selected_user(&mut self) {
        if self.state.admin_focus != AdminFocus::Users {
            return;
        }
        let Some(user) = self.state.selected_user().cloned() else {
            return;
        };
        if self.session.user().is_some_and(|me| me.id == user.user_id) {
            self.state.push_log("[WARN] Refusing to delete the signed-in account");
            return;
        }
        if self.pending_delete != Some(user.user_id) {
            self.pending_delete = Some(user.user_id);
            self.state
                .push_log(format!("[INFO] Press x again to delete {}", user.username));
            return;
        }
        self.pending_delete = None;

        let session = self.session.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let api = session.api();
            let token = session.token();
            let result = api
                .remove_user(user.user_id, token.as_deref())
                .map_err(|err| err.to_string());
            let _ = tx.send(Delta::UserChanged {
                what: format!("Deleted user {}", user.username),
                result,
            });
            let users = api.users(token.as_deref()).map_err(|err| err.to_string());
            let _ = tx.send(Delta::SetUsers(users));
        });
    }

    fn scoreboard_state(&self) -> Option<FeedState<ScoreboardSnapshot>> {
        self.mounted
            .as_ref()
            .and_then(|m| m.scoreboard.as_ref())
            .map(|p| p.handle().state())
    }

    fn status_state(&self) -> Option<FeedState<SystemStatus>> {
        self.mounted
            .as_ref()
            .and_then(|m| m.status.as_ref())
            .map(|p| p.handle().state())
    }

    fn details_state(&self) -> Option<FeedState<Vec<IocDetailRow>>> {
        self.mounted
            .as_ref()
            .and_then(|m| m.details.as_ref())
            .map(|p| p.handle().state())
    }

    fn action_state(&self) -> (bool, Op<String>) {
        match self.mounted.as_ref().and_then(|m| m.orchestrator.as_ref()) {
            Some(orchestrator) => (orchestrator.is_busy(), orchestrator.last()),
            None => (false, Op::Idle),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = Config::load();
    if config.log_to_file {
        init_file_logging()?;
    }

    let api: Arc<dyn ScoreApi> = if config.demo {
        let fake = Arc::new(FakeApi::seeded());
        fake_api::spawn_auto_checks(fake.clone(), Duration::from_secs(DEMO_CHECK_SECS));
        info!("demo mode: using in-process controller");
        fake
    } else {
        let api = HttpApi::new(&config.api_url).context("build api client")?;
        info!(url = api.base_url(), "using remote controller");
        Arc::new(api)
    };
    let tokens = token_store::for_config(&config);

    let session = Arc::new(SessionStore::new(api, tokens));
    {
        let session = session.clone();
        thread::spawn(move || session.initialize());
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let mut app = App::new(config, session, tx);
    let res = run_app(&mut terminal, &mut app, rx);
    app.unmount();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn init_file_logging() -> Result<()> {
    let path = log_path().context("unable to resolve log path")?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("create log dir")?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .context("open log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn log_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(LOG_DIR).join(LOG_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(LOG_DIR).join(LOG_FILE))
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        app.sync_view();

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match app.guard_decision {
        Some(GuardDecision::Loading) | None if app.state.screen != Screen::Login => {
            let loading = Paragraph::new("Checking session...")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(loading, centered_rect(30, 20, chunks[1]));
        }
        Some(GuardDecision::Redirect(_)) => {}
        _ => match app.state.screen {
            Screen::Login => render_login(frame, chunks[1], &app.state),
            Screen::Scoreboard => render_scoreboard(frame, chunks[1], app),
            Screen::Admin => render_admin(frame, chunks[1], app),
            Screen::Details { team_number } => render_details(frame, chunks[1], app, team_number),
        },
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer =
        Paragraph::new(footer_text(&app.state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let view = match app.state.screen {
        Screen::Login => "Login".to_string(),
        Screen::Scoreboard => "Scoreboard".to_string(),
        Screen::Admin => "Admin".to_string(),
        Screen::Details { team_number } => format!("Team {team_number} details"),
    };
    let who = match app.session.user() {
        Some(user) if user.is_admin => format!("{} (admin)", user.username),
        Some(user) => match user.blue_team_number.filter(|_| user.is_blue_team) {
            Some(team) => format!("{} (blue team {team})", user.username),
            None => user.username,
        },
        None => "signed out".to_string(),
    };
    let mode = if app.config.demo { " | DEMO" } else { "" };
    format!("  [#]  IOC SCOREBOARD | {view} | {who}{mode}\n  [#]")
}

fn footer_text(state: &AppState) -> String {
    match state.screen {
        Screen::Login => "Tab Switch field | Enter Sign in | Esc Quit".to_string(),
        Screen::Scoreboard => {
            "1 Scoreboard | 2 Admin | j/k/↑/↓ Move | Enter/d Details | r Refresh | o Logout | ? Help | q Quit"
                .to_string()
        }
        Screen::Admin => {
            "1 Scoreboard | Tab Actions/Users | Enter Run | a Add | p Password | x Delete | r Refresh | o Logout | ? Help | q Quit"
                .to_string()
        }
        Screen::Details { .. } => "b/Esc Back | r Refresh | o Logout | ? Help | q Quit".to_string(),
    }
}

fn render_login(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup = centered_rect(50, 60, area);
    let form = &state.login;
    let marker = |field: LoginField| if form.focus == field { ">" } else { " " };
    let masked = "*".repeat(form.password.chars().count());

    let mut lines = vec![
        format!("{} Username: {}", marker(LoginField::Username), form.username),
        format!("{} Password: {}", marker(LoginField::Password), masked),
        String::new(),
    ];
    if form.submitting {
        lines.push("Signing in...".to_string());
    } else if let Some(err) = form.error.as_ref() {
        lines.push(format!("Error: {err}"));
    } else {
        lines.push("Enter to sign in".to_string());
    }

    let style = if form.error.is_some() && !form.submitting {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let paragraph = Paragraph::new(lines.join("\n"))
        .style(style)
        .wrap(Wrap { trim: false })
        .block(Block::default().title("Sign in").borders(Borders::ALL));
    frame.render_widget(paragraph, popup);
}

fn render_scoreboard(frame: &mut Frame, area: Rect, app: &App) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let Some(feed) = app.scoreboard_state() else {
        return;
    };
    frame.render_widget(feed_status_line(&feed, "scoreboard"), sections[0]);

    let widths = scoreboard_columns();
    render_scoreboard_header(frame, sections[1], &widths);

    let list_area = sections[2];
    let Some(snapshot) = feed.snapshot.as_ref() else {
        return;
    };
    let ranked = ranked_teams(snapshot);
    if ranked.is_empty() {
        let empty = Paragraph::new("No teams on the scoreboard yet")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, list_area);
        return;
    }

    let visible = list_area.height as usize;
    let (start, end) = visible_range(app.state.selected, ranked.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let selected = idx == app.state.selected;
        let row_style = if selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);
        let team = ranked[idx];
        let checked = team
            .last_check_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .or_else(|| snapshot.last_update.clone())
            .unwrap_or_else(|| "-".to_string());
        let delta_style = if team.last_check_delta > 0 {
            row_style.fg(Color::Green)
        } else {
            row_style
        };

        render_cell_text(frame, cols[0], &format!("{}", idx + 1), row_style);
        render_cell_text(frame, cols[1], &format!("team{}", team.team_number), row_style);
        render_cell_text(frame, cols[2], &team.total_score.to_string(), row_style);
        render_cell_text(frame, cols[3], &format!("{:+}", team.last_check_delta), delta_style);
        render_cell_text(frame, cols[4], &checked, row_style);
    }
}

fn scoreboard_columns() -> [Constraint; 5] {
    [
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(14),
        Constraint::Length(18),
        Constraint::Min(10),
    ]
}

fn render_scoreboard_header(frame: &mut Frame, area: Rect, widths: &[Constraint]) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths.iter().copied())
        .split(area);
    let style = Style::default().add_modifier(Modifier::BOLD);

    render_cell_text(frame, cols[0], "Rank", style);
    render_cell_text(frame, cols[1], "Team", style);
    render_cell_text(frame, cols[2], "Total Score", style);
    render_cell_text(frame, cols[3], "Points Last Check", style);
    render_cell_text(frame, cols[4], "Checked", style);
}

fn render_admin(frame: &mut Frame, area: Rect, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(10)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(36), Constraint::Min(30)])
        .split(rows[0]);

    let (busy, last) = app.action_state();
    let focused = app.state.admin_focus == AdminFocus::Actions;
    let mut lines: Vec<String> = AdminAction::ALL
        .iter()
        .enumerate()
        .map(|(idx, action)| {
            let cursor = if focused && idx == app.state.admin_selected { ">" } else { " " };
            format!("{cursor} {}", action.title())
        })
        .collect();
    lines.push(String::new());
    match &last {
        _ if busy => lines.push("Working...".to_string()),
        Op::Success(label) => lines.push(label.clone()),
        Op::Failure(err) => lines.push(format!("Error: {err}")),
        Op::Idle | Op::Pending => {}
    }
    let actions_style = match last {
        Op::Failure(_) if !busy => Style::default().fg(Color::Red),
        _ => Style::default(),
    };
    let actions = Paragraph::new(lines.join("\n"))
        .style(actions_style)
        .wrap(Wrap { trim: false })
        .block(Block::default().title("Admin Controls").borders(Borders::ALL));
    frame.render_widget(actions, columns[0]);

    let status_text = match app.status_state() {
        Some(feed) => {
            let mut text = String::new();
            if let Some(err) = feed.error() {
                text.push_str(&format!("Error: {err}\n\n"));
            }
            match feed.snapshot.as_ref() {
                Some(status) => {
                    if let Some(phase) = status.phase() {
                        text.push_str(&format!("Phase: {}\n", phase.label()));
                    }
                    text.push_str(&status.pretty());
                }
                None if feed.loading() => text.push_str("Loading status..."),
                None => text.push_str("No status available"),
            }
            text
        }
        None => String::new(),
    };
    let status = Paragraph::new(status_text)
        .wrap(Wrap { trim: false })
        .block(Block::default().title("System Status").borders(Borders::ALL));
    frame.render_widget(status, columns[1]);

    render_users(frame, rows[1], app);

    if let Some(prompt) = app.state.prompt.as_ref() {
        let popup = centered_rect(70, 20, area);
        let shown = match prompt.kind {
            PromptKind::AddUser => prompt.input.clone(),
            PromptKind::ChangePassword { .. } => "*".repeat(prompt.input.chars().count()),
        };
        frame.render_widget(Clear, popup);
        let input = Paragraph::new(format!("> {shown}"))
            .block(Block::default().title(prompt.title()).borders(Borders::ALL));
        frame.render_widget(input, popup);
    }
}

fn render_users(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.state.admin_focus == AdminFocus::Users;
    let text = match &app.state.users {
        Op::Idle => String::new(),
        Op::Pending => "Loading users...".to_string(),
        Op::Failure(err) => format!("Error: {err}"),
        Op::Success(users) if users.is_empty() => "No users".to_string(),
        Op::Success(users) => {
            let mut lines = vec![format!(
                "  {:<6} {:<16} {:<6} {:<10} {}",
                "ID", "Username", "Admin", "Blue Team", "Team"
            )];
            for (idx, user) in users.iter().enumerate() {
                let cursor = if focused && idx == app.state.users_selected { ">" } else { " " };
                let team = match user.blue_team_num.filter(|_| user.is_blue_team) {
                    Some(team) => team.to_string(),
                    None => "-".to_string(),
                };
                lines.push(format!(
                    "{cursor} {:<6} {:<16} {:<6} {:<10} {team}",
                    user.user_id,
                    user.username,
                    yes_no(user.is_admin),
                    yes_no(user.is_blue_team),
                ));
            }
            lines.join("\n")
        }
    };
    let users = Paragraph::new(text)
        .block(Block::default().title("Manage Users").borders(Borders::ALL));
    frame.render_widget(users, area);
}

fn render_details(frame: &mut Frame, area: Rect, app: &App, team_number: u32) {
    let Some(feed) = app.details_state() else {
        return;
    };
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);
    frame.render_widget(feed_status_line(&feed, "details"), sections[0]);

    let text = match feed.snapshot.as_ref() {
        Some(rows) if rows.is_empty() => format!("No check results for team {team_number} yet"),
        Some(rows) => {
            let mut lines = vec![format!(
                "{:<16} {:<22} {:<7} {:<6} {:>6}  {}",
                "Box", "Check", "Level", "Result", "Points", "Error"
            )];
            for row in rows {
                lines.push(format!(
                    "{:<16} {:<22} {:<7} {:<6} {:>6}  {}",
                    row.box_address,
                    row.check_name,
                    row.difficulty().label(),
                    if row.passed() { "PASS" } else { "FAIL" },
                    row.points,
                    row.error_message.as_deref().unwrap_or("-"),
                ));
            }
            lines.join("\n")
        }
        None => String::new(),
    };
    let details = Paragraph::new(text)
        .block(Block::default().title(format!("Team {team_number}")).borders(Borders::ALL));
    frame.render_widget(details, sections[1]);
}

fn feed_status_line<T>(feed: &FeedState<T>, what: &str) -> Paragraph<'static> {
    if feed.loading() {
        return Paragraph::new(format!("Loading {what}..."))
            .style(Style::default().fg(Color::DarkGray));
    }
    if let Some(err) = feed.error() {
        let suffix = if feed.snapshot.is_some() { " (showing last data)" } else { "" };
        return Paragraph::new(format!("Error: {err}{suffix}"))
            .style(Style::default().fg(Color::Red));
    }
    let updated = feed
        .updated_at
        .map(|t| t.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    Paragraph::new(format!("Last update: {updated}")).style(Style::default().fg(Color::DarkGray))
}

fn render_cell_text(frame: &mut Frame, area: Rect, text: &str, style: Style) {
    let text_area = Rect {
        x: area.x,
        y: area.y + (area.height / 2),
        width: area.width,
        height: 1,
    };
    let paragraph = Paragraph::new(text.to_string()).style(style);
    frame.render_widget(paragraph, text_area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No alerts yet".to_string();
    }
    let skip = state.logs.len().saturating_sub(3);
    state
        .logs
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "IOC Scoreboard - Help",
        "",
        "Global:",
        "  1            Scoreboard",
        "  2            Admin (admins only)",
        "  b / Esc      Back",
        "  r            Refresh now",
        "  o            Log out",
        "  ?            Toggle help",
        "  q / Ctrl-C   Quit",
        "",
        "Scoreboard:",
        "  j/k or ↑/↓   Move",
        "  Enter / d    Team details",
        "",
        "Admin:",
        "  Tab          Switch actions/users",
        "  Enter        Run selected action",
        "  a            Add user",
        "  p            Change selected user's password",
        "  x x          Delete selected user",
        "  Esc          Cancel prompt",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

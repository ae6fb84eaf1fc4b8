use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use ioc_scoreboard::api::{HttpApi, ScoreApi};
use ioc_scoreboard::config::Config;
use ioc_scoreboard::fake_api::{self, FakeApi};
use ioc_scoreboard::poller::Poller;
use ioc_scoreboard::session::SessionStore;
use ioc_scoreboard::state::ranked_teams;
use ioc_scoreboard::token_store;

const DEFAULT_CYCLES: u64 = 3;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let cycles = parse_u64_arg("--cycles").unwrap_or(DEFAULT_CYCLES).max(1);

    let api: Arc<dyn ScoreApi> = if config.demo {
        let fake = Arc::new(FakeApi::seeded());
        fake_api::spawn_auto_checks(fake.clone(), config.scoreboard_interval);
        fake
    } else {
        Arc::new(HttpApi::new(&config.api_url).context("build api client")?)
    };
    let tokens = token_store::for_config(&config);
    let session = Arc::new(SessionStore::new(api.clone(), tokens));

    session.initialize();
    if let (Ok(username), Ok(password)) = (
        std::env::var("SCOREBOARD_USER"),
        std::env::var("SCOREBOARD_PASSWORD"),
    ) {
        let user = session
            .login(&username, &password)
            .map_err(|err| anyhow!("{err}"))?;
        println!("Signed in as {}", user.username);
    } else if let Some(user) = session.user() {
        println!("Resumed session for {}", user.username);
    }

    let poller = Poller::start("scoreboard", config.scoreboard_interval, move || {
        api.scoreboard()
    });
    let handle = poller.handle();
    let budget = config
        .scoreboard_interval
        .saturating_mul(2)
        .saturating_add(Duration::from_secs(15));

    for cycle in 1..=cycles {
        if !handle.wait_for_cycles(cycle, budget) {
            return Err(anyhow!("scoreboard cycle {cycle} did not finish in {budget:?}"));
        }
        let state = handle.state();
        println!("--- cycle {cycle} ---");
        if let Some(err) = state.error() {
            println!("error: {err}");
        }
        let Some(snapshot) = state.snapshot.as_ref() else {
            continue;
        };
        for (rank, team) in ranked_teams(snapshot).iter().enumerate() {
            println!(
                "{:>2}. team{:<3} total={:<8} last={:+}",
                rank + 1,
                team.team_number,
                team.total_score,
                team.last_check_delta
            );
        }
        if let Some(updated) = snapshot.last_update.as_deref() {
            println!("last update: {updated}");
        }
    }

    poller.stop();
    Ok(())
}

fn parse_u64_arg(flag: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            return raw.trim().parse().ok();
        }
        if arg == flag {
            return args.get(idx + 1).and_then(|next| next.trim().parse().ok());
        }
    }
    None
}

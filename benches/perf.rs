use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use ioc_scoreboard::api::{parse_details_json, parse_scoreboard_json};
use ioc_scoreboard::models::{ScoreboardSnapshot, TeamScore};
use ioc_scoreboard::state::ranked_teams;

fn large_scoreboard_json(teams: u32) -> String {
    let rows = (1..=teams)
        .map(|team| {
            format!(
                r#"{{"teamNumber":{team},"totalScore":{},"lastCheckScore":{},"lastCheckTime":"2025-03-14T10:05:00Z"}}"#,
                (team * 37) % 1000,
                team % 20
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"teams":[{rows}]}}"#)
}

fn large_legacy_json(teams: u32, samples: usize) -> String {
    let times = (0..samples)
        .map(|i| format!("\"10:{:02}\"", i % 60))
        .collect::<Vec<_>>()
        .join(",");
    let series = (1..=teams)
        .map(|team| {
            let points = (0..samples)
                .map(|i| (i as u32 * team).to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!(r#""team{team}":[{points}]"#)
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"{{"time":[{times}],{series}}}"#)
}

fn bench_scoreboard_parse(c: &mut Criterion) {
    let raw = large_scoreboard_json(200);
    c.bench_function("scoreboard_parse", |b| {
        b.iter(|| {
            let snapshot = parse_scoreboard_json(black_box(&raw)).unwrap();
            black_box(snapshot.teams.len());
        })
    });
}

fn bench_legacy_scoreboard_parse(c: &mut Criterion) {
    let raw = large_legacy_json(50, 288);
    c.bench_function("legacy_scoreboard_parse", |b| {
        b.iter(|| {
            let snapshot = parse_scoreboard_json(black_box(&raw)).unwrap();
            black_box(snapshot.teams.len());
        })
    });
}

fn bench_ranking(c: &mut Criterion) {
    let snapshot = ScoreboardSnapshot {
        teams: (1..=500)
            .map(|team_number| TeamScore {
                team_number,
                total_score: i64::from((team_number * 7919) % 1000),
                last_check_delta: 0,
                last_check_at: None,
            })
            .collect(),
        last_update: None,
    };
    c.bench_function("ranked_teams", |b| {
        b.iter(|| {
            let ranked = ranked_teams(black_box(&snapshot));
            black_box(ranked.first().map(|t| t.team_number));
        })
    });
}

fn bench_details_parse(c: &mut Criterion) {
    c.bench_function("details_parse", |b| {
        b.iter(|| {
            let rows = parse_details_json(black_box(DETAILS_JSON)).unwrap();
            black_box(rows.len());
        })
    });
}

criterion_group!(
    perf,
    bench_scoreboard_parse,
    bench_legacy_scoreboard_parse,
    bench_ranking,
    bench_details_parse
);
criterion_main!(perf);

static DETAILS_JSON: &str = include_str!("../tests/fixtures/details.json");

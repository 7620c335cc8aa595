//! End-to-end replay of a recorded session through the full pipeline

use pit_strategy::domain::{Classification, CycleReport, DriverId, KartId, Verdict};
use pit_strategy::infra::{Config, Metrics};
use pit_strategy::io::{read_last_report, FeedSource, ReplaySource, ReportEgress};
use pit_strategy::services::StrategyEngine;
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

const SAMPLE_SESSION: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/sample_session.jsonl");

async fn replay_all(source: &mut dyn FeedSource, engine: &mut StrategyEngine) -> Vec<CycleReport> {
    let mut reports = Vec::new();
    while let Some(rows) = source.next_batch().await.unwrap() {
        reports.push(engine.process_batch(&rows));
    }
    reports
}

#[tokio::test]
async fn test_sample_session_ends_with_box_call() {
    let metrics = Arc::new(Metrics::new());
    let mut engine = StrategyEngine::new(Config::default(), metrics.clone());
    let mut source = ReplaySource::open(SAMPLE_SESSION).await.unwrap();

    let reports = replay_all(&mut source, &mut engine).await;
    assert_eq!(reports.len(), 12);

    // Kart 1 comes in with Ana on her usual pace
    let pit_in = &reports[5];
    assert_eq!(pit_in.stats.stints_scored, 1);
    assert_eq!(pit_in.queue.len(), 1);
    assert_eq!(pit_in.queue[0].kart_id, KartId::new("1"));
    assert_eq!(pit_in.queue[0].classification, Classification::Neutral);
    assert_eq!(pit_in.verdict, Verdict::StayOut);

    // Cara takes kart 1 back out
    assert!(reports[7].queue.is_empty());
    assert_eq!(reports[7].verdict, Verdict::NoKartsAvailable);

    // A row without a kart number is dropped, the rest of the batch counts
    assert_eq!(reports[8].stats.malformed_rows, 1);
    assert_eq!(reports[8].stats.laps_recorded, 3);

    // Kart 7 ran well under Ana's baseline
    let rocket = &reports[9];
    assert_eq!(rocket.queue.len(), 1);
    assert_eq!(rocket.queue[0].classification, Classification::Rocket);
    assert!((rocket.queue[0].score + 0.667).abs() < 1e-3, "score was {}", rocket.queue[0].score);

    // Empty batch and repeated pit rows leave the call unchanged
    let last = reports.last().unwrap();
    assert_eq!(reports[10].stats.rows, 0);
    assert_eq!(last.queue.len(), 1);
    match &last.verdict {
        Verdict::BoxNow { kart_id, driver_id, score } => {
            assert_eq!(kart_id, &KartId::new("7"));
            assert_eq!(driver_id, &DriverId::new("Ana Lopez"));
            assert!(*score < -0.6);
        }
        other => panic!("expected BoxNow, got {:?}", other),
    }

    assert_eq!(metrics.stints_scored(), 2);
    assert_eq!(metrics.rows_malformed(), 1);
    assert_eq!(metrics.batches_total(), 12);
}

#[tokio::test]
async fn test_reports_written_and_read_back() {
    let dir = tempdir().unwrap();
    let report_path = dir.path().join("out").join("reports.jsonl");
    let egress = ReportEgress::new(report_path.to_str().unwrap());

    let mut engine = StrategyEngine::new(Config::default(), Arc::new(Metrics::new()));
    let mut source = ReplaySource::open(SAMPLE_SESSION).await.unwrap();

    let mut written = 0;
    while let Some(rows) = source.next_batch().await.unwrap() {
        let report = engine.process_batch(&rows);
        assert!(egress.write_report(&report));
        written += 1;
    }

    let content = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(content.lines().count(), written);

    let last = read_last_report(&report_path).unwrap().unwrap();
    assert_eq!(last.cycle, written as u64);
    assert_eq!(last.verdict.as_str(), "box_now");
}

#[tokio::test]
async fn test_short_stint_for_new_driver_not_queued() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"[{{"Number":"4","DriverName":"New Driver","LastLapTime":"45.1","Laps":1}}]"#).unwrap();
    writeln!(file, r#"[{{"Number":"4","DriverName":"New Driver","LastLapTime":"44.8","Laps":2}}]"#).unwrap();
    writeln!(file, r#"[{{"Number":"4","DriverName":"New Driver","LastLapTime":"44.8","Laps":2,"Status":"PIT"}}]"#)
        .unwrap();

    let mut engine = StrategyEngine::new(Config::default(), Arc::new(Metrics::new()));
    let mut source = ReplaySource::open(file.path()).await.unwrap();
    let reports = replay_all(&mut source, &mut engine).await;

    let last = reports.last().unwrap();
    assert!(last.queue.is_empty());
    assert_eq!(last.stats.stints_scored, 0);
    assert_eq!(last.verdict, Verdict::NoKartsAvailable);
}

#[tokio::test]
async fn test_repeated_lap_reports_counted_once() {
    let mut file = NamedTempFile::new().unwrap();
    for _ in 0..3 {
        writeln!(file, r#"[{{"Number":"9","DriverName":"Eve","LastLapTime":"40.5","Laps":7}}]"#).unwrap();
    }

    let mut engine = StrategyEngine::new(Config::default(), Arc::new(Metrics::new()));
    let mut source = ReplaySource::open(file.path()).await.unwrap();
    let reports = replay_all(&mut source, &mut engine).await;

    let recorded: usize = reports.iter().map(|r| r.stats.laps_recorded).sum();
    assert_eq!(recorded, 1);
    assert_eq!(engine.baselines().get(&DriverId::new("Eve")).map(|b| b.len()), Some(1));
}

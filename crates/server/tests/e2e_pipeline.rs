//! End-to-end tests driving the full C4(simulated)->C3->C2->C5->C6->C7
//! pipeline plus the C9/C10 push path through their public APIs, the way a
//! real deployment would exercise them (file on disk -> orchestrator ->
//! store -> subscriber). Unit tests inside each module already cover the
//! component-level seed scenarios (S1-S4); these cover the two
//! multi-component scenarios (S5 cross-file merge, S6 live subscriber).

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use sessionlens_core::metrics::EfficiencyConfig;
use sessionlens_core::watcher::{EventKind, FileEvent};
use sessionlens_server::{EventBus, Orchestrator, PushBroadcaster, Store};
use tempfile::tempdir;
use tokio::sync::mpsc;

fn new_store() -> Arc<Store> {
    Arc::new(Store::new(
        Arc::new(EventBus::new(100, 256)),
        300,
        EfficiencyConfig::default(),
    ))
}

fn session_line(kind: &str, uuid: &str, ts: &str, body: &str) -> String {
    format!(
        r#"{{"type":"{kind}","uuid":"{uuid}","sessionId":"s-cross-file","timestamp":"{ts}","cwd":"/home/x/proj","message":{body}}}"#
    )
}

/// Waits until `pred` returns true or the timeout elapses, polling the store
/// rather than sleeping a fixed amount (the orchestrator runs on its own task).
async fn wait_until(mut pred: impl FnMut() -> bool) {
    for _ in 0..200 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}

async fn run_and_feed(store: Arc<Store>, paths: Vec<std::path::PathBuf>) {
    let (tx, rx) = mpsc::channel(16);
    let orch = Orchestrator::new(store, 500, 200);
    tokio::spawn(orch.run(rx));
    for path in paths {
        tx.send(FileEvent {
            kind: EventKind::Added,
            path,
            session_id: "s-cross-file".to_string(),
        })
        .await
        .unwrap();
    }
}

/// (S5) A session spans two files, both carrying entries for the same
/// sessionId, interleaved in time. Processing order F2-then-F1 must produce
/// the same turn list as F1-then-F2.
#[tokio::test]
async fn seed_scenario_s5_cross_file_merge_is_order_insensitive() {
    let dir = tempdir().unwrap();
    let f1 = dir.path().join("F1.jsonl");
    let f2 = dir.path().join("F2.jsonl");

    // F1 carries turn 1 (earlier timestamps), F2 carries turn 2 (later).
    std::fs::write(
        &f1,
        format!(
            "{}\n{}\n",
            session_line(
                "user",
                "u1",
                "2026-01-01T00:00:00Z",
                r#"{"role":"user","content":"hi"}"#
            ),
            session_line(
                "assistant",
                "a1",
                "2026-01-01T00:00:01Z",
                r#"{"role":"assistant","content":[{"type":"text","text":"hello"}],"usage":{"input_tokens":10,"output_tokens":5},"model":"claude-3-5-sonnet"}"#
            ),
        ),
    )
    .unwrap();
    std::fs::write(
        &f2,
        format!(
            "{}\n{}\n",
            session_line(
                "user",
                "u2",
                "2026-01-01T00:01:00Z",
                r#"{"role":"user","content":"continue"}"#
            ),
            session_line(
                "assistant",
                "a2",
                "2026-01-01T00:01:01Z",
                r#"{"role":"assistant","content":[{"type":"text","text":"done"}],"usage":{"input_tokens":20,"output_tokens":8},"model":"claude-3-5-sonnet"}"#
            ),
        ),
    )
    .unwrap();

    let store_f1_then_f2 = new_store();
    run_and_feed(store_f1_then_f2.clone(), vec![f1.clone(), f2.clone()]).await;
    wait_until(|| store_f1_then_f2.get_session("s-cross-file").map(|s| s.turn_count).unwrap_or(0) == 2).await;

    let store_f2_then_f1 = new_store();
    run_and_feed(store_f2_then_f1.clone(), vec![f2.clone(), f1.clone()]).await;
    wait_until(|| store_f2_then_f1.get_session("s-cross-file").map(|s| s.turn_count).unwrap_or(0) == 2).await;

    let (turns_a, _) = store_f1_then_f2.get_session_turns("s-cross-file", 0, 10);
    let (turns_b, _) = store_f2_then_f1.get_session_turns("s-cross-file", 0, 10);

    assert_eq!(turns_a.len(), turns_b.len());
    for (a, b) in turns_a.iter().zip(turns_b.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.turn_number, b.turn_number);
        assert_eq!(a.user_message, b.user_message);
        assert_eq!(a.assistant_message, b.assistant_message);
        assert_eq!(a.usage.total(), b.usage.total());
    }
}

/// (S6) A subscriber connected with a sessionFilter sees `connected`, then a
/// `session-snapshot` for the existing turn; once a new turn lands it sees
/// `turn-new` followed by `metrics`. An unfiltered subscriber sees the same
/// plus the corresponding `session-update`.
#[tokio::test]
async fn seed_scenario_s6_subscriber_sees_snapshot_then_new_turn() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("S.jsonl");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "{}",
        session_line(
            "user",
            "u1",
            "2026-01-01T00:00:00Z",
            r#"{"role":"user","content":"hi"}"#
        )
    )
    .unwrap();
    writeln!(
        f,
        "{}",
        session_line(
            "assistant",
            "a1",
            "2026-01-01T00:00:01Z",
            r#"{"role":"assistant","content":[{"type":"text","text":"hello"}],"usage":{"input_tokens":10,"output_tokens":5},"model":"claude-3-5-sonnet"}"#
        )
    )
    .unwrap();
    drop(f);

    let bus = Arc::new(EventBus::new(100, 256));
    let store = Arc::new(Store::new(Arc::clone(&bus), 300, EfficiencyConfig::default()));
    let push = Arc::new(PushBroadcaster::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Duration::from_secs(30),
        16,
    ));

    let (tx, rx) = mpsc::channel(16);
    let orch = Orchestrator::new(Arc::clone(&store), 500, 200);
    tokio::spawn(orch.run(rx));
    tx.send(FileEvent {
        kind: EventKind::Added,
        path: path.clone(),
        session_id: "s-cross-file".to_string(),
    })
    .await
    .unwrap();
    wait_until(|| store.get_session("s-cross-file").map(|s| s.turn_count).unwrap_or(0) == 1).await;

    let (_filtered_id, mut filtered_rx) = push.subscribe(Some("s-cross-file".to_string())).unwrap();
    let (_open_id, mut open_rx) = push.subscribe(None).unwrap();

    assert_eq!(filtered_rx.recv().await.unwrap().kind(), "connected");
    assert_eq!(filtered_rx.recv().await.unwrap().kind(), "session-snapshot");
    assert_eq!(open_rx.recv().await.unwrap().kind(), "connected");
    assert_eq!(open_rx.recv().await.unwrap().kind(), "session-snapshot");

    // Append the second human message + assistant reply (S3).
    writeln!(
        std::fs::OpenOptions::new().append(true).open(&path).unwrap(),
        "{}",
        session_line(
            "user",
            "u2",
            "2026-01-01T00:01:00Z",
            r#"{"role":"user","content":"more"}"#
        )
    )
    .unwrap();
    writeln!(
        std::fs::OpenOptions::new().append(true).open(&path).unwrap(),
        "{}",
        session_line(
            "assistant",
            "a2",
            "2026-01-01T00:01:01Z",
            r#"{"role":"assistant","content":[{"type":"text","text":"more done"}],"usage":{"input_tokens":20,"output_tokens":8},"model":"claude-3-5-sonnet"}"#
        )
    )
    .unwrap();
    tx.send(FileEvent {
        kind: EventKind::Changed,
        path,
        session_id: "s-cross-file".to_string(),
    })
    .await
    .unwrap();
    wait_until(|| store.get_session("s-cross-file").map(|s| s.turn_count).unwrap_or(0) == 2).await;

    let filtered_next = tokio::time::timeout(Duration::from_secs(1), filtered_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(filtered_next.kind(), "turn-new");
    let filtered_after = tokio::time::timeout(Duration::from_secs(1), filtered_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(filtered_after.kind(), "metrics");

    // The open subscriber sees turn-new/metrics too, plus a session-update
    // somewhere in the mix (order between the two isn't spec'd beyond both
    // arriving after the snapshot).
    let mut seen_kinds = Vec::new();
    for _ in 0..3 {
        let msg = tokio::time::timeout(Duration::from_secs(1), open_rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen_kinds.push(msg.kind().to_string());
    }
    assert!(seen_kinds.contains(&"turn-new".to_string()));
    assert!(seen_kinds.contains(&"metrics".to_string()));
    assert!(seen_kinds.contains(&"session-update".to_string()));
}

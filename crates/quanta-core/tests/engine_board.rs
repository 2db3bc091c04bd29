use async_trait::async_trait;
use quanta_core::config::BoardSettings;
use quanta_core::model::Subject;
use quanta_core::providers::{EngineClient, EnginePayload};
use quanta_core::{EngineBoard, EngineRegistry, EngineRunOutcome, EngineSpec, EngineState, Grade};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
enum Step {
    Score(i64),
    Labelled(i64, &'static str),
    Fail(&'static str),
    /// Waits for the gate to open, then scores.
    Gated(Arc<Notify>, i64),
}

#[derive(Default)]
struct ScriptedEngines {
    steps: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedEngines {
    fn with(self, key: &str, steps: Vec<Step>) -> Self {
        self.steps.lock().unwrap().insert(key.to_string(), steps);
        self
    }

    fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }
}

#[async_trait]
impl EngineClient for ScriptedEngines {
    async fn invoke(
        &self,
        engine: &EngineSpec,
        subject: &Subject,
    ) -> anyhow::Result<EnginePayload> {
        self.calls
            .lock()
            .unwrap()
            .push((engine.key.clone(), subject.id.clone()));

        let step = {
            let mut steps = self.steps.lock().unwrap();
            match steps.get_mut(&engine.key) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Step::Score(50),
            }
        };

        match step {
            Step::Score(score) => Ok(EnginePayload {
                score,
                status_label: None,
            }),
            Step::Labelled(score, label) => Ok(EnginePayload {
                score,
                status_label: Some(label.to_string()),
            }),
            Step::Fail(msg) => anyhow::bail!("{}", msg),
            Step::Gated(gate, score) => {
                gate.notified().await;
                Ok(EnginePayload {
                    score,
                    status_label: None,
                })
            }
        }
    }
}

fn short_form(id: &str) -> Subject {
    Subject {
        id: id.into(),
        title: "Five knots every sailor needs".into(),
        description: String::new(),
        tags: vec!["sailing".into()],
        view_count: 1200,
        like_count: 80,
        comment_count: 4,
        duration_secs: 45,
    }
}

fn long_form(id: &str) -> Subject {
    Subject {
        duration_secs: 1260,
        ..short_form(id)
    }
}

fn board(client: Arc<ScriptedEngines>) -> EngineBoard {
    EngineBoard::new(EngineRegistry::default(), client, BoardSettings::default())
}

fn scripted_seven(gate: Arc<Notify>) -> ScriptedEngines {
    ScriptedEngines::default()
        .with("title", vec![Step::Score(82)])
        .with("hook", vec![Step::Score(74)])
        .with("retention", vec![Step::Score(68)])
        .with("seo", vec![Step::Score(90)])
        .with("thumbnail", vec![Step::Score(85)])
        .with("momentum", vec![Step::Score(77)])
        .with("shorts_loop", vec![Step::Gated(gate, 55)])
}

#[tokio::test]
async fn composite_updates_as_engines_report() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(scripted_seven(gate.clone()));
    let board = board(client.clone());
    board.open(short_form("sub-1"));
    assert_eq!(board.applicable_engines().len(), 7);

    let launch = board.run_all_remaining();
    assert_eq!(launch.keys.len(), 7);
    let mut rx = board.subscribe();
    rx.wait_for(|s| s.results.len() == 6).await?;

    let partial = board.composite();
    assert_eq!((partial.completed, partial.applicable), (6, 7));
    assert_eq!(partial.score, Some(79));
    assert_eq!(partial.grade, Some(Grade::B));
    assert!(partial.weak_engines.is_empty());
    assert_eq!(board.engine_state("shorts_loop"), EngineState::Loading);

    gate.notify_one();
    let outcomes = launch.join_all().await;
    assert_eq!(outcomes.len(), 7);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, EngineRunOutcome::Scored(_))));

    let full = board.composite();
    assert!(full.is_complete());
    assert_eq!(full.completion_ratio(), 1.0);
    assert_eq!(full.score, Some(76));
    assert_eq!(full.grade, Some(Grade::B));
    assert_eq!(full.weak_engines, vec!["retention", "shorts_loop"]);
    assert!(board.snapshot().loading.is_empty());
    Ok(())
}

#[tokio::test]
async fn long_form_subject_excludes_short_only_engine() -> anyhow::Result<()> {
    let client = Arc::new(ScriptedEngines::default());
    let board = board(client.clone());
    board.open(long_form("sub-2"));

    let keys: Vec<String> = board.applicable_engines().into_iter().map(|e| e.key).collect();
    assert_eq!(keys.len(), 6);
    assert!(!keys.contains(&"shorts_loop".to_string()));

    let err = board.run("shorts_loop").await.unwrap_err();
    assert!(err.to_string().contains("does not apply"), "{}", err);
    assert_eq!(client.calls_for("shorts_loop"), 0);

    let launch = board.run_all_remaining();
    assert!(!launch.keys.contains(&"shorts_loop".to_string()));
    launch.join_all().await;
    assert_eq!(board.composite().applicable, 6);
    Ok(())
}

#[tokio::test]
async fn second_run_of_a_loading_engine_is_rejected() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(
        ScriptedEngines::default().with("hook", vec![Step::Gated(gate.clone(), 64)]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-3"));

    let first = {
        let board = board.clone();
        tokio::spawn(async move { board.run("hook").await })
    };
    let mut rx = board.subscribe();
    rx.wait_for(|s| s.loading.contains("hook")).await?;

    let second = board.run("hook").await?;
    assert_eq!(
        second,
        EngineRunOutcome::AlreadyLoading {
            engine_key: "hook".into()
        }
    );

    gate.notify_one();
    let outcome = first.await??;
    assert!(matches!(outcome, EngineRunOutcome::Scored(ref r) if r.score == 64));
    assert_eq!(client.calls_for("hook"), 1);
    Ok(())
}

#[tokio::test]
async fn failed_rerun_keeps_previous_result() -> anyhow::Result<()> {
    let client = Arc::new(
        ScriptedEngines::default().with("seo", vec![Step::Score(71), Step::Fail("engine 503")]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-4"));

    board.run("seo").await?;
    let outcome = board.run("seo").await?;

    let EngineRunOutcome::Failed { engine_key, message } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert_eq!(engine_key, "seo");
    assert!(message.contains("engine 503"));

    let EngineState::Scored(kept) = board.engine_state("seo") else {
        panic!("previous result should survive a failed rerun");
    };
    assert_eq!(kept.score, 71);
    assert_eq!(
        board.snapshot().last_errors.get("seo").map(String::as_str),
        Some("engine 503")
    );
    Ok(())
}

#[tokio::test]
async fn failed_engine_stays_not_run_and_is_retried_by_run_all() -> anyhow::Result<()> {
    let client = Arc::new(
        ScriptedEngines::default().with("title", vec![Step::Fail("timeout"), Step::Score(88)]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-5"));

    board.run_all_remaining().join_all().await;
    assert_eq!(board.engine_state("title"), EngineState::NotRun);
    assert_eq!(board.composite().completed, 6);

    let retry = board.run_all_remaining();
    assert_eq!(retry.keys, vec!["title".to_string()]);
    retry.join_all().await;

    assert!(board.composite().is_complete());
    assert!(board.snapshot().last_errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn run_all_remaining_fires_exactly_the_unscored_idle_engines() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(
        ScriptedEngines::default().with("retention", vec![Step::Gated(gate.clone(), 40)]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-6"));

    board.run("title").await?;
    board.run("hook").await?;
    let retention = {
        let board = board.clone();
        tokio::spawn(async move { board.run("retention").await })
    };
    board
        .subscribe()
        .wait_for(|s| s.loading.contains("retention"))
        .await?;

    let launch = board.run_all_remaining();
    let mut keys = launch.keys.clone();
    keys.sort();
    assert_eq!(keys, vec!["momentum", "seo", "shorts_loop", "thumbnail"]);
    for key in &launch.keys {
        assert_eq!(board.engine_state(key), EngineState::Loading);
    }

    launch.join_all().await;
    gate.notify_one();
    retention.await??;

    assert!(board.run_all_remaining().keys.is_empty());
    for key in ["title", "hook", "retention", "seo", "thumbnail", "momentum", "shorts_loop"] {
        assert_eq!(client.calls_for(key), 1, "{} ran more than once", key);
    }
    Ok(())
}

#[tokio::test]
async fn response_for_previous_subject_is_discarded() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(
        ScriptedEngines::default().with("thumbnail", vec![Step::Gated(gate.clone(), 93)]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-7"));

    let slow = {
        let board = board.clone();
        tokio::spawn(async move { board.run("thumbnail").await })
    };
    board
        .subscribe()
        .wait_for(|s| s.loading.contains("thumbnail"))
        .await?;

    board.open(short_form("sub-8"));
    gate.notify_one();

    let outcome = slow.await??;
    assert_eq!(
        outcome,
        EngineRunOutcome::Discarded {
            engine_key: "thumbnail".into()
        }
    );
    let snap = board.snapshot();
    assert_eq!(snap.subject.map(|s| s.id), Some("sub-8".to_string()));
    assert!(snap.results.is_empty());
    assert!(snap.loading.is_empty());
    Ok(())
}

#[tokio::test]
async fn out_of_range_score_is_a_failure_not_a_result() -> anyhow::Result<()> {
    let client = Arc::new(
        ScriptedEngines::default()
            .with("momentum", vec![Step::Score(140)])
            .with("hook", vec![Step::Score(-3)]),
    );
    let board = board(client);
    board.open(short_form("sub-9"));

    for key in ["momentum", "hook"] {
        let outcome = board.run(key).await?;
        let EngineRunOutcome::Failed { message, .. } = outcome else {
            panic!("expected failure for {}, got {:?}", key, outcome);
        };
        assert!(message.contains("expected 0..=100"), "{}", message);
        assert_eq!(board.engine_state(key), EngineState::NotRun);
    }
    assert_eq!(board.composite().score, None);
    Ok(())
}

#[tokio::test]
async fn status_label_is_kept_with_the_score() -> anyhow::Result<()> {
    let client = Arc::new(
        ScriptedEngines::default().with("momentum", vec![Step::Labelled(62, "cooling")]),
    );
    let board = board(client);
    board.open(short_form("sub-10"));

    let EngineRunOutcome::Scored(result) = board.run("momentum").await? else {
        panic!("momentum should score");
    };
    assert_eq!(result.score, 62);
    assert_eq!(result.status_label.as_deref(), Some("cooling"));
    Ok(())
}

#[tokio::test]
async fn caller_mistakes_are_errors() {
    let board = board(Arc::new(ScriptedEngines::default()));

    let err = board.run("title").await.unwrap_err();
    assert!(err.to_string().contains("no subject open"));
    assert!(board.run_all_remaining().keys.is_empty());

    board.open(short_form("sub-11"));
    let err = board.run("virality").await.unwrap_err();
    assert_eq!(err.to_string(), "unknown engine 'virality'");
}

#[tokio::test]
async fn editing_duration_past_short_form_drops_short_only_result() -> anyhow::Result<()> {
    let client = Arc::new(ScriptedEngines::default());
    let board = board(client);
    board.open(short_form("sub-12"));
    board.run_all_remaining().join_all().await;
    assert_eq!(board.composite().completed, 7);
    let generation = board.snapshot().generation;

    board.update_subject(long_form("sub-12"));

    let snap = board.snapshot();
    assert_eq!(snap.generation, generation);
    assert!(!snap.results.contains_key("shorts_loop"));
    assert_eq!(snap.results.len(), 6);
    assert!(board.composite().is_complete());
    Ok(())
}

#[tokio::test]
async fn close_clears_the_board() -> anyhow::Result<()> {
    let board = board(Arc::new(ScriptedEngines::default()));
    board.open(short_form("sub-13"));
    board.run("title").await?;

    board.close();
    let snap = board.snapshot();
    assert!(snap.subject.is_none());
    assert!(snap.results.is_empty());
    assert!(snap.applicable.is_empty());
    assert_eq!(board.composite().score, None);
    Ok(())
}

#[tokio::test]
async fn dropped_launch_keeps_engines_running() -> anyhow::Result<()> {
    let client = Arc::new(ScriptedEngines::default().with("title", vec![Step::Score(81)]));
    let board = board(client.clone());
    board.open(short_form("sub-14"));

    let _ = board.run_all_remaining();
    board
        .subscribe()
        .wait_for(|s| s.results.len() == 7 && s.loading.is_empty())
        .await?;

    let EngineState::Scored(title) = board.engine_state("title") else {
        panic!("title should have scored");
    };
    assert_eq!(title.score, 81);
    assert!(board.composite().is_complete());
    assert_eq!(client.calls_for("title"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropped_run_releases_the_loading_flag() -> anyhow::Result<()> {
    let never = Arc::new(Notify::new());
    let client = Arc::new(
        ScriptedEngines::default().with("hook", vec![Step::Gated(never, 10), Step::Score(73)]),
    );
    let board = board(client.clone());
    board.open(short_form("sub-15"));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), board.run("hook")).await;
    assert!(abandoned.is_err(), "gated engine should still be waiting");
    assert_eq!(board.engine_state("hook"), EngineState::NotRun);
    assert!(board.snapshot().loading.is_empty());

    let EngineRunOutcome::Scored(result) = board.run("hook").await? else {
        panic!("hook should run again once the first call was dropped");
    };
    assert_eq!(result.score, 73);
    assert_eq!(client.calls_for("hook"), 2);
    Ok(())
}

#[tokio::test]
async fn format_flip_mid_flight_does_not_clear_the_newer_call() -> anyhow::Result<()> {
    let first_gate = Arc::new(Notify::new());
    let second_gate = Arc::new(Notify::new());
    let client = Arc::new(ScriptedEngines::default().with(
        "shorts_loop",
        vec![
            Step::Gated(first_gate.clone(), 40),
            Step::Gated(second_gate.clone(), 65),
        ],
    ));
    let board = board(client.clone());
    board.open(short_form("sub-16"));
    let mut rx = board.subscribe();

    let first = {
        let board = board.clone();
        tokio::spawn(async move { board.run("shorts_loop").await })
    };
    rx.wait_for(|s| s.loading.contains("shorts_loop")).await?;

    board.update_subject(long_form("sub-16"));
    assert!(board.snapshot().loading.is_empty());
    board.update_subject(short_form("sub-16"));

    let second = {
        let board = board.clone();
        tokio::spawn(async move { board.run("shorts_loop").await })
    };
    rx.wait_for(|s| s.loading.contains("shorts_loop")).await?;

    first_gate.notify_one();
    let outcome = first.await??;
    assert_eq!(
        outcome,
        EngineRunOutcome::Discarded {
            engine_key: "shorts_loop".into()
        }
    );
    assert_eq!(board.engine_state("shorts_loop"), EngineState::Loading);
    assert_eq!(
        board.run("shorts_loop").await?,
        EngineRunOutcome::AlreadyLoading {
            engine_key: "shorts_loop".into()
        }
    );

    second_gate.notify_one();
    let outcome = second.await??;
    assert!(matches!(outcome, EngineRunOutcome::Scored(ref r) if r.score == 65));
    assert!(board.snapshot().loading.is_empty());
    assert_eq!(client.calls_for("shorts_loop"), 2);
    Ok(())
}

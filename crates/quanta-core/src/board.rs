//! EngineBoard: independent scoring engines for the subject in view, plus the
//! live composite over whichever of them have reported.
//!
//! Engines never wait on each other. Per engine key, a second `run` while one
//! is loading is rejected rather than queued. Results are a session cache:
//! opening another subject (or closing the board) drops them, and any
//! response that arrives for a previous subject is discarded.
//!
//! Every accepted invocation holds a [`Ticket`] carrying a per-key token. Only
//! the ticket whose token still owns `loading[key]` may settle it, and a
//! ticket dropped before settling (future dropped, task aborted) releases it.

use crate::config::BoardSettings;
use crate::errors::ClientError;
use crate::model::{EngineResult, Subject};
use crate::providers::EngineClient;
use crate::registry::{EngineRegistry, EngineSpec};
use crate::scoring::{self, Composite};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Board state for the subject in view. Published read-only to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineBoardState {
    pub subject: Option<Subject>,
    /// Bumped whenever the subject changes; stale responses carry an older value.
    pub generation: u64,
    pub applicable: Vec<EngineSpec>,
    pub results: BTreeMap<String, EngineResult>,
    pub loading: BTreeSet<String>,
    /// Last failure per engine, cleared on the next success.
    pub last_errors: BTreeMap<String, String>,
    /// Token of the invocation that owns each `loading` entry.
    #[serde(skip)]
    owners: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    NotRun,
    Loading,
    Scored(EngineResult),
}

impl EngineBoardState {
    pub fn engine_state(&self, key: &str) -> EngineState {
        if self.loading.contains(key) {
            EngineState::Loading
        } else if let Some(r) = self.results.get(key) {
            EngineState::Scored(r.clone())
        } else {
            EngineState::NotRun
        }
    }

    fn is_applicable(&self, key: &str) -> bool {
        self.applicable.iter().any(|e| e.key == key)
    }

    fn claim(&mut self, key: &str, token: u64) {
        self.loading.insert(key.to_string());
        self.owners.insert(key.to_string(), token);
    }

    /// Drops `loading[key]` if `token` still owns it.
    fn release(&mut self, key: &str, token: u64) -> bool {
        if self.owners.get(key) != Some(&token) {
            return false;
        }
        self.owners.remove(key);
        self.loading.remove(key);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRunOutcome {
    Scored(EngineResult),
    /// The invocation failed; any earlier result for the engine is kept.
    Failed { engine_key: String, message: String },
    /// Rejected because the same engine is already running for this subject.
    AlreadyLoading { engine_key: String },
    /// The subject changed while the engine was running; the response was dropped.
    Discarded { engine_key: String },
}

impl EngineRunOutcome {
    pub fn engine_key(&self) -> &str {
        match self {
            EngineRunOutcome::Scored(r) => &r.engine_key,
            EngineRunOutcome::Failed { engine_key, .. }
            | EngineRunOutcome::AlreadyLoading { engine_key }
            | EngineRunOutcome::Discarded { engine_key } => engine_key,
        }
    }
}

/// Engines fired by [`EngineBoard::run_all_remaining`].
///
/// The engines run detached: dropping this leaves them running and their
/// results still land on the board.
#[must_use = "the engines keep running; call join_all to wait for their outcomes"]
pub struct RemainingLaunch {
    pub keys: Vec<String>,
    handles: Vec<JoinHandle<EngineRunOutcome>>,
}

impl RemainingLaunch {
    /// Waits for every launched engine, in launch order.
    pub async fn join_all(self) -> Vec<EngineRunOutcome> {
        let mut out = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(outcome) => out.push(outcome),
                Err(e) => warn!(error = %e, "engine task aborted"),
            }
        }
        out
    }
}

/// Permission to run one engine, issued when its loading flag was set.
struct Ticket {
    board: EngineBoard,
    generation: u64,
    token: u64,
    subject: Subject,
    engine: EngineSpec,
    settled: bool,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let (generation, token, key) = (self.generation, self.token, &self.engine.key);
        let released = self
            .board
            .inner
            .state
            .send_if_modified(|s| s.generation == generation && s.release(key, token));
        if released {
            debug!(engine = %key, "engine invocation dropped, loading flag released");
        }
    }
}

#[derive(Clone)]
pub struct EngineBoard {
    inner: Arc<BoardInner>,
}

struct BoardInner {
    registry: EngineRegistry,
    client: Arc<dyn EngineClient>,
    settings: BoardSettings,
    state: watch::Sender<EngineBoardState>,
    next_token: AtomicU64,
}

impl EngineBoard {
    pub fn new(
        registry: EngineRegistry,
        client: Arc<dyn EngineClient>,
        settings: BoardSettings,
    ) -> Self {
        let (state, _) = watch::channel(EngineBoardState::default());
        Self {
            inner: Arc::new(BoardInner {
                registry,
                client,
                settings,
                state,
                next_token: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineBoardState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> EngineBoardState {
        self.inner.state.borrow().clone()
    }

    pub fn applicable_engines(&self) -> Vec<EngineSpec> {
        self.inner.state.borrow().applicable.clone()
    }

    pub fn engine_state(&self, key: &str) -> EngineState {
        self.inner.state.borrow().engine_state(key)
    }

    pub fn composite(&self) -> Composite {
        let s = self.inner.state.borrow();
        scoring::composite(&s.applicable, &s.results, &self.inner.settings)
    }

    /// Shows `subject`, discarding everything known about the previous one.
    pub fn open(&self, subject: Subject) {
        let format = subject.format_type(self.inner.settings.short_form_max_secs);
        let applicable = self.inner.registry.applicable(format);
        info!(
            subject_id = %subject.id,
            format = format.as_str(),
            engines = applicable.len(),
            "engine board opened"
        );
        self.inner.state.send_modify(|s| {
            *s = EngineBoardState {
                subject: Some(subject),
                generation: s.generation + 1,
                applicable,
                ..EngineBoardState::default()
            };
        });
    }

    /// Replaces the fields of the subject in view after an edit, keeping results.
    ///
    /// A different subject id is treated as [`open`](Self::open). Engines that
    /// stop applying (e.g. the duration moved past the short-form limit) lose
    /// their results.
    pub fn update_subject(&self, subject: Subject) {
        let same = self
            .inner
            .state
            .borrow()
            .subject
            .as_ref()
            .is_some_and(|s| s.id == subject.id);
        if !same {
            self.open(subject);
            return;
        }

        let format = subject.format_type(self.inner.settings.short_form_max_secs);
        let applicable = self.inner.registry.applicable(format);
        self.inner.state.send_modify(|s| {
            let keep: BTreeSet<String> = applicable.iter().map(|e| e.key.clone()).collect();
            s.results.retain(|k, _| keep.contains(k));
            s.last_errors.retain(|k, _| keep.contains(k));
            s.loading.retain(|k| keep.contains(k));
            s.owners.retain(|k, _| keep.contains(k));
            s.applicable = applicable;
            s.subject = Some(subject);
        });
    }

    pub fn close(&self) {
        self.inner.state.send_modify(|s| {
            *s = EngineBoardState {
                generation: s.generation + 1,
                ..EngineBoardState::default()
            };
        });
    }

    /// Runs one engine against the subject as it is now.
    ///
    /// Errors only for caller mistakes (no subject, unknown or inapplicable
    /// engine); engine failures come back as [`EngineRunOutcome::Failed`].
    pub async fn run(&self, engine_key: &str) -> anyhow::Result<EngineRunOutcome> {
        match self.begin(engine_key)? {
            Some(ticket) => Ok(self.execute(ticket).await),
            None => Ok(EngineRunOutcome::AlreadyLoading {
                engine_key: engine_key.to_string(),
            }),
        }
    }

    /// Fires every applicable engine that has no result and is not loading.
    /// Loading flags are set before this returns.
    pub fn run_all_remaining(&self) -> RemainingLaunch {
        let mut tickets = Vec::new();
        self.inner.state.send_if_modified(|s| {
            let Some(subject) = s.subject.clone() else {
                return false;
            };
            let idle: Vec<EngineSpec> = s
                .applicable
                .iter()
                .filter(|e| !s.results.contains_key(&e.key) && !s.loading.contains(&e.key))
                .cloned()
                .collect();
            for engine in idle {
                let token = self.next_token();
                s.claim(&engine.key, token);
                tickets.push(self.ticket(s.generation, token, subject.clone(), engine));
            }
            !tickets.is_empty()
        });

        let keys: Vec<String> = tickets.iter().map(|t| t.engine.key.clone()).collect();
        debug!(engines = ?keys, "launching remaining engines");

        let handles = tickets
            .into_iter()
            .map(|ticket| {
                let board = self.clone();
                tokio::spawn(async move { board.execute(ticket).await })
            })
            .collect();
        RemainingLaunch { keys, handles }
    }

    fn next_token(&self) -> u64 {
        self.inner.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn ticket(&self, generation: u64, token: u64, subject: Subject, engine: EngineSpec) -> Ticket {
        Ticket {
            board: self.clone(),
            generation,
            token,
            subject,
            engine,
            settled: false,
        }
    }

    fn begin(&self, engine_key: &str) -> anyhow::Result<Option<Ticket>> {
        let mut outcome: anyhow::Result<Option<Ticket>> = Ok(None);
        self.inner.state.send_if_modified(|s| {
            let Some(subject) = s.subject.clone() else {
                outcome = Err(anyhow::anyhow!("no subject open on the engine board"));
                return false;
            };
            let Some(engine) = s.applicable.iter().find(|e| e.key == engine_key).cloned() else {
                outcome = Err(if self.inner.registry.get(engine_key).is_some() {
                    anyhow::anyhow!(
                        "engine '{}' does not apply to subject {}",
                        engine_key,
                        subject.id
                    )
                } else {
                    anyhow::anyhow!("unknown engine '{}'", engine_key)
                });
                return false;
            };
            if s.loading.contains(engine_key) {
                debug!(engine = engine_key, "engine already loading, ignoring run");
                return false;
            }
            let token = self.next_token();
            s.claim(engine_key, token);
            outcome = Ok(Some(self.ticket(s.generation, token, subject, engine)));
            true
        });
        outcome
    }

    async fn execute(&self, mut ticket: Ticket) -> EngineRunOutcome {
        let key = ticket.engine.key.clone();
        let span = info_span!("engine.invoke", engine = %key, subject_id = %ticket.subject.id);

        let scored = async {
            let payload = self
                .inner
                .client
                .invoke(&ticket.engine, &ticket.subject)
                .await?;
            let score = u8::try_from(payload.score)
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| ClientError::OutOfRange {
                    engine: key.clone(),
                    score: payload.score,
                })?;
            anyhow::Ok(EngineResult {
                engine_key: key.clone(),
                score,
                status_label: payload.status_label,
                scored_at: Utc::now(),
            })
        }
        .instrument(span)
        .await;

        self.apply(&mut ticket, scored)
    }

    /// Settles `ticket`. Dropped when the subject moved on or another
    /// invocation now owns the engine's loading flag.
    fn apply(&self, ticket: &mut Ticket, scored: anyhow::Result<EngineResult>) -> EngineRunOutcome {
        let (generation, token) = (ticket.generation, ticket.token);
        let key = ticket.engine.key.as_str();
        let mut outcome = None;
        self.inner.state.send_if_modified(|s| {
            if s.generation != generation || !s.is_applicable(key) || !s.release(key, token) {
                return false;
            }
            match &scored {
                Ok(result) => {
                    s.results.insert(key.to_string(), result.clone());
                    s.last_errors.remove(key);
                    outcome = Some(EngineRunOutcome::Scored(result.clone()));
                }
                Err(e) => {
                    s.last_errors.insert(key.to_string(), e.to_string());
                    outcome = Some(EngineRunOutcome::Failed {
                        engine_key: key.to_string(),
                        message: e.to_string(),
                    });
                }
            }
            true
        });
        ticket.settled = true;

        match outcome {
            Some(EngineRunOutcome::Scored(r)) => {
                info!(engine = key, score = r.score, label = ?r.status_label, "engine scored");
                EngineRunOutcome::Scored(r)
            }
            Some(other) => {
                if let EngineRunOutcome::Failed { message, .. } = &other {
                    warn!(engine = key, error = %message, "engine failed");
                }
                other
            }
            None => {
                debug!(engine = key, "discarding stale engine response");
                EngineRunOutcome::Discarded {
                    engine_key: key.to_string(),
                }
            }
        }
    }
}

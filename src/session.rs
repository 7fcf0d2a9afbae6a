//! The live search session.
//!
//! A [`SearchSession`] owns one [`ResultSet`] and is the only thing that ever
//! touches it. Queries, item resolution and large reconciliation plans run on
//! tokio's blocking pool and report back over a channel; the owner applies
//! their results by calling [`SearchSession::pump`] or awaiting
//! [`SearchSession::next_update`].
//!
//! Every query captures the session's sequence number when it is issued. A
//! completion is applied only if its sequence is still the current one, so a
//! slow query can never overwrite the results of a newer one.

use std::{
    collections::{HashSet, VecDeque},
    ops::Range,
    sync::Arc,
};

use serde::Serialize;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, info, trace, warn};

use crate::{
    condition::{SearchCondition, validate_conditions},
    config::SessionConfig,
    error::{Error, Result},
    event_bus::{EventBatch, MutationBus},
    executor::{HitAttributes, QueryExecutor, RankedHit},
    item_ref::ItemRef,
    news::{NewsItem, NewsState},
    news_store::ReferenceResolver,
    reconcile::{
        self,
        ReconcileOutcome,
        ReconcilePlan,
        ReconciliationListener,
        ReplayBuffer,
    },
    relevance::{Relevance, RelevanceThresholds},
    result_set::{ResultSet, ScoredHit, SortKey},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
    /// Terminal; the session no longer accepts queries.
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Message of the last failed query, while the session is `Failed`.
    pub error: Option<String>,
    pub sequence: u64,
}

/// What one call to [`SearchSession::pump`] or
/// [`SearchSession::next_update`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The current query completed and its hits were installed. `replayed`
    /// covers the events buffered while it ran.
    Completed {
        sequence: u64,
        hits: usize,
        replayed: ReconcileOutcome,
    },
    Failed {
        sequence: u64,
        error: String,
    },
    /// A superseded query finished; its outcome was dropped.
    StaleCompletion { sequence: u64 },
    Reconciled(ReconcileOutcome),
    /// A large event batch went to the background for planning.
    PlanningStarted { events: usize },
    /// A batch was queued behind an outstanding plan.
    Deferred { events: usize },
    Materialized { attached: usize, missing: usize },
    /// Background work finished for a result set that has since been
    /// replaced or cleared.
    Outdated,
}

/// Render-ready view of one hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitView {
    pub item_ref: ItemRef,
    pub score: f32,
    pub relevance: Relevance,
    pub state: NewsState,
    #[serde(flatten)]
    pub attributes: HitAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<NewsItem>,
}

impl From<&ScoredHit> for HitView {
    fn from(hit: &ScoredHit) -> Self {
        Self {
            item_ref: hit.item_ref,
            score: hit.score,
            relevance: hit.relevance,
            state: hit.state,
            attributes: hit.attributes.clone(),
            item: hit.item.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSnapshot {
    pub hits: Vec<HitView>,
    pub count: usize,
}

enum SessionMessage {
    Completed {
        sequence: u64,
        outcome: Result<Vec<RankedHit>>,
    },
    Resolved {
        generation: u64,
        items: Vec<NewsItem>,
        missing: Vec<ItemRef>,
    },
    Planned {
        generation: u64,
        plan: std::result::Result<ReconcilePlan, Arc<EventBatch>>,
    },
}

enum Incoming {
    Message(Option<SessionMessage>),
    Batch(Option<EventBatch>),
}

pub struct SearchSession {
    executor: QueryExecutor,
    resolver: Arc<dyn ReferenceResolver>,
    config: SessionConfig,
    runtime: Handle,

    results: ResultSet,
    listener: Option<ReconciliationListener>,
    sequence: u64,
    state: SessionState,
    error: Option<String>,

    tx: mpsc::UnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,

    // -- Event bookkeeping --
    /// Events seen while a query runs, replayed over its results.
    replay: ReplayBuffer,
    /// Generation of the outstanding background plan, if any.
    planning: Option<u64>,
    deferred: VecDeque<EventBatch>,
}

impl SearchSession {
    /// Create an idle session subscribed to `bus`.
    ///
    /// Must be called from within a tokio runtime; background work is
    /// spawned on it.
    pub fn new(
        executor: QueryExecutor,
        bus: &dyn MutationBus,
        resolver: Arc<dyn ReferenceResolver>,
        config: SessionConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = ReconciliationListener::subscribe(
            bus,
            config.background_scan_threshold,
        );

        Ok(Self {
            executor,
            resolver,
            config,
            runtime,
            results: ResultSet::new(),
            listener: Some(listener),
            sequence: 0,
            state: SessionState::Idle,
            error: None,
            tx,
            rx,
            replay: ReplayBuffer::new(config.replay_capacity),
            planning: None,
            deferred: VecDeque::new(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            error: self.error.clone(),
            sequence: self.sequence,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Start a query and return its sequence number without waiting for it.
    pub fn issue(
        &mut self,
        conditions: Vec<SearchCondition>,
        match_all: bool,
    ) -> Result<u64> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        validate_conditions(&conditions)?;

        self.sequence += 1;
        let sequence = self.sequence;
        self.state = SessionState::Running;
        self.error = None;
        self.replay.clear();

        let executor = self.executor.clone();
        let resolver = self
            .config
            .verify_existence
            .then(|| Arc::clone(&self.resolver));
        let work = self.runtime.spawn_blocking(move || -> Result<_> {
            let mut hits = executor.execute(&conditions, match_all)?;
            if let Some(resolver) = resolver {
                reconcile::retain_existing(&mut hits, resolver.as_ref());
            }
            Ok(hits)
        });

        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let outcome = work
                .await
                .unwrap_or_else(|e| Err(Error::Runtime(e.to_string())));
            let _ = tx.send(SessionMessage::Completed { sequence, outcome });
        });

        debug!(sequence, match_all, "query issued");
        Ok(sequence)
    }

    /// Drop the results and invalidate any running query. The session stays
    /// subscribed and can issue again.
    pub fn clear(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.sequence += 1;
        self.reset_results();
        self.state = SessionState::Idle;
        self.error = None;
    }

    /// Detach from the bus and drop everything. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.sequence += 1;
        self.listener = None;
        self.reset_results();
        self.state = SessionState::Closed;
        self.error = None;
        debug!(sequence = self.sequence, "session closed");
    }

    fn reset_results(&mut self) {
        self.results.clear();
        self.replay.clear();
        self.deferred.clear();
        self.planning = None;
    }

    // -- Message handling --

    /// Apply everything that is ready without waiting.
    pub fn pump(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        loop {
            let mut progressed = false;
            while let Ok(message) = self.rx.try_recv() {
                updates.push(self.handle_message(message));
                progressed = true;
            }
            while let Some(batch) =
                self.listener.as_mut().and_then(|l| l.try_recv())
            {
                updates.push(self.handle_batch(batch));
                progressed = true;
            }
            if !progressed {
                return updates;
            }
        }
    }

    /// Wait for the next message or event batch and apply it. Returns `None`
    /// once the session is closed.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if self.state == SessionState::Closed {
                return None;
            }
            let incoming = match self.listener.as_mut() {
                Some(listener) => tokio::select! {
                    message = self.rx.recv() => Incoming::Message(message),
                    batch = listener.recv() => Incoming::Batch(batch),
                },
                None => Incoming::Message(self.rx.recv().await),
            };

            match incoming {
                Incoming::Message(Some(message)) => {
                    return Some(self.handle_message(message));
                }
                Incoming::Batch(Some(batch)) => {
                    return Some(self.handle_batch(batch));
                }
                Incoming::Batch(None) => {
                    debug!("mutation bus closed, reconciliation stopped");
                    self.listener = None;
                }
                // The session holds a sender, so the channel cannot close.
                Incoming::Message(None) => return None,
            }
        }
    }

    /// Apply updates until the current query has completed or failed.
    pub async fn wait_for_completion(&mut self) -> SessionStatus {
        while self.state == SessionState::Running {
            if self.next_update().await.is_none() {
                break;
            }
        }
        self.status()
    }

    fn handle_message(&mut self, message: SessionMessage) -> SessionUpdate {
        match message {
            SessionMessage::Completed { sequence, outcome } => {
                self.complete(sequence, outcome)
            }
            SessionMessage::Resolved {
                generation,
                items,
                missing,
            } => self.attach_resolved(generation, items, missing),
            SessionMessage::Planned { generation, plan } => {
                self.apply_planned(generation, plan)
            }
        }
    }

    fn complete(
        &mut self,
        sequence: u64,
        outcome: Result<Vec<RankedHit>>,
    ) -> SessionUpdate {
        if sequence != self.sequence || self.state != SessionState::Running {
            trace!(sequence, current = self.sequence, "stale completion");
            return SessionUpdate::StaleCompletion { sequence };
        }

        match outcome {
            Ok(hits) => {
                self.results.replace(classify(hits));
                // Fresh results already reflect everything published before
                // the query ran; only the replay buffer is still pending.
                self.deferred.clear();
                self.planning = None;
                self.state = SessionState::Completed;

                let replay = self.replay.take();
                let mut replayed =
                    reconcile::reconcile(&replay.events, &mut self.results);
                if !replay.evicted.is_empty() {
                    debug!(
                        evicted = replay.evicted.len(),
                        "rechecking references the replay buffer evicted"
                    );
                    let rechecked = reconcile::recheck(
                        &replay.evicted,
                        self.resolver.as_ref(),
                        &mut self.results,
                    );
                    replayed.removed += rechecked.removed;
                    replayed.refreshed += rechecked.refreshed;
                }
                self.start_eager_resolve();

                info!(sequence, hits = self.results.len(), "query completed");
                SessionUpdate::Completed {
                    sequence,
                    hits: self.results.len(),
                    replayed,
                }
            }
            Err(e) => {
                let error = e.to_string();
                warn!(sequence, %error, "query failed");
                self.reset_results();
                self.state = SessionState::Failed;
                self.error = Some(error.clone());
                SessionUpdate::Failed { sequence, error }
            }
        }
    }

    fn handle_batch(&mut self, batch: EventBatch) -> SessionUpdate {
        if self.state == SessionState::Running {
            self.replay.extend(&batch);
        }
        self.dispatch(batch)
    }

    fn dispatch(&mut self, batch: EventBatch) -> SessionUpdate {
        if self.results.is_empty() {
            return SessionUpdate::Reconciled(ReconcileOutcome::default());
        }
        if self.planning.is_some() {
            let events = batch.len();
            self.deferred.push_back(batch);
            return SessionUpdate::Deferred { events };
        }

        let plans_in_background = self
            .listener
            .as_ref()
            .is_some_and(|l| l.plans_in_background(batch.len()));
        if !plans_in_background {
            return SessionUpdate::Reconciled(reconcile::reconcile(
                &batch,
                &mut self.results,
            ));
        }

        let events = batch.len();
        let generation = self.results.generation();
        let members = self.results.key_snapshot();
        let batch = Arc::new(batch);
        let work = {
            let batch = Arc::clone(&batch);
            self.runtime.spawn_blocking(move || {
                reconcile::plan(&batch, |r| members.contains(&r))
            })
        };
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let plan = work.await.map_err(|e| {
                warn!(error = %e, "background planning failed");
                batch
            });
            let _ = tx.send(SessionMessage::Planned { generation, plan });
        });

        self.planning = Some(generation);
        debug!(events, generation, "planning batch in background");
        SessionUpdate::PlanningStarted { events }
    }

    fn apply_planned(
        &mut self,
        generation: u64,
        plan: std::result::Result<ReconcilePlan, Arc<EventBatch>>,
    ) -> SessionUpdate {
        if self.planning != Some(generation)
            || generation != self.results.generation()
        {
            trace!(generation, "dropping outdated plan");
            return SessionUpdate::Outdated;
        }
        self.planning = None;

        let mut outcome = match plan {
            Ok(plan) => reconcile::apply(plan, &mut self.results),
            Err(batch) => reconcile::reconcile(&batch, &mut self.results),
        };

        while let Some(batch) = self.deferred.pop_front() {
            match self.dispatch(batch) {
                SessionUpdate::Reconciled(more) => {
                    outcome.removed += more.removed;
                    outcome.refreshed += more.refreshed;
                }
                // Went to the background; the rest waits for it.
                _ => break,
            }
        }
        SessionUpdate::Reconciled(outcome)
    }

    // -- Materialization --

    fn start_eager_resolve(&mut self) {
        let refs: Vec<ItemRef> = self
            .results
            .hits()
            .iter()
            .take(self.config.eager_resolve_count)
            .filter(|h| h.item.is_none())
            .map(|h| h.item_ref)
            .collect();
        if refs.is_empty() {
            return;
        }

        let generation = self.results.generation();
        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let (items, missing) = resolve_all(resolver.as_ref(), &refs);
            let _ = tx.send(SessionMessage::Resolved {
                generation,
                items,
                missing,
            });
        });
    }

    fn attach_resolved(
        &mut self,
        generation: u64,
        items: Vec<NewsItem>,
        missing: Vec<ItemRef>,
    ) -> SessionUpdate {
        if generation != self.results.generation() {
            return SessionUpdate::Outdated;
        }
        let mut attached = 0;
        for item in items {
            if self.results.attach_item(item) {
                attached += 1;
            }
        }
        let missing: HashSet<_> = missing.into_iter().collect();
        let missing = self.results.remove_many(&missing);
        SessionUpdate::Materialized { attached, missing }
    }

    /// Resolve the hits in `range` that are not materialized yet and return
    /// the visible ones. Hits whose item no longer exists are dropped from
    /// the result set.
    pub fn materialize(&mut self, range: Range<usize>) -> Result<Vec<HitView>> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        let end = range.end.min(self.results.len());
        let start = range.start.min(end);
        let refs: Vec<ItemRef> = self.results.hits()[start..end]
            .iter()
            .map(|h| h.item_ref)
            .collect();

        let pending: Vec<ItemRef> = refs
            .iter()
            .copied()
            .filter(|r| self.results.get(*r).is_some_and(|h| h.item.is_none()))
            .collect();
        let (items, missing) = resolve_all(self.resolver.as_ref(), &pending);
        for item in items {
            self.results.attach_item(item);
        }
        self.results.remove_many(&missing.into_iter().collect());

        Ok(refs
            .into_iter()
            .filter_map(|r| self.results.get(r))
            .filter(|h| h.state.is_visible() && h.item.is_some())
            .map(HitView::from)
            .collect())
    }

    // -- Reading --

    /// The visible hits in their current order.
    pub fn snapshot(&self) -> ResultSnapshot {
        let hits: Vec<HitView> =
            self.results.visible().map(HitView::from).collect();
        ResultSnapshot {
            count: hits.len(),
            hits,
        }
    }

    /// Select the sort order for the next [`SearchSession::resort`].
    pub fn set_sort(&mut self, key: SortKey, ascending: bool) {
        self.results.set_sort_key(key, ascending);
    }

    pub fn resort(&mut self) {
        self.results.resort();
    }
}

impl std::fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSession")
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("hits", &self.results.len())
            .finish_non_exhaustive()
    }
}

/// Score tiers are fixed against the max score of the batch they came in.
fn classify(hits: Vec<RankedHit>) -> Vec<ScoredHit> {
    let thresholds =
        RelevanceThresholds::from_scores(hits.iter().map(|h| h.score));
    hits.into_iter()
        .map(|hit| ScoredHit {
            item_ref: hit.item_ref,
            state: hit.state,
            score: hit.score,
            relevance: thresholds.classify(hit.score),
            attributes: hit.attributes,
            item: None,
        })
        .collect()
}

fn resolve_all(
    resolver: &dyn ReferenceResolver,
    refs: &[ItemRef],
) -> (Vec<NewsItem>, Vec<ItemRef>) {
    let mut items = Vec::with_capacity(refs.len());
    let mut missing = Vec::new();
    for &item_ref in refs {
        match resolver.resolve(item_ref) {
            Ok(item) => items.push(item),
            Err(e) if e.is_not_found() => missing.push(item_ref),
            Err(e) => {
                warn!(item = %item_ref, error = %e, "could not resolve item")
            }
        }
    }
    (items, missing)
}

/// Entry point that builds sessions from shared collaborators.
#[derive(Clone)]
pub struct SearchService {
    executor: QueryExecutor,
    bus: Arc<dyn MutationBus>,
    resolver: Arc<dyn ReferenceResolver>,
    config: SessionConfig,
}

impl SearchService {
    pub fn new(
        executor: QueryExecutor,
        bus: Arc<dyn MutationBus>,
        resolver: Arc<dyn ReferenceResolver>,
        config: SessionConfig,
    ) -> Self {
        Self {
            executor,
            bus,
            resolver,
            config,
        }
    }

    /// An idle session.
    pub fn session(&self) -> Result<SearchSession> {
        SearchSession::new(
            self.executor.clone(),
            self.bus.as_ref(),
            Arc::clone(&self.resolver),
            self.config,
        )
    }

    /// A session with `conditions` already issued.
    pub fn search(
        &self,
        conditions: Vec<SearchCondition>,
        match_all: bool,
    ) -> Result<SearchSession> {
        let mut session = self.session()?;
        session.issue(conditions, match_all)?;
        Ok(session)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace, warn};

use crate::{
    event_bus::{
        EntityKind,
        EventBatch,
        MutationBus,
        MutationEvent,
        MutationKind,
        Subscription,
    },
    executor::RankedHit,
    item_ref::ItemRef,
    news::NewsItem,
    news_store::ReferenceResolver,
    result_set::ResultSet,
};

/// What one batch of events does to a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub removals: HashSet<ItemRef>,
    /// Post-mutation snapshots, in first-seen order.
    pub refreshes: Vec<NewsItem>,
    /// Malformed or unrecognized events that were ignored.
    pub skipped: usize,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.refreshes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: usize,
    pub refreshed: usize,
}

enum Action {
    Remove,
    Refresh(NewsItem),
}

/// What `event` does to a hit for its reference, or `None` if malformed.
fn action(event: &MutationEvent) -> Option<Action> {
    match (event.kind, &event.snapshot) {
        (MutationKind::Deleted, _) => Some(Action::Remove),
        (MutationKind::Updated, Some(snapshot))
            if snapshot.item_ref == event.item_ref =>
        {
            if snapshot.state.is_visible() {
                Some(Action::Refresh(snapshot.clone()))
            } else {
                Some(Action::Remove)
            }
        }
        (kind, snapshot) => {
            debug!(
                item = %event.item_ref,
                ?kind,
                has_snapshot = snapshot.is_some(),
                "skipping malformed mutation event"
            );
            None
        }
    }
}

fn is_removal(event: &MutationEvent) -> bool {
    match event.kind {
        MutationKind::Deleted => true,
        MutationKind::Updated => event
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| !snapshot.state.is_visible()),
        MutationKind::Unknown => false,
    }
}

/// Plan a batch against the membership test `is_member`.
///
/// Events are matched by durable reference. Deletions and updates into a
/// non-visible state become removals, other updates become refreshes, and
/// events for absent references are dropped. When a reference occurs more
/// than once the last event wins.
pub fn plan<F>(events: &[MutationEvent], is_member: F) -> ReconcilePlan
where
    F: Fn(ItemRef) -> bool,
{
    let mut actions: HashMap<ItemRef, Action> = HashMap::new();
    let mut order = Vec::new();
    let mut skipped = 0;

    for event in events {
        let Some(action) = action(event) else {
            skipped += 1;
            continue;
        };

        if !is_member(event.item_ref) {
            continue;
        }
        if actions.insert(event.item_ref, action).is_none() {
            order.push(event.item_ref);
        }
    }

    let mut plan = ReconcilePlan {
        skipped,
        ..ReconcilePlan::default()
    };
    for item_ref in order {
        match actions.remove(&item_ref) {
            Some(Action::Remove) => {
                plan.removals.insert(item_ref);
            }
            Some(Action::Refresh(snapshot)) => plan.refreshes.push(snapshot),
            None => {}
        }
    }
    plan
}

/// Apply a plan: every removal in one pass, then every refresh.
pub fn apply(plan: ReconcilePlan, results: &mut ResultSet) -> ReconcileOutcome {
    let removed = results.remove_many(&plan.removals);
    let refreshed = plan
        .refreshes
        .iter()
        .filter(|snapshot| results.refresh(snapshot))
        .count();
    trace!(removed, refreshed, skipped = plan.skipped, "reconciled batch");
    ReconcileOutcome { removed, refreshed }
}

/// Plan against the live set and apply in one go.
pub fn reconcile(
    events: &[MutationEvent],
    results: &mut ResultSet,
) -> ReconcileOutcome {
    let plan = plan(events, |r| results.contains(r));
    apply(plan, results)
}

/// Re-check references through the resolver and reconcile what it reports.
///
/// A reference the resolver no longer knows is treated as deleted. Other
/// resolver errors leave the hit alone.
pub fn recheck(
    refs: &[ItemRef],
    resolver: &dyn ReferenceResolver,
    results: &mut ResultSet,
) -> ReconcileOutcome {
    let mut events = Vec::new();
    for &item_ref in refs {
        if !results.contains(item_ref) {
            continue;
        }
        match resolver.resolve(item_ref) {
            Ok(item) => events.push(MutationEvent::updated(&item)),
            Err(e) if e.is_not_found() => {
                events.push(MutationEvent::deleted(item_ref));
            }
            Err(e) => {
                warn!(item = %item_ref, error = %e, "could not recheck item");
            }
        }
    }
    reconcile(&events, results)
}

/// Events seen while a query runs, held until its results are installed.
///
/// Events collapse per reference with the last one winning, so `capacity`
/// bounds distinct references. Removals are never evicted. When the buffer
/// is full the oldest refresh gives way and its reference is kept for a
/// [`recheck`] once the results are in.
#[derive(Debug, Default)]
pub struct ReplayBuffer {
    capacity: usize,
    next: u64,
    events: HashMap<ItemRef, (u64, MutationEvent)>,
    /// Refreshes in arrival order; superseded entries are skipped lazily.
    refresh_order: VecDeque<(u64, ItemRef)>,
    evicted: HashSet<ItemRef>,
}

/// Everything a [`ReplayBuffer`] held, ready to apply.
#[derive(Debug, Default, PartialEq)]
pub struct Replay {
    /// Buffered events in arrival order.
    pub events: Vec<MutationEvent>,
    /// References whose refresh was evicted.
    pub evicted: Vec<ItemRef>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Distinct references with a buffered event.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.evicted.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.refresh_order.clear();
        self.evicted.clear();
    }

    pub fn push(&mut self, event: &MutationEvent) {
        if action(event).is_none() {
            return;
        }
        self.next += 1;
        let seq = self.next;
        let item_ref = event.item_ref;
        self.evicted.remove(&item_ref);
        if !is_removal(event) {
            self.refresh_order.push_back((seq, item_ref));
        }
        self.events.insert(item_ref, (seq, event.clone()));

        while self.events.len() > self.capacity {
            if !self.evict_oldest_refresh() {
                break;
            }
        }
    }

    pub fn extend(&mut self, batch: &[MutationEvent]) {
        for event in batch {
            self.push(event);
        }
    }

    fn evict_oldest_refresh(&mut self) -> bool {
        while let Some((seq, item_ref)) = self.refresh_order.pop_front() {
            let current = self.events.get(&item_ref).map(|(s, _)| *s);
            if current == Some(seq) {
                self.events.remove(&item_ref);
                self.evicted.insert(item_ref);
                trace!(item = %item_ref, "replay buffer full, refresh evicted");
                return true;
            }
        }
        false
    }

    /// Drain the buffer.
    pub fn take(&mut self) -> Replay {
        let mut events: Vec<_> = self.events.drain().map(|(_, e)| e).collect();
        events.sort_by_key(|(seq, _)| *seq);
        let replay = Replay {
            events: events.into_iter().map(|(_, event)| event).collect(),
            evicted: self.evicted.drain().collect(),
        };
        self.refresh_order.clear();
        replay
    }
}

/// Keep only hits whose entity the resolver can still find.
///
/// Guard for stores that may index entities they no longer hold; a store
/// with consistent index and storage does not need it.
pub fn retain_existing(
    hits: &mut Vec<RankedHit>,
    resolver: &dyn ReferenceResolver,
) {
    let before = hits.len();
    hits.retain(|hit| resolver.exists(hit.item_ref));
    if hits.len() != before {
        let dropped = before - hits.len();
        debug!(dropped, "dropped hits without a backing item");
    }
}

/// The session's subscription to news mutations.
#[derive(Debug)]
pub struct ReconciliationListener {
    subscription: Subscription,
    background_threshold: usize,
}

impl ReconciliationListener {
    pub fn subscribe(
        bus: &dyn MutationBus,
        background_threshold: usize,
    ) -> Self {
        Self {
            subscription: bus.subscribe(EntityKind::News),
            background_threshold,
        }
    }

    /// Whether a batch is large enough to plan on the background pool.
    pub fn plans_in_background(&self, batch_len: usize) -> bool {
        self.background_threshold > 0 && batch_len >= self.background_threshold
    }

    pub async fn recv(&mut self) -> Option<EventBatch> {
        self.subscription.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventBatch> {
        self.subscription.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::HitAttributes,
        news::NewsState,
        relevance::Relevance,
        result_set::ScoredHit,
    };

    fn item(guid: &str, state: NewsState) -> NewsItem {
        let mut item = NewsItem::new("feed", guid, guid, 0);
        item.state = state;
        item
    }

    fn results_with(guids: &[&str]) -> ResultSet {
        let mut set = ResultSet::new();
        set.replace(
            guids
                .iter()
                .enumerate()
                .map(|(i, g)| ScoredHit {
                    item_ref: ItemRef::new("feed", g),
                    state: NewsState::Unread,
                    score: 10.0 - i as f32,
                    relevance: Relevance::High,
                    attributes: HitAttributes::default(),
                    item: None,
                })
                .collect(),
        );
        set
    }

    fn r(guid: &str) -> ItemRef {
        ItemRef::new("feed", guid)
    }

    #[test]
    fn delete_removes_hit() {
        let mut set = results_with(&["a", "b"]);
        let out = reconcile(&[MutationEvent::deleted(r("a"))], &mut set);
        assert_eq!(out, ReconcileOutcome { removed: 1, refreshed: 0 });
        assert!(!set.contains(r("a")));
        assert_eq!(set.position(r("b")), Some(0));
    }

    #[test]
    fn update_to_invisible_removes_hit() {
        let mut set = results_with(&["a", "b"]);
        let out = reconcile(
            &[MutationEvent::updated(&item("b", NewsState::Hidden))],
            &mut set,
        );
        assert_eq!(out.removed, 1);
        assert!(!set.contains(r("b")));
    }

    #[test]
    fn visible_update_refreshes_in_place() {
        let mut set = results_with(&["a", "b", "c"]);
        let out = reconcile(
            &[MutationEvent::updated(&item("b", NewsState::Read))],
            &mut set,
        );
        assert_eq!(out, ReconcileOutcome { removed: 0, refreshed: 1 });
        let hit = set.get(r("b")).unwrap();
        assert_eq!(set.position(r("b")), Some(1));
        assert_eq!(hit.state, NewsState::Read);
        assert_eq!(hit.attributes.title, "b");
    }

    #[test]
    fn unknown_references_are_noops() {
        let mut set = results_with(&["a"]);
        let out = reconcile(
            &[
                MutationEvent::deleted(r("zzz")),
                MutationEvent::updated(&item("yyy", NewsState::Read)),
            ],
            &mut set,
        );
        assert_eq!(out, ReconcileOutcome::default());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn malformed_events_are_skipped() {
        let set = results_with(&["a", "b"]);
        let events = vec![
            MutationEvent {
                item_ref: r("a"),
                kind: MutationKind::Updated,
                snapshot: None,
            },
            MutationEvent {
                item_ref: r("a"),
                kind: MutationKind::Unknown,
                snapshot: Some(item("a", NewsState::Deleted)),
            },
            MutationEvent {
                item_ref: r("b"),
                kind: MutationKind::Updated,
                snapshot: Some(item("a", NewsState::Read)),
            },
        ];
        let plan = plan(&events, |x| set.contains(x));
        assert_eq!(plan.skipped, 3);
        assert!(plan.is_empty());
    }

    #[test]
    fn last_event_for_a_reference_wins() {
        let set = results_with(&["a", "b"]);
        let events = vec![
            MutationEvent::updated(&item("a", NewsState::Read)),
            MutationEvent::deleted(r("a")),
            MutationEvent::updated(&item("b", NewsState::Hidden)),
            MutationEvent::updated(&item("b", NewsState::Unread)),
        ];
        let plan = plan(&events, |x| set.contains(x));
        assert_eq!(plan.removals, HashSet::from([r("a")]));
        assert_eq!(plan.refreshes.len(), 1);
        assert_eq!(plan.refreshes[0].item_ref, r("b"));
    }

    #[test]
    fn removals_apply_before_refreshes() {
        let mut set = results_with(&["a", "b", "c"]);
        let plan = ReconcilePlan {
            removals: HashSet::from([r("a")]),
            refreshes: vec![item("c", NewsState::Read)],
            skipped: 0,
        };
        let out = apply(plan, &mut set);
        assert_eq!(out, ReconcileOutcome { removed: 1, refreshed: 1 });
        assert_eq!(set.position(r("c")), Some(1));
        assert_eq!(set.get(r("c")).unwrap().state, NewsState::Read);
    }

    #[test]
    fn replay_collapses_per_reference() {
        let mut buffer = ReplayBuffer::new(8);
        buffer.extend(&[
            MutationEvent::updated(&item("a", NewsState::Read)),
            MutationEvent::deleted(r("b")),
            MutationEvent::deleted(r("a")),
            MutationEvent {
                item_ref: r("b"),
                kind: MutationKind::Unknown,
                snapshot: None,
            },
        ]);
        assert_eq!(buffer.len(), 2);

        let replay = buffer.take();
        assert_eq!(
            replay.events,
            vec![MutationEvent::deleted(r("b")), MutationEvent::deleted(r("a"))]
        );
        assert!(replay.evicted.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn replay_overflow_keeps_removals() {
        let mut buffer = ReplayBuffer::new(1);
        buffer.extend(&[
            MutationEvent::deleted(r("a")),
            MutationEvent::deleted(r("b")),
            MutationEvent::updated(&item("c", NewsState::Hidden)),
        ]);
        let replay = buffer.take();
        assert_eq!(replay.events.len(), 3);
        assert!(replay.evicted.is_empty());

        let mut set = results_with(&["a", "b", "c", "d"]);
        reconcile(&replay.events, &mut set);
        assert_eq!(set.len(), 1);
        assert!(set.contains(r("d")));
    }

    #[test]
    fn replay_overflow_evicts_oldest_refresh() {
        let mut buffer = ReplayBuffer::new(2);
        buffer.extend(&[
            MutationEvent::updated(&item("a", NewsState::Read)),
            MutationEvent::deleted(r("b")),
            MutationEvent::updated(&item("c", NewsState::Read)),
        ]);
        assert_eq!(buffer.len(), 2);

        let replay = buffer.take();
        let kept: Vec<_> = replay.events.iter().map(|e| e.item_ref).collect();
        assert_eq!(kept, vec![r("b"), r("c")]);
        assert_eq!(replay.evicted, vec![r("a")]);
    }

    #[test]
    fn newer_event_clears_eviction() {
        let mut buffer = ReplayBuffer::new(0);
        buffer.push(&MutationEvent::updated(&item("a", NewsState::Read)));
        buffer.push(&MutationEvent::deleted(r("a")));

        let replay = buffer.take();
        assert_eq!(replay.events, vec![MutationEvent::deleted(r("a"))]);
        assert!(replay.evicted.is_empty());
    }

    struct Known(HashMap<ItemRef, NewsItem>);

    impl ReferenceResolver for Known {
        fn resolve(&self, item_ref: ItemRef) -> crate::Result<NewsItem> {
            self.0.get(&item_ref).cloned().ok_or_else(|| {
                crate::Error::NotFound {
                    kind: "news item",
                    name: item_ref.to_string(),
                }
            })
        }
    }

    #[test]
    fn recheck_follows_the_resolver() {
        let read = item("b", NewsState::Read);
        let resolver = Known(HashMap::from([(read.item_ref, read)]));
        let mut set = results_with(&["a", "b", "c"]);

        let out = recheck(&[r("a"), r("b"), r("zzz")], &resolver, &mut set);
        assert_eq!(out, ReconcileOutcome { removed: 1, refreshed: 1 });
        assert!(!set.contains(r("a")));
        assert_eq!(set.get(r("b")).unwrap().state, NewsState::Read);
        assert!(set.contains(r("c")));
    }

    #[test]
    fn background_threshold() {
        let bus = crate::event_bus::EventBus::new();
        let listener = ReconciliationListener::subscribe(&bus, 100);
        assert!(!listener.plans_in_background(99));
        assert!(listener.plans_in_background(100));

        let never = ReconciliationListener::subscribe(&bus, 0);
        assert!(!never.plans_in_background(1_000_000));
    }
}

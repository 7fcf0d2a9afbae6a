use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    str::FromStr,
};

use serde::Serialize;

use crate::{
    executor::HitAttributes,
    item_ref::ItemRef,
    news::{NewsItem, NewsState},
    relevance::Relevance,
};

/// A hit held by the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub item_ref: ItemRef,
    /// State at search time, refreshed by reconciliation.
    pub state: NewsState,
    pub score: f32,
    /// Computed once when the originating query completed.
    pub relevance: Relevance,
    pub attributes: HitAttributes,
    /// The materialized item, once resolved.
    pub item: Option<NewsItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Score,
    Title,
    Author,
    Feed,
    Date,
    State,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" | "relevance" => Ok(SortKey::Score),
            "title" => Ok(SortKey::Title),
            "author" => Ok(SortKey::Author),
            "feed" => Ok(SortKey::Feed),
            "date" => Ok(SortKey::Date),
            "state" => Ok(SortKey::State),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            key: SortKey::Score,
            ascending: false,
        }
    }
}

/// Compare two hits under `order`.
///
/// Equal scores fall back to the most recent date, newest first, whatever
/// the primary direction.
pub fn compare_hits(
    a: &ScoredHit,
    b: &ScoredHit,
    order: SortOrder,
) -> Ordering {
    let primary = match order.key {
        SortKey::Score => a.score.total_cmp(&b.score),
        SortKey::Title => cmp_text(&a.attributes.title, &b.attributes.title),
        SortKey::Author => cmp_text(&a.attributes.author, &b.attributes.author),
        SortKey::Feed => cmp_text(&a.attributes.feed, &b.attributes.feed),
        SortKey::Date => {
            a.attributes.recent_date.cmp(&b.attributes.recent_date)
        }
        SortKey::State => a.state.code().cmp(&b.state.code()),
    };
    let primary = if order.ascending {
        primary
    } else {
        primary.reverse()
    };

    if primary == Ordering::Equal && order.key == SortKey::Score {
        b.attributes.recent_date.cmp(&a.attributes.recent_date)
    } else {
        primary
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// The authoritative, ordered collection of hits of one session.
///
/// Positions are indexed by durable reference so reconciliation lookups do
/// not scan. Only the owning session mutates it.
#[derive(Debug, Default)]
pub struct ResultSet {
    hits: Vec<ScoredHit>,
    positions: HashMap<ItemRef, usize>,
    order: SortOrder,
    generation: u64,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole contents, sorted under the current order.
    ///
    /// Hits in a non-visible state and repeated references are dropped.
    pub fn replace(&mut self, hits: Vec<ScoredHit>) {
        let mut seen = HashSet::with_capacity(hits.len());
        self.hits = hits
            .into_iter()
            .filter(|h| h.state.is_visible() && seen.insert(h.item_ref))
            .collect();
        self.generation += 1;
        self.resort();
    }

    pub fn clear(&mut self) {
        self.hits.clear();
        self.positions.clear();
        self.generation += 1;
    }

    /// Bumped on every wholesale replace or clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[ScoredHit] {
        &self.hits
    }

    pub fn contains(&self, item_ref: ItemRef) -> bool {
        self.positions.contains_key(&item_ref)
    }

    pub fn position(&self, item_ref: ItemRef) -> Option<usize> {
        self.positions.get(&item_ref).copied()
    }

    pub fn get(&self, item_ref: ItemRef) -> Option<&ScoredHit> {
        self.position(item_ref).map(|i| &self.hits[i])
    }

    /// Owned copy of the current membership, for planning off the
    /// foreground.
    pub fn key_snapshot(&self) -> HashSet<ItemRef> {
        self.positions.keys().copied().collect()
    }

    /// Hits that pass the visibility guard, in order.
    pub fn visible(&self) -> impl Iterator<Item = &ScoredHit> {
        self.hits.iter().filter(|h| h.state.is_visible())
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    /// Select the order used by the next [`ResultSet::resort`].
    pub fn set_sort_key(&mut self, key: SortKey, ascending: bool) {
        self.order = SortOrder { key, ascending };
    }

    pub fn resort(&mut self) {
        if !self.hits.is_empty() {
            let order = self.order;
            self.hits.sort_by(|a, b| compare_hits(a, b, order));
        }
        self.reindex();
    }

    /// Remove every hit whose reference is in `refs`, in one pass.
    pub fn remove_many(&mut self, refs: &HashSet<ItemRef>) -> usize {
        if refs.is_empty() {
            return 0;
        }
        let before = self.hits.len();
        self.hits.retain(|h| !refs.contains(&h.item_ref));
        let removed = before - self.hits.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    /// Refresh a hit's state and attributes from a post-mutation snapshot,
    /// leaving its position alone. Returns false if the hit is absent.
    pub fn refresh(&mut self, snapshot: &NewsItem) -> bool {
        let Some(position) = self.position(snapshot.item_ref) else {
            return false;
        };
        let hit = &mut self.hits[position];
        hit.state = snapshot.state;
        hit.attributes = HitAttributes::from(snapshot);
        hit.item = Some(snapshot.clone());
        true
    }

    /// Attach a materialized item to its hit. Hits that are gone or already
    /// carry an item (possibly a newer snapshot) are left alone.
    pub fn attach_item(&mut self, item: NewsItem) -> bool {
        match self.position(item.item_ref) {
            Some(position) if self.hits[position].item.is_none() => {
                self.hits[position].item = Some(item);
                true
            }
            _ => false,
        }
    }

    fn reindex(&mut self) {
        self.positions.clear();
        self.positions.extend(
            self.hits
                .iter()
                .enumerate()
                .map(|(i, h)| (h.item_ref, i)),
        );
    }
}

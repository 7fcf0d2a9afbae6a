use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{
    condition::{SearchCondition, validate_conditions},
    error::{Error, Result},
    item_ref::ItemRef,
    news::{NewsItem, NewsState},
};

/// Sortable display attributes carried with every hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HitAttributes {
    pub title: String,
    pub author: String,
    pub feed: String,
    /// Most recent relevant timestamp, see [`NewsItem::recent_date`].
    pub recent_date: u64,
}

impl From<&NewsItem> for HitAttributes {
    fn from(item: &NewsItem) -> Self {
        Self {
            title: item.title.clone(),
            author: item.author.clone(),
            feed: item.feed.clone(),
            recent_date: item.recent_date(),
        }
    }
}

/// A hit as returned by the content index, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub item_ref: ItemRef,
    /// Higher is more relevant.
    pub score: f32,
    pub state: NewsState,
    pub attributes: HitAttributes,
}

/// The scored-search provider behind the executor.
///
/// Implementations return hits in their own order with a comparable score;
/// how they rank is their business.
pub trait ContentIndex: Send + Sync {
    fn execute(
        &self,
        conditions: &[SearchCondition],
        match_all: bool,
    ) -> Result<Vec<RankedHit>>;
}

/// Runs queries against a [`ContentIndex`]. Meant to be called off the
/// foreground context; the call blocks for the duration of the search.
#[derive(Clone)]
pub struct QueryExecutor {
    index: Arc<dyn ContentIndex>,
}

impl QueryExecutor {
    pub fn new(index: Arc<dyn ContentIndex>) -> Self {
        Self { index }
    }

    /// Execute a query and drop every hit that is not in a visible state.
    ///
    /// Index failures surface as [`Error::SearchFailed`]; partial results are
    /// never returned.
    pub fn execute(
        &self,
        conditions: &[SearchCondition],
        match_all: bool,
    ) -> Result<Vec<RankedHit>> {
        validate_conditions(conditions)?;

        let mut hits = self
            .index
            .execute(conditions, match_all)
            .map_err(|e| match e {
                Error::SearchFailed(msg) => Error::SearchFailed(msg),
                other => Error::SearchFailed(other.to_string()),
            })?;

        let total = hits.len();
        hits.retain(|hit| hit.state.is_visible());
        debug!(
            total,
            visible = hits.len(),
            match_all,
            conditions = conditions.len(),
            "query executed"
        );

        Ok(hits)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor").finish_non_exhaustive()
    }
}

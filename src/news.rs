use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::item_ref::ItemRef;

/// Lifecycle state of a news item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NewsState {
    New,
    Unread,
    Updated,
    Read,
    Hidden,
    Deleted,
}

impl NewsState {
    pub const ALL: [NewsState; 6] = [
        NewsState::New,
        NewsState::Unread,
        NewsState::Updated,
        NewsState::Read,
        NewsState::Hidden,
        NewsState::Deleted,
    ];

    /// States eligible for display.
    pub const VISIBLE: [NewsState; 4] = [
        NewsState::New,
        NewsState::Unread,
        NewsState::Updated,
        NewsState::Read,
    ];

    pub fn is_visible(self) -> bool {
        !matches!(self, NewsState::Hidden | NewsState::Deleted)
    }

    /// Numeric code stored in the index.
    pub fn code(self) -> u64 {
        match self {
            NewsState::New => 0,
            NewsState::Unread => 1,
            NewsState::Updated => 2,
            NewsState::Read => 3,
            NewsState::Hidden => 4,
            NewsState::Deleted => 5,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NewsState::New => "new",
            NewsState::Unread => "unread",
            NewsState::Updated => "updated",
            NewsState::Read => "read",
            NewsState::Hidden => "hidden",
            NewsState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for NewsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown news state '{s}'"))
    }
}

/// A news item as held by the store. Dates are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub item_ref: ItemRef,
    /// Link of the feed the item belongs to.
    pub feed: String,
    pub guid: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: NewsState,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub published: Option<u64>,
    #[serde(default)]
    pub modified: Option<u64>,
    pub received: u64,
}

impl NewsItem {
    /// A fresh, unread-as-new item with only the identifying fields set.
    pub fn new(feed: &str, guid: &str, title: &str, received: u64) -> Self {
        Self {
            item_ref: ItemRef::new(feed, guid),
            feed: feed.to_string(),
            guid: guid.to_string(),
            title: title.to_string(),
            author: String::new(),
            link: String::new(),
            content: String::new(),
            categories: Vec::new(),
            labels: Vec::new(),
            state: NewsState::New,
            flagged: false,
            published: None,
            modified: None,
            received,
        }
    }

    /// The most recent relevant timestamp: modified, else published, else
    /// received.
    pub fn recent_date(&self) -> u64 {
        self.modified.or(self.published).unwrap_or(self.received)
    }
}

/// Item shape accepted by `feedsearch import`; the reference is derived.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRecord {
    pub feed: String,
    pub guid: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_import_state")]
    pub state: NewsState,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub published: Option<u64>,
    #[serde(default)]
    pub modified: Option<u64>,
    #[serde(default)]
    pub received: u64,
}

fn default_import_state() -> NewsState {
    NewsState::New
}

impl From<ImportRecord> for NewsItem {
    fn from(r: ImportRecord) -> Self {
        Self {
            item_ref: ItemRef::new(&r.feed, &r.guid),
            feed: r.feed,
            guid: r.guid,
            title: r.title,
            author: r.author,
            link: r.link,
            content: r.content,
            categories: r.categories,
            labels: r.labels,
            state: r.state,
            flagged: r.flagged,
            published: r.published,
            modified: r.modified,
            received: r.received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_states() {
        for state in NewsState::ALL {
            assert_eq!(
                state.is_visible(),
                NewsState::VISIBLE.contains(&state),
                "{state}"
            );
        }
    }

    #[test]
    fn state_codes_roundtrip() {
        for state in NewsState::ALL {
            assert_eq!(NewsState::from_code(state.code()), Some(state));
        }
        assert_eq!(NewsState::from_code(42), None);
    }

    #[test]
    fn state_parses_case_insensitively() {
        assert_eq!("Read".parse::<NewsState>().unwrap(), NewsState::Read);
        assert_eq!(" hidden ".parse::<NewsState>().unwrap(), NewsState::Hidden);
        assert!("archived".parse::<NewsState>().is_err());
    }

    #[test]
    fn recent_date_prefers_modified_then_published() {
        let mut item = NewsItem::new("feed", "a", "A", 100);
        assert_eq!(item.recent_date(), 100);
        item.published = Some(200);
        assert_eq!(item.recent_date(), 200);
        item.modified = Some(300);
        assert_eq!(item.recent_date(), 300);
    }

    #[test]
    fn import_record_derives_reference() {
        let record: ImportRecord = serde_json::from_str(
            r#"{"feed":"https://f.example/rss","guid":"g1","title":"T"}"#,
        )
        .unwrap();
        let item = NewsItem::from(record);
        assert_eq!(item.item_ref, ItemRef::new("https://f.example/rss", "g1"));
        assert_eq!(item.state, NewsState::New);
        assert!(item.categories.is_empty());
    }
}

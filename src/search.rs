use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::{
    condition::{SearchCondition, SearchField, SearchValue, Specifier},
    error::{Error, Result},
    news::NewsState,
    result_set::SortKey,
    session::{HitView, SearchService, SessionState},
};

/// One-shot search request, as the command line expresses it.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Words matched against every text field.
    pub text: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub feed: Option<String>,
    pub category: Option<String>,
    pub label: Option<String>,
    pub states: Vec<NewsState>,
    pub flagged: Option<bool>,
    /// Seconds since the Unix epoch.
    pub after: Option<u64>,
    pub before: Option<u64>,
    /// Match any condition instead of all of them.
    pub any: bool,
    pub sort: Option<SortKey>,
    pub ascending: bool,
    /// Maximum number of hits to materialize; `None` for all.
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn to_conditions(&self) -> Vec<SearchCondition> {
        let mut conditions = Vec::new();
        let text_fields = [
            (SearchField::AllFields, &self.text, Specifier::ContainsAll),
            (SearchField::Title, &self.title, Specifier::Contains),
            (SearchField::Content, &self.content, Specifier::Contains),
            (SearchField::Author, &self.author, Specifier::Contains),
            (SearchField::Feed, &self.feed, Specifier::Is),
            (SearchField::Category, &self.category, Specifier::Is),
            (SearchField::Label, &self.label, Specifier::Is),
        ];
        for (field, value, specifier) in text_fields {
            if let Some(value) = value {
                conditions.push(SearchCondition::text(field, specifier, value));
            }
        }
        if !self.states.is_empty() {
            conditions
                .push(SearchCondition::states(Specifier::Is, &self.states));
        }
        if let Some(flagged) = self.flagged {
            conditions.push(SearchCondition::new(
                SearchField::Flagged,
                Specifier::Is,
                SearchValue::Bool(flagged),
            ));
        }
        if let Some(after) = self.after {
            conditions.push(SearchCondition::new(
                SearchField::Published,
                Specifier::IsAfter,
                SearchValue::Date(after),
            ));
        }
        if let Some(before) = self.before {
            conditions.push(SearchCondition::new(
                SearchField::Published,
                Specifier::IsBefore,
                SearchValue::Date(before),
            ));
        }
        conditions
    }
}

/// Run a search to completion and return its materialized hits.
pub async fn execute_search(
    service: &SearchService,
    params: &SearchParams,
) -> Result<SearchOutput> {
    let mut session = service.search(params.to_conditions(), !params.any)?;
    let status = session.wait_for_completion().await;
    if status.state == SessionState::Failed {
        return Err(Error::SearchFailed(status.error.unwrap_or_default()));
    }

    if let Some(key) = params.sort {
        session.set_sort(key, params.ascending);
        session.resort();
    }

    let limit = params.limit.unwrap_or(usize::MAX);
    let hits = session.materialize(0..limit)?;
    // Materializing drops hits whose item vanished in the meantime.
    let total = session.results().len();
    session.close();

    Ok(SearchOutput { total, hits })
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    /// Hits the query produced, before the limit.
    pub total: usize,
    pub hits: Vec<HitView>,
}

/// Format results for human-readable terminal output.
pub fn format_human(output: &SearchOutput) -> String {
    if output.hits.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for (rank, hit) in output.hits.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. [{:<6}] {:>7.3} {} {}\n",
            rank + 1,
            hit.relevance.as_str(),
            hit.score,
            hit.item_ref,
            hit.attributes.title,
        ));
        let mut meta = format!("     {} ({})", hit.attributes.feed, hit.state);
        if !hit.attributes.author.is_empty() {
            meta.push_str(&format!(" by {}", hit.attributes.author));
        }
        out.push_str(&meta);
        out.push('\n');
    }
    out.push_str(&format!(
        "\n{} of {} result(s)\n",
        output.hits.len(),
        output.total
    ));
    out
}

/// Format results as JSON output.
pub fn format_json(output: &SearchOutput) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}

/// Parse a date given as epoch seconds or `YYYY-MM-DD` (UTC midnight).
pub fn parse_date(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        format!("expected YYYY-MM-DD or epoch seconds, got '{s}': {e}")
    })?;
    let secs = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    u64::try_from(secs).map_err(|_| format!("date '{s}' is before 1970"))
}

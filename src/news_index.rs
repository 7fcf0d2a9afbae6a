use std::{ops::Bound, path::Path};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    query::{
        AllQuery,
        BooleanQuery,
        BoostQuery,
        EmptyQuery,
        Occur,
        Query,
        RangeQuery,
        RegexQuery,
        TermQuery,
    },
    schema::*,
    tokenizer::{
        LowerCaser,
        RawTokenizer,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
        TokenStream,
    },
};
use tracing::trace;

use crate::{
    condition::{SearchCondition, SearchField, SearchValue, Specifier},
    error::{Error, Result},
    executor::{ContentIndex, HitAttributes, RankedHit},
    item_ref::ItemRef,
    news::{NewsItem, NewsState},
};

const SECONDS_PER_DAY: u64 = 86_400;

/// Field names used in the schema.
pub mod fields {
    pub const ITEM_REF: &str = "item_ref";
    pub const FEED: &str = "feed";
    pub const LINK: &str = "link";
    pub const TITLE: &str = "title";
    pub const TITLE_RAW: &str = "title_raw";
    pub const AUTHOR: &str = "author";
    pub const AUTHOR_RAW: &str = "author_raw";
    pub const CONTENT: &str = "content";
    pub const CATEGORY: &str = "category";
    pub const LABEL: &str = "label";
    pub const STATE: &str = "state";
    pub const FLAGGED: &str = "flagged";
    pub const PUBLISHED: &str = "published";
    pub const RECEIVED: &str = "received";
    pub const RECENT: &str = "recent";
}

const EN_STEM: &str = "en_stem";
const RAW_LOWER: &str = "raw_lower";

/// Tantivy full-text index over news items.
pub struct NewsIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub item_ref: Field,
    pub feed: Field,
    pub link: Field,
    pub title: Field,
    pub title_raw: Field,
    pub author: Field,
    pub author_raw: Field,
    pub content: Field,
    pub category: Field,
    pub label: Field,
    pub state: Field,
    pub flagged: Field,
    pub published: Field,
    pub received: Field,
    pub recent: Field,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let stemmed = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(EN_STEM)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let raw = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(RAW_LOWER)
            .set_index_option(IndexRecordOption::Basic),
    );
    let numeric = NumericOptions::default()
        .set_indexed()
        .set_fast()
        .set_stored();

    let item_ref = builder.add_u64_field(fields::ITEM_REF, numeric.clone());
    let feed = builder.add_text_field(fields::FEED, raw.clone().set_stored());
    let link = builder.add_text_field(fields::LINK, raw.clone());
    let title =
        builder.add_text_field(fields::TITLE, stemmed.clone().set_stored());
    let title_raw = builder.add_text_field(fields::TITLE_RAW, raw.clone());
    let author =
        builder.add_text_field(fields::AUTHOR, stemmed.clone().set_stored());
    let author_raw = builder.add_text_field(fields::AUTHOR_RAW, raw.clone());
    let content = builder.add_text_field(fields::CONTENT, stemmed);
    let category = builder.add_text_field(fields::CATEGORY, raw.clone());
    let label = builder.add_text_field(fields::LABEL, raw);
    let state = builder.add_u64_field(fields::STATE, numeric.clone());
    let flagged = builder.add_u64_field(fields::FLAGGED, numeric.clone());
    let published = builder.add_u64_field(fields::PUBLISHED, numeric.clone());
    let received = builder.add_u64_field(fields::RECEIVED, numeric.clone());
    let recent = builder.add_u64_field(fields::RECENT, numeric);

    let schema = builder.build();
    let fields = SchemaFields {
        item_ref,
        feed,
        link,
        title,
        title_raw,
        author,
        author_raw,
        content,
        category,
        label,
        state,
        flagged,
        published,
        received,
        recent,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register(EN_STEM, en_stem);

    let raw_lower = TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(RAW_LOWER, raw_lower);
}

impl NewsIndex {
    /// Open or create a news index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Create an in-memory news index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Add or replace an item via the given writer.
    pub fn add_item(
        &self,
        writer: &IndexWriter,
        item: &NewsItem,
    ) -> Result<()> {
        self.delete_item(writer, item.item_ref);
        writer.add_document(self.to_document(item))?;
        Ok(())
    }

    pub fn delete_item(&self, writer: &IndexWriter, item_ref: ItemRef) {
        let term = Term::from_field_u64(self.fields.item_ref, item_ref.raw());
        writer.delete_term(term);
    }

    /// Build the Tantivy document for an item.
    pub fn to_document(&self, item: &NewsItem) -> TantivyDocument {
        let f = self.fields;
        let mut doc = TantivyDocument::default();
        doc.add_u64(f.item_ref, item.item_ref.raw());
        doc.add_text(f.feed, &item.feed);
        doc.add_text(f.link, &item.link);
        doc.add_text(f.title, &item.title);
        doc.add_text(f.title_raw, &item.title);
        doc.add_text(f.author, &item.author);
        doc.add_text(f.author_raw, &item.author);
        doc.add_text(f.content, &item.content);
        for category in &item.categories {
            doc.add_text(f.category, category);
        }
        for label in &item.labels {
            doc.add_text(f.label, label);
        }
        doc.add_u64(f.state, item.state.code());
        doc.add_u64(f.flagged, u64::from(item.flagged));
        if let Some(published) = item.published {
            doc.add_u64(f.published, published);
        }
        doc.add_u64(f.received, item.received);
        doc.add_u64(f.recent, item.recent_date());
        doc
    }

    /// Number of searchable documents as of the last reload.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Run a condition query. Hits come back in score order, every state
    /// included; visibility filtering is the executor's job.
    pub fn search(
        &self,
        conditions: &[SearchCondition],
        match_all: bool,
    ) -> Result<Vec<RankedHit>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let occur = if match_all { Occur::Must } else { Occur::Should };
        let mut clauses = Vec::with_capacity(conditions.len());
        for condition in conditions.iter().filter(|c| c.has_usable_value()) {
            clauses.push((occur, self.condition_query(condition)?));
        }
        let query = BooleanQuery::new(clauses);

        let limit = searcher.num_docs().max(1) as usize;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        trace!(hits = top_docs.len(), "index search");

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let code = extract_u64(&doc, f.state);
            // Documents written by a newer schema revision may carry states we
            // do not know; they cannot be shown anyway.
            let Some(state) = NewsState::from_code(code) else {
                continue;
            };
            results.push(RankedHit {
                item_ref: ItemRef::from_raw(extract_u64(&doc, f.item_ref)),
                score,
                state,
                attributes: HitAttributes {
                    title: extract_text(&doc, f.title),
                    author: extract_text(&doc, f.author),
                    feed: extract_text(&doc, f.feed),
                    recent_date: extract_u64(&doc, f.recent),
                },
            });
        }

        Ok(results)
    }

    fn condition_query(&self, c: &SearchCondition) -> Result<Box<dyn Query>> {
        let f = self.fields;
        let query: Box<dyn Query> = match (&c.value, c.field) {
            (SearchValue::Text(text), SearchField::AllFields) => {
                self.text_query(
                    &[
                        (f.title, f.title_raw, 2.0),
                        (f.content, f.content, 1.0),
                        (f.author, f.author_raw, 1.0),
                    ],
                    c.specifier,
                    text,
                )?
            }
            (SearchValue::Text(text), SearchField::Title) => self.text_query(
                &[(f.title, f.title_raw, 1.0)],
                c.specifier,
                text,
            )?,
            (SearchValue::Text(text), SearchField::Content) => self.text_query(
                &[(f.content, f.content, 1.0)],
                c.specifier,
                text,
            )?,
            (SearchValue::Text(text), SearchField::Author) => self.text_query(
                &[(f.author, f.author_raw, 1.0)],
                c.specifier,
                text,
            )?,
            (SearchValue::Text(text), SearchField::Category) => {
                self.keyword_query(f.category, c.specifier, text)?
            }
            (SearchValue::Text(text), SearchField::Label) => {
                self.keyword_query(f.label, c.specifier, text)?
            }
            (SearchValue::Text(text), SearchField::Feed) => {
                self.keyword_query(f.feed, c.specifier, text)?
            }
            (SearchValue::Text(text), SearchField::Link) => {
                self.keyword_query(f.link, c.specifier, text)?
            }
            (SearchValue::States(states), SearchField::State) => {
                let any_of: Vec<(Occur, Box<dyn Query>)> = states
                    .iter()
                    .map(|s| (Occur::Should, u64_term_query(f.state, s.code())))
                    .collect();
                negate_if(c.specifier, Box::new(BooleanQuery::new(any_of)))
            }
            (SearchValue::Bool(flag), SearchField::Flagged) => negate_if(
                c.specifier,
                u64_term_query(f.flagged, u64::from(*flag)),
            ),
            (SearchValue::Date(date), SearchField::Published) => {
                date_query(f.published, c.specifier, *date)
            }
            (SearchValue::Date(date), SearchField::Received) => {
                date_query(f.received, c.specifier, *date)
            }
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "{:?} cannot be searched with {:?}",
                    c.field, c.value
                )));
            }
        };
        Ok(query)
    }

    /// Word and phrase-level matching over tokenized text fields.
    ///
    /// Each target is `(tokenized field, raw field, boost)`; the raw field
    /// serves exact and prefix/suffix matches against the whole value.
    fn text_query(
        &self,
        targets: &[(Field, Field, f32)],
        specifier: Specifier,
        text: &str,
    ) -> Result<Box<dyn Query>> {
        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for &(field, raw_field, boost) in targets {
            let query = match specifier {
                Specifier::Contains | Specifier::ContainsNot => {
                    self.words_query(field, text, Occur::Should)?
                }
                Specifier::ContainsAll => {
                    self.words_query(field, text, Occur::Must)?
                }
                Specifier::Is | Specifier::IsNot if raw_field != field => {
                    raw_term_query(raw_field, text)
                }
                Specifier::Is | Specifier::IsNot => {
                    self.words_query(field, text, Occur::Must)?
                }
                Specifier::BeginsWith | Specifier::EndsWith
                    if raw_field != field =>
                {
                    affix_query(raw_field, specifier, text)?
                }
                Specifier::BeginsWith | Specifier::EndsWith => {
                    self.words_query(field, text, Occur::Must)?
                }
                Specifier::IsBefore | Specifier::IsAfter => {
                    return Err(Error::InvalidQuery(format!(
                        "{specifier:?} is not a text comparison"
                    )));
                }
            };
            let query: Box<dyn Query> = if boost != 1.0 {
                Box::new(BoostQuery::new(query, boost))
            } else {
                query
            };
            per_field.push((Occur::Should, query));
        }

        let any_field: Box<dyn Query> = if per_field.len() == 1 {
            per_field.remove(0).1
        } else {
            Box::new(BooleanQuery::new(per_field))
        };
        Ok(negate_if(specifier, any_field))
    }

    /// One term clause per token of `text`, analyzed like the field itself.
    fn words_query(
        &self,
        field: Field,
        text: &str,
        occur: Occur,
    ) -> Result<Box<dyn Query>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut tokens = Vec::new();
        let mut stream = analyzer.token_stream(text);
        stream.process(&mut |token| tokens.push(token.text.clone()));

        if tokens.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }
        tokens.sort();
        tokens.dedup();

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .into_iter()
            .map(|token| {
                let term = Term::from_field_text(field, &token);
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    term,
                    IndexRecordOption::WithFreqs,
                ));
                (occur, query)
            })
            .collect();
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn keyword_query(
        &self,
        field: Field,
        specifier: Specifier,
        text: &str,
    ) -> Result<Box<dyn Query>> {
        let query = match specifier {
            Specifier::Is | Specifier::IsNot => raw_term_query(field, text),
            Specifier::BeginsWith | Specifier::EndsWith => {
                affix_query(field, specifier, text)?
            }
            other => {
                return Err(Error::InvalidQuery(format!(
                    "{other:?} is not supported on keyword fields"
                )));
            }
        };
        Ok(negate_if(specifier, query))
    }
}

impl ContentIndex for NewsIndex {
    fn execute(
        &self,
        conditions: &[SearchCondition],
        match_all: bool,
    ) -> Result<Vec<RankedHit>> {
        self.search(conditions, match_all)
    }
}

impl std::fmt::Debug for NewsIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsIndex").finish_non_exhaustive()
    }
}

/// Wrap negated specifiers as "everything except".
fn negate_if(specifier: Specifier, query: Box<dyn Query>) -> Box<dyn Query> {
    if specifier.is_negation() {
        Box::new(BooleanQuery::new(vec![
            (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
            (Occur::MustNot, query),
        ]))
    } else {
        query
    }
}

fn raw_term_query(field: Field, text: &str) -> Box<dyn Query> {
    let term = Term::from_field_text(field, &text.trim().to_lowercase());
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

fn u64_term_query(field: Field, value: u64) -> Box<dyn Query> {
    let term = Term::from_field_u64(field, value);
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

fn affix_query(
    field: Field,
    specifier: Specifier,
    text: &str,
) -> Result<Box<dyn Query>> {
    let escaped = regex::escape(&text.trim().to_lowercase());
    let pattern = match specifier {
        Specifier::EndsWith => format!(".*{escaped}"),
        _ => format!("{escaped}.*"),
    };
    Ok(Box::new(RegexQuery::from_pattern(&pattern, field)?))
}

/// `Is` matches the whole UTC day containing `date`.
fn date_query(
    field: Field,
    specifier: Specifier,
    date: u64,
) -> Box<dyn Query> {
    let term = |v: u64| Term::from_field_u64(field, v);
    let (lower, upper) = match specifier {
        Specifier::IsBefore => (Bound::Unbounded, Bound::Excluded(term(date))),
        Specifier::IsAfter => (Bound::Excluded(term(date)), Bound::Unbounded),
        _ => {
            let start = date - date % SECONDS_PER_DAY;
            let end = start
                .checked_add(SECONDS_PER_DAY)
                .map_or(Bound::Unbounded, |end| Bound::Excluded(term(end)));
            (Bound::Included(term(start)), end)
        }
    };
    Box::new(RangeQuery::new(lower, upper))
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "https://feed.example/rss";

    fn item(guid: &str, title: &str, content: &str) -> NewsItem {
        let mut item = NewsItem::new(FEED, guid, title, 1_000);
        item.content = content.to_string();
        item
    }

    fn index_with(items: &[NewsItem]) -> NewsIndex {
        let idx = NewsIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        for item in items {
            idx.add_item(&writer, item).unwrap();
        }
        writer.commit().unwrap();
        idx
    }

    fn titles(hits: &[RankedHit]) -> Vec<String> {
        let mut t: Vec<_> =
            hits.iter().map(|h| h.attributes.title.clone()).collect();
        t.sort();
        t
    }

    fn find(idx: &NewsIndex, cond: SearchCondition) -> Vec<String> {
        titles(&idx.search(&[cond], true).unwrap())
    }

    fn contains(field: SearchField, text: &str) -> SearchCondition {
        SearchCondition::text(field, Specifier::Contains, text)
    }

    fn sample() -> Vec<NewsItem> {
        let mut rust = item(
            "1",
            "Rust 2.0 released",
            "The Rust team ships memory safety",
        );
        rust.author = "Jane Doe".into();
        rust.categories = vec!["Programming".into()];
        rust.published = Some(1_700_000_000);

        let mut pasta = item("2", "Cooking pasta", "Boil water and add salt");
        pasta.author = "Chef Luigi".into();
        pasta.categories = vec!["Food".into()];
        pasta.state = NewsState::Read;
        pasta.flagged = true;
        pasta.published = Some(1_600_000_000);

        let mut garden =
            item("3", "Gardening tips", "Water plants and prune leaves");
        garden.state = NewsState::Hidden;
        garden.labels = vec!["Later".into()];

        vec![rust, pasta, garden]
    }

    #[test]
    fn contains_matches_stemmed_words() {
        let idx = index_with(&sample());
        let found = find(&idx, contains(SearchField::Content, "boiling"));
        assert_eq!(found, vec!["Cooking pasta"]);
    }

    #[test]
    fn all_fields_covers_title_and_content() {
        let idx = index_with(&sample());
        let hits = idx
            .search(&[contains(SearchField::AllFields, "water")], true)
            .unwrap();
        assert_eq!(titles(&hits), vec!["Cooking pasta", "Gardening tips"]);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn match_all_versus_match_any() {
        let idx = index_with(&sample());
        let conds = vec![
            contains(SearchField::Title, "rust"),
            contains(SearchField::Title, "pasta"),
        ];
        assert!(idx.search(&conds, true).unwrap().is_empty());
        assert_eq!(idx.search(&conds, false).unwrap().len(), 2);
    }

    #[test]
    fn contains_all_requires_every_word() {
        let idx = index_with(&sample());
        let cond = SearchCondition::text(
            SearchField::Content,
            Specifier::ContainsAll,
            "water salt",
        );
        assert_eq!(find(&idx, cond), vec!["Cooking pasta"]);
    }

    #[test]
    fn contains_not_excludes() {
        let idx = index_with(&sample());
        let cond = SearchCondition::text(
            SearchField::Content,
            Specifier::ContainsNot,
            "water",
        );
        assert_eq!(find(&idx, cond), vec!["Rust 2.0 released"]);
    }

    #[test]
    fn title_is_and_affixes() {
        let idx = index_with(&sample());
        let title = |specifier, text| {
            SearchCondition::text(SearchField::Title, specifier, text)
        };

        let is = title(Specifier::Is, "cooking PASTA");
        assert_eq!(find(&idx, is), vec!["Cooking pasta"]);

        let begins = title(Specifier::BeginsWith, "Rust 2.");
        assert_eq!(find(&idx, begins), vec!["Rust 2.0 released"]);

        let ends = title(Specifier::EndsWith, "tips");
        assert_eq!(find(&idx, ends), vec!["Gardening tips"]);
    }

    #[test]
    fn author_and_category_keywords() {
        let idx = index_with(&sample());
        let author =
            SearchCondition::text(SearchField::Author, Specifier::Is, "jane doe");
        assert_eq!(find(&idx, author), vec!["Rust 2.0 released"]);

        let category =
            SearchCondition::text(SearchField::Category, Specifier::IsNot, "food");
        assert_eq!(
            find(&idx, category),
            vec!["Gardening tips", "Rust 2.0 released"]
        );

        let label =
            SearchCondition::text(SearchField::Label, Specifier::Is, "later");
        assert_eq!(find(&idx, label), vec!["Gardening tips"]);
    }

    #[test]
    fn state_flag_and_dates() {
        let idx = index_with(&sample());

        let read = SearchCondition::states(
            Specifier::Is,
            &[NewsState::Read, NewsState::Hidden],
        );
        assert_eq!(find(&idx, read), vec!["Cooking pasta", "Gardening tips"]);

        let flagged = SearchCondition::new(
            SearchField::Flagged,
            Specifier::Is,
            SearchValue::Bool(true),
        );
        assert_eq!(find(&idx, flagged), vec!["Cooking pasta"]);

        let after = SearchCondition::new(
            SearchField::Published,
            Specifier::IsAfter,
            SearchValue::Date(1_650_000_000),
        );
        assert_eq!(find(&idx, after), vec!["Rust 2.0 released"]);

        let same_day = SearchCondition::new(
            SearchField::Published,
            Specifier::Is,
            SearchValue::Date(1_600_000_000 + 60),
        );
        assert_eq!(find(&idx, same_day), vec!["Cooking pasta"]);
    }

    #[test]
    fn date_edges_do_not_overflow() {
        let mut items = sample();
        items[2].published = Some(u64::MAX - 10);
        let idx = index_with(&items);
        let published = |specifier, date| {
            SearchCondition::new(
                SearchField::Published,
                specifier,
                SearchValue::Date(date),
            )
        };

        let last_day = published(Specifier::Is, u64::MAX);
        assert_eq!(find(&idx, last_day), vec!["Gardening tips"]);
        assert!(find(&idx, published(Specifier::IsAfter, u64::MAX)).is_empty());
        assert!(find(&idx, published(Specifier::IsBefore, 0)).is_empty());
        assert_eq!(find(&idx, published(Specifier::Is, 0)).len(), 0);
    }

    #[test]
    fn hits_carry_state_and_attributes() {
        let idx = index_with(&sample());
        let hits = idx
            .search(&[contains(SearchField::Title, "gardening")], true)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].state, NewsState::Hidden);
        assert_eq!(hits[0].item_ref, ItemRef::new(FEED, "3"));
        assert_eq!(hits[0].attributes.feed, FEED);
        assert_eq!(hits[0].attributes.recent_date, 1_000);
    }

    #[test]
    fn add_item_replaces_previous_version() {
        let mut items = sample();
        let idx = index_with(&items);
        let mut writer = idx.writer(15_000_000).unwrap();
        items[0].title = "Rust 2.1 released".into();
        idx.add_item(&writer, &items[0]).unwrap();
        writer.commit().unwrap();

        let found = find(&idx, contains(SearchField::Title, "released"));
        assert_eq!(found, vec!["Rust 2.1 released"]);
        assert_eq!(idx.num_docs().unwrap(), 3);
    }

    #[test]
    fn delete_item_removes_it() {
        let items = sample();
        let idx = index_with(&items);
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.delete_item(&writer, items[1].item_ref);
        writer.commit().unwrap();
        assert!(find(&idx, contains(SearchField::Title, "pasta")).is_empty());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let idx = NewsIndex::open_in_ram().unwrap();
        let found = find(&idx, contains(SearchField::AllFields, "rust"));
        assert!(found.is_empty());
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tantivy");
        {
            let idx = NewsIndex::open(&dir).unwrap();
            let mut writer = idx.writer(15_000_000).unwrap();
            let doc = item("p", "Persistent", "data survives");
            idx.add_item(&writer, &doc).unwrap();
            writer.commit().unwrap();
        }
        let idx = NewsIndex::open(&dir).unwrap();
        let found = find(&idx, contains(SearchField::Content, "survives"));
        assert_eq!(found.len(), 1);
    }
}

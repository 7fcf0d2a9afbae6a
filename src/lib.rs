//! feedsearch - live search over a feed reader's news items.
//!
//! A [`SearchSession`] runs a structured, multi-condition query against a
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index, sorts the hits
//! into relevance tiers, and keeps its result set correct while the corpus
//! keeps changing underneath it: items that are deleted or hidden drop out,
//! items that are updated are refreshed in place.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feedsearch::{
//!     Corpus, DataDir, QueryExecutor, SearchCondition, SearchField,
//!     SearchService, SessionConfig, Specifier,
//! };
//!
//! # async fn run() -> feedsearch::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let corpus = Corpus::open(&data_dir)?;
//! let config = SessionConfig::from_store(corpus.store())?;
//!
//! let service = SearchService::new(
//!     QueryExecutor::new(corpus.index().clone()),
//!     Arc::new(corpus.bus().clone()),
//!     corpus.store().clone(),
//!     config,
//! );
//!
//! let conditions = vec![SearchCondition::text(
//!     SearchField::Title,
//!     Specifier::Contains,
//!     "rust",
//! )];
//! let mut session = service.search(conditions, true)?;
//! session.wait_for_completion().await;
//! for hit in session.snapshot().hits {
//!     let title = &hit.attributes.title;
//!     println!("{} {:?} {title}", hit.item_ref, hit.relevance);
//! }
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod config;
pub mod corpus;
pub mod data_dir;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod item_ref;
pub mod news;
pub mod news_index;
pub mod news_store;
pub mod reconcile;
pub mod relevance;
pub mod result_set;
pub mod search;
pub mod session;

pub use condition::{SearchCondition, SearchField, SearchValue, Specifier};
pub use config::SessionConfig;
pub use corpus::Corpus;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use event_bus::{EntityKind, EventBus, MutationBus, MutationEvent};
pub use executor::{ContentIndex, QueryExecutor, RankedHit};
pub use item_ref::ItemRef;
pub use news::{NewsItem, NewsState};
pub use news_index::NewsIndex;
pub use news_store::{NewsStore, ReferenceResolver};
pub use reconcile::ReconciliationListener;
pub use relevance::Relevance;
pub use result_set::{ResultSet, SortKey};
pub use session::{SearchService, SearchSession, SessionState, SessionUpdate};

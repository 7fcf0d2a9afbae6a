use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    news::NewsState,
};

/// Entity-type name of the news corpus.
pub const NEWS_ENTITY: &str = "news";

/// The attribute a condition tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    AllFields,
    Title,
    Content,
    Author,
    Category,
    Label,
    Feed,
    Link,
    State,
    Flagged,
    Published,
    Received,
}

/// How the value is compared against the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specifier {
    Is,
    IsNot,
    /// Any of the value's words.
    Contains,
    /// Every one of the value's words.
    ContainsAll,
    ContainsNot,
    BeginsWith,
    EndsWith,
    IsBefore,
    IsAfter,
}

impl Specifier {
    pub fn is_negation(self) -> bool {
        matches!(self, Specifier::IsNot | Specifier::ContainsNot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchValue {
    Text(String),
    States(Vec<NewsState>),
    Bool(bool),
    /// Seconds since the Unix epoch.
    Date(u64),
}

/// One row of the search form. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCondition {
    pub field: SearchField,
    pub entity: String,
    pub specifier: Specifier,
    pub value: SearchValue,
}

impl SearchCondition {
    pub fn new(
        field: SearchField,
        specifier: Specifier,
        value: SearchValue,
    ) -> Self {
        Self {
            field,
            entity: NEWS_ENTITY.to_string(),
            specifier,
            value,
        }
    }

    pub fn text(field: SearchField, specifier: Specifier, text: &str) -> Self {
        Self::new(field, specifier, SearchValue::Text(text.to_string()))
    }

    pub fn states(specifier: Specifier, states: &[NewsState]) -> Self {
        Self::new(
            SearchField::State,
            specifier,
            SearchValue::States(states.to_vec()),
        )
    }

    /// Whether the value carries something a query can be built from.
    pub fn has_usable_value(&self) -> bool {
        match &self.value {
            SearchValue::Text(text) => !text.trim().is_empty(),
            SearchValue::States(states) => !states.is_empty(),
            SearchValue::Bool(_) | SearchValue::Date(_) => true,
        }
    }

    /// Check that the field, specifier and value kinds fit together.
    pub fn validate(&self) -> Result<()> {
        use SearchField as F;
        use Specifier as S;

        if self.entity != NEWS_ENTITY {
            return Err(Error::InvalidQuery(format!(
                "unsupported entity '{}'",
                self.entity
            )));
        }

        let ok = match (&self.value, self.field) {
            (
                SearchValue::Text(_),
                F::AllFields | F::Title | F::Content | F::Author,
            ) => matches!(
                self.specifier,
                S::Is
                    | S::IsNot
                    | S::Contains
                    | S::ContainsAll
                    | S::ContainsNot
                    | S::BeginsWith
                    | S::EndsWith
            ),
            (SearchValue::Text(_), F::Category | F::Label | F::Feed | F::Link) => {
                matches!(
                    self.specifier,
                    S::Is | S::IsNot | S::BeginsWith | S::EndsWith
                )
            }
            (SearchValue::States(_), F::State) => {
                matches!(self.specifier, S::Is | S::IsNot)
            }
            (SearchValue::Bool(_), F::Flagged) => {
                matches!(self.specifier, S::Is | S::IsNot)
            }
            (SearchValue::Date(_), F::Published | F::Received) => {
                matches!(self.specifier, S::Is | S::IsBefore | S::IsAfter)
            }
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidQuery(format!(
                "{:?} {:?} does not accept {:?}",
                self.field, self.specifier, self.value
            )))
        }
    }
}

/// Caller-side precondition of every query: at least one condition, at least
/// one of them usable, and every condition well-formed.
pub fn validate_conditions(conditions: &[SearchCondition]) -> Result<()> {
    if conditions.is_empty() {
        return Err(Error::InvalidQuery("no search conditions".into()));
    }
    if !conditions.iter().any(SearchCondition::has_usable_value) {
        return Err(Error::InvalidQuery(
            "no search condition carries a value".into(),
        ));
    }
    conditions.iter().try_for_each(SearchCondition::validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            validate_conditions(&[]),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn blank_values_are_rejected() {
        let conds = vec![
            SearchCondition::text(SearchField::Title, Specifier::Contains, "  "),
            SearchCondition::states(Specifier::Is, &[]),
        ];
        assert!(validate_conditions(&conds).is_err());
    }

    #[test]
    fn one_usable_condition_is_enough() {
        let conds = vec![
            SearchCondition::text(SearchField::Title, Specifier::Contains, ""),
            SearchCondition::text(SearchField::Content, Specifier::Contains, "rust"),
        ];
        validate_conditions(&conds).unwrap();
    }

    #[test]
    fn mismatched_value_kind_is_rejected() {
        let cond = SearchCondition::new(
            SearchField::Published,
            Specifier::Contains,
            SearchValue::Text("yesterday".into()),
        );
        assert!(cond.validate().is_err());

        let cond = SearchCondition::text(
            SearchField::Category,
            Specifier::ContainsAll,
            "tech",
        );
        assert!(cond.validate().is_err());
    }

    #[test]
    fn foreign_entity_is_rejected() {
        let mut cond =
            SearchCondition::text(SearchField::Title, Specifier::Is, "x");
        cond.entity = "feed".into();
        assert!(cond.validate().is_err());
    }
}

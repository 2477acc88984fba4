use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::fields;
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};
use crate::trie::{Completion, PrefixTrie};

pub const DEFAULT_PREFIX_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Name,
    Email,
    Id,
}

impl SearchField {
    pub const ALL: [SearchField; 3] = [SearchField::Name, SearchField::Email, SearchField::Id];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub name_path: String,
    pub email_path: String,
    pub id_path: String,
    pub score_path: String,
    pub recency_path: String,
    pub id_like_paths: Vec<String>,
    pub text_paths: Vec<String>,
    pub prefix_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            name_path: "display_name".to_string(),
            email_path: "email".to_string(),
            id_path: "student_id".to_string(),
            score_path: "aggregate_score".to_string(),
            recency_path: "last_active".to_string(),
            id_like_paths: vec!["student_id".to_string()],
            text_paths: vec![
                "title".to_string(),
                "description".to_string(),
                "category".to_string(),
                "display_name".to_string(),
            ],
            prefix_limit: DEFAULT_PREFIX_LIMIT,
        }
    }
}

impl SearchConfig {
    fn path(&self, field: SearchField) -> &str {
        match field {
            SearchField::Name => &self.name_path,
            SearchField::Email => &self.email_path,
            SearchField::Id => &self.id_path,
        }
    }

    fn validate(&self) -> Result<()> {
        for field in SearchField::ALL {
            if self.path(field).trim().is_empty() {
                return Err(AnalyticsError::validation(format!(
                    "search path for {field:?} is empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch<'a> {
    pub record: &'a Value,
    pub distance: usize,
}

type FieldArray = Vec<(String, usize)>;

pub struct SearchIndex {
    docs: Vec<Value>,
    names: FieldArray,
    emails: FieldArray,
    ids: FieldArray,
    trie: PrefixTrie,
    config: SearchConfig,
}

impl SearchIndex {
    pub fn build(docs: Vec<Value>, config: SearchConfig, telemetry: SharedTelemetry) -> Result<Self> {
        config.validate()?;

        let names = field_array(&docs, &config.name_path);
        let emails = field_array(&docs, &config.email_path);
        let ids = field_array(&docs, &config.id_path);

        let mut trie = PrefixTrie::new();
        for (record, doc) in docs.iter().enumerate() {
            for path in config.text_paths.iter() {
                if let Some(text) = fields::text(doc, path) {
                    trie.insert_text(&text, record);
                }
            }
        }

        telemetry.record(&TelemetryEvent::SearchIndexBuilt {
            records: docs.len(),
            terms: trie.term_count(),
        });

        Ok(Self {
            docs,
            names,
            emails,
            ids,
            trie,
            config,
        })
    }

    pub fn from_records<T: Serialize>(records: &[T], config: SearchConfig) -> Result<Self> {
        Self::from_records_with_telemetry(records, config, telemetry::noop())
    }

    pub fn from_records_with_telemetry<T: Serialize>(
        records: &[T],
        config: SearchConfig,
        telemetry: SharedTelemetry,
    ) -> Result<Self> {
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::build(docs, config, telemetry)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, record: usize) -> Option<&Value> {
        self.docs.get(record)
    }

    /// Case-insensitive equality via binary search. With duplicate keys,
    /// whichever one the search lands on first is returned.
    pub fn exact_search(&self, field: SearchField, value: &str) -> Option<&Value> {
        self.exact_record(field, &value.to_lowercase())
            .map(|record| &self.docs[record])
    }

    /// Up to `prefix_limit` records whose field starts with `prefix`,
    /// highest score first, then most recent.
    pub fn prefix_search(&self, field: SearchField, prefix: &str) -> Vec<&Value> {
        self.prefix_records(field, &prefix.to_lowercase())
            .into_iter()
            .map(|record| &self.docs[record])
            .collect()
    }

    /// Union of exact, prefix, name-token, email and id-like matches,
    /// one entry per record.
    pub fn multi_field_search(&self, query: &str) -> Vec<&Value> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        let mut push = |record: usize| {
            if seen.insert(record) {
                hits.push(record);
            }
        };

        for field in SearchField::ALL {
            if let Some(record) = self.exact_record(field, &needle) {
                push(record);
            }
            for record in self.prefix_records(field, &needle) {
                push(record);
            }
        }

        for (record, doc) in self.docs.iter().enumerate() {
            let name_hit = fields::folded(doc, &self.config.name_path).is_some_and(|name| {
                name.split_whitespace().any(|token| token.contains(&needle))
            });
            let email_hit = fields::folded(doc, &self.config.email_path)
                .is_some_and(|email| email.contains(&needle));
            let id_hit = self.config.id_like_paths.iter().any(|path| {
                fields::folded(doc, path).is_some_and(|value| value.contains(&needle))
            });
            if name_hit || email_hit || id_hit {
                push(record);
            }
        }

        hits.into_iter().map(|record| &self.docs[record]).collect()
    }

    pub fn autocomplete(&self, prefix: &str, limit: usize) -> Vec<Completion<'_>> {
        self.trie.autocomplete(prefix, limit)
    }

    pub fn fuzzy_search(&self, term: &str, max_edit_ops: usize) -> Vec<FuzzyMatch<'_>> {
        self.trie
            .fuzzy(term, max_edit_ops)
            .into_iter()
            .map(|hit| FuzzyMatch {
                record: &self.docs[hit.record],
                distance: hit.distance,
            })
            .collect()
    }

    fn array(&self, field: SearchField) -> &FieldArray {
        match field {
            SearchField::Name => &self.names,
            SearchField::Email => &self.emails,
            SearchField::Id => &self.ids,
        }
    }

    fn exact_record(&self, field: SearchField, needle: &str) -> Option<usize> {
        let keys = self.array(field);
        let (mut low, mut high) = (0, keys.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match keys[mid].0.as_str().cmp(needle) {
                Ordering::Equal => return Some(keys[mid].1),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }
        None
    }

    fn prefix_records(&self, field: SearchField, needle: &str) -> Vec<usize> {
        let keys = self.array(field);
        let (mut low, mut high) = (0, keys.len());
        let mut leftmost = None;
        while low < high {
            let mid = low + (high - low) / 2;
            let key = keys[mid].0.as_str();
            if key.starts_with(needle) {
                leftmost = Some(mid);
                high = mid;
            } else if key < needle {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        let Some(start) = leftmost else {
            return Vec::new();
        };

        let mut records: Vec<usize> = keys[start..]
            .iter()
            .take_while(|(key, _)| key.starts_with(needle))
            .map(|(_, record)| *record)
            .collect();
        records.sort_by(|a, b| self.compare_relevance(*a, *b));
        records.truncate(self.config.prefix_limit);
        records
    }

    fn compare_relevance(&self, a: usize, b: usize) -> Ordering {
        let score = |record: usize| fields::number(&self.docs[record], &self.config.score_path);
        let recency = |record: usize| fields::text(&self.docs[record], &self.config.recency_path);
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| recency(b).cmp(&recency(a)))
    }
}

fn field_array(docs: &[Value], path: &str) -> FieldArray {
    let mut keys: FieldArray = docs
        .iter()
        .enumerate()
        .filter_map(|(record, doc)| fields::folded(doc, path).map(|key| (key, record)))
        .collect();
    keys.sort_by(|a, b| a.0.cmp(&b.0));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> SearchIndex {
        let docs = vec![
            json!({"student_id": "S1", "display_name": "Avery Lee", "email": "a@x.com",
                   "aggregate_score": 12.0, "last_active": "2026-02-01"}),
            json!({"student_id": "S2", "display_name": "Jules Moreno", "email": "b@x.com",
                   "aggregate_score": 30.0, "last_active": "2026-01-15"}),
            json!({"student_id": "S3", "display_name": "Avery Patel", "email": "avery.p@x.com",
                   "aggregate_score": 12.0, "last_active": "2026-02-05",
                   "category": "quiz", "title": "Weekly quiz"}),
            json!({"student_id": "S10", "display_name": "Kiara Moreno", "email": "k@x.com",
                   "aggregate_score": 4.0}),
        ];
        SearchIndex::build(docs, SearchConfig::default(), telemetry::noop()).unwrap()
    }

    fn ids(values: &[&Value]) -> Vec<String> {
        values
            .iter()
            .filter_map(|v| fields::text(v, "student_id"))
            .collect()
    }

    #[test]
    fn exact_search_ignores_case() {
        let index = index();
        let hit = index.exact_search(SearchField::Email, "A@X.COM").unwrap();
        assert_eq!(fields::text(hit, "student_id").as_deref(), Some("S1"));
        assert!(index.exact_search(SearchField::Id, "S4").is_none());
        assert!(index.exact_search(SearchField::Name, "avery").is_none());
    }

    #[test]
    fn prefix_search_orders_by_score_then_recency() {
        let index = index();
        let hits = index.prefix_search(SearchField::Name, "av");
        assert_eq!(ids(&hits), vec!["S3", "S1"]);

        let hits = index.prefix_search(SearchField::Id, "s1");
        assert_eq!(ids(&hits), vec!["S1", "S10"]);
        assert!(index.prefix_search(SearchField::Email, "zz").is_empty());
    }

    #[test]
    fn prefix_search_is_capped() {
        let docs: Vec<Value> = (0..30)
            .map(|i| json!({"student_id": format!("S{i:02}"), "display_name": "Sam", "email": "s@x.com"}))
            .collect();
        let index = SearchIndex::build(docs, SearchConfig::default(), telemetry::noop()).unwrap();
        assert_eq!(index.prefix_search(SearchField::Id, "s").len(), DEFAULT_PREFIX_LIMIT);
    }

    #[test]
    fn multi_field_contains_exact_hits() {
        let index = index();
        let hits = index.multi_field_search("a@x.com");
        assert!(ids(&hits).contains(&"S1".to_string()));

        for field in SearchField::ALL {
            for query in ["S2", "jules moreno", "b@x.com"] {
                if let Some(exact) = index.exact_search(field, query) {
                    assert!(index.multi_field_search(query).contains(&exact));
                }
            }
        }
    }

    #[test]
    fn multi_field_matches_tokens_and_dedupes() {
        let index = index();
        let hits = ids(&index.multi_field_search("moreno"));
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&"S2".to_string()) && hits.contains(&"S10".to_string()));

        let hits = ids(&index.multi_field_search("oren"));
        assert_eq!(hits, vec!["S2", "S10"]);

        let hits = ids(&index.multi_field_search("avery"));
        assert_eq!(hits.len(), 2);
        assert!(index.multi_field_search("   ").is_empty());
    }

    #[test]
    fn text_features_use_trie() {
        let index = index();
        let terms: Vec<&str> = index.autocomplete("qu", 5).iter().map(|c| c.term).collect();
        assert_eq!(terms, vec!["quiz"]);

        let fuzzy = index.fuzzy_search("qiz", 1);
        assert_eq!(fuzzy.len(), 1);
        assert_eq!(fields::text(fuzzy[0].record, "student_id").as_deref(), Some("S3"));
        assert!(index.fuzzy_search("qzz", 1).is_empty());
    }

    #[test]
    fn rejects_empty_field_paths() {
        let config = SearchConfig {
            email_path: String::new(),
            ..SearchConfig::default()
        };
        assert!(SearchIndex::build(Vec::new(), config, telemetry::noop()).is_err());
    }
}

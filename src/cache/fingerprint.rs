//! Query Fingerprint Module
//!
//! Canonicalizes paged queries into deterministic string keys.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// == Fingerprint ==
/// Deterministic cache key for a paged query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already-canonical key, e.g. one read back from the durable store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Page Query ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Parameters of one page request against a named resource.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageQuery {
    /// Resource collection the page belongs to, e.g. `invoices`
    pub resource: String,
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub search: Option<String>,
}

impl PageQuery {
    pub fn new(resource: impl Into<String>, page: u32, page_size: u32) -> Self {
        Self {
            resource: resource.into(),
            page,
            page_size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    // == Fingerprint ==
    /// Derives the cache key.
    ///
    /// Filter objects are canonicalized at every depth: keys are sorted and
    /// null or empty values are dropped, so logically identical queries map
    /// to the same key whatever order their filters were built in.
    pub fn fingerprint(&self) -> Fingerprint {
        let sort = match &self.sort_field {
            Some(field) if !field.trim().is_empty() => {
                format!("{}:{}", escape(field.trim()), self.sort_order.as_str())
            }
            _ => "-".to_string(),
        };
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("");

        Fingerprint(format!(
            "{}|p={}|n={}|s={}|f={}|q={}",
            escape(&self.resource),
            self.page,
            self.page_size,
            sort,
            escape(&self.filter_fingerprint().unwrap_or_default()),
            escape(search)
        ))
    }

    /// Canonical JSON of the filter set, `None` when no filter is active.
    pub fn filter_fingerprint(&self) -> Option<String> {
        let object: Map<String, Value> = self
            .filters
            .iter()
            .filter_map(|(k, v)| canonicalize(v).map(|v| (k.clone(), v)))
            .collect();

        if object.is_empty() {
            None
        } else {
            Some(Value::Object(object).to_string())
        }
    }
}

/// Backslash-escapes the key's separators so free text cannot forge a field.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '|' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Returns the canonical form of a filter value, or `None` if it is empty.
fn canonicalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(Value::String(s.trim().to_string())),
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(canonicalize).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(fields) => {
            let sorted: BTreeMap<&String, Value> = fields
                .iter()
                .filter_map(|(k, v)| canonicalize(v).map(|v| (k, v)))
                .collect();
            if sorted.is_empty() {
                return None;
            }
            let mut object = Map::new();
            for (k, v) in sorted {
                object.insert(k.clone(), v);
            }
            Some(Value::Object(object))
        }
        other => Some(other.clone()),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_ignores_filter_order() {
        let a = PageQuery::new("invoices", 1, 20)
            .with_filter("status", "paid")
            .with_filter("customer", json!({"id": 7, "region": "eu"}));
        let b = PageQuery::new("invoices", 1, 20)
            .with_filter("customer", json!({"region": "eu", "id": 7}))
            .with_filter("status", "paid");

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_drops_empty_filters() {
        let bare = PageQuery::new("invoices", 1, 20);
        let noisy = PageQuery::new("invoices", 1, 20)
            .with_filter("status", Value::Null)
            .with_filter("tags", json!([]))
            .with_filter("q", "  ")
            .with_search("   ");

        assert_eq!(bare.fingerprint(), noisy.fingerprint());
        assert!(noisy.filter_fingerprint().is_none());
    }

    #[test]
    fn test_fingerprint_distinguishes_parameters() {
        let base = PageQuery::new("invoices", 1, 20);
        assert_ne!(base.fingerprint(), PageQuery::new("invoices", 2, 20).fingerprint());
        assert_ne!(base.fingerprint(), PageQuery::new("invoices", 1, 50).fingerprint());
        assert_ne!(base.fingerprint(), PageQuery::new("customers", 1, 20).fingerprint());
        assert_ne!(
            base.clone().sorted_by("date", SortOrder::Asc).fingerprint(),
            base.clone().sorted_by("date", SortOrder::Desc).fingerprint()
        );
        assert_ne!(base.clone().with_search("acme").fingerprint(), base.fingerprint());
    }

    #[test]
    fn test_fingerprint_starts_with_resource() {
        let fp = PageQuery::new("invoices", 3, 10).fingerprint();
        assert!(fp.as_str().starts_with("invoices|"));
    }

    #[test]
    fn test_fingerprint_separators_in_text_do_not_collide() {
        // Unescaped, both read "s=d:asc|f=|q=z:desc|f=|q="
        let sorted = PageQuery::new("invoices", 1, 20).sorted_by("d:asc|f=|q=z", SortOrder::Desc);
        let searched = PageQuery::new("invoices", 1, 20)
            .sorted_by("d", SortOrder::Asc)
            .with_search("z:desc|f=|q=");
        assert_ne!(sorted.fingerprint(), searched.fingerprint());

        let resource = PageQuery::new("a|p=1", 2, 20);
        assert!(resource.fingerprint().as_str().starts_with("a\\|p\\=1|p=2|"));
    }

    #[test]
    fn test_query_deserialize_defaults() {
        let query: PageQuery =
            serde_json::from_str(r#"{"resource": "invoices", "page": 1, "page_size": 25}"#).unwrap();
        assert_eq!(query.sort_order, SortOrder::Asc);
        assert!(query.filters.is_empty());
    }
}

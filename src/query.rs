//! Index query codec.
//!
//! Converts `{filters, sorts, offset, limit}` to and from the flat JSON:API
//! query parameters the transport sends, and provides the client-side
//! filter/sort used once an index is fully loaded.
//!
//! ## Parameter layout
//!
//! | Query part                 | Parameter            | Example value        |
//! |----------------------------|----------------------|----------------------|
//! | equality filter            | `filter[name]`       | `Bender`             |
//! | other filter ops           | `filter[name][op]`   | `filter[name][contains]=ben` |
//! | sorts (ordered)            | `sort`               | `name,-assemblyDate` |
//! | offset                     | `page[offset]`       | `20`                 |
//! | limit                      | `page[limit]`        | `10`                 |
//!
//! `decode(encode(q)) == q` holds for every well-formed `q`: field names are
//! non-empty, contain none of `[ ] ,`, do not start with `+`/`-`, and
//! `limit > 0`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_LIMIT: usize = 12;

/// Transport query representation (parameter name → raw value).
pub type TransportQuery = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    /// Case-insensitive substring match.
    Contains,
    Gte,
    Lte,
}

impl FilterOp {
    pub const ALL: [FilterOp; 5] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Contains,
        FilterOp::Gte,
        FilterOp::Lte,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Contains => "contains",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

/// Predicate applied to a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub op: FilterOp,
    pub value: String,
}

impl Predicate {
    pub fn new(op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }

    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(FilterOp::Eq, value)
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new(FilterOp::Contains, value)
    }

    /// Does a record's field value satisfy this predicate?
    pub fn matches(&self, field: &Value) -> bool {
        let Some(text) = value_text(field) else {
            // Missing / null fields only equal the empty string.
            return match self.op {
                FilterOp::Eq => self.value.is_empty(),
                FilterOp::Ne => !self.value.is_empty(),
                _ => false,
            };
        };

        match self.op {
            FilterOp::Eq => compare_text(&text, &self.value) == Ordering::Equal,
            FilterOp::Ne => compare_text(&text, &self.value) != Ordering::Equal,
            FilterOp::Contains => text.to_lowercase().contains(&self.value.to_lowercase()),
            FilterOp::Gte => compare_text(&text, &self.value) != Ordering::Less,
            FilterOp::Lte => compare_text(&text, &self.value) != Ordering::Greater,
        }
    }
}

/// Field name → predicate.  All predicates must hold (AND).
pub type Filters = BTreeMap<String, Predicate>;

// ---------------------------------------------------------------------------
// Sorts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key.  Parses from / renders to `name`, `+name` or `-name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    pub fn parse(s: &str) -> Result<Self, QueryError> {
        let (direction, field) = match s.as_bytes().first() {
            Some(b'-') => (Direction::Desc, &s[1..]),
            Some(b'+') => (Direction::Asc, &s[1..]),
            _ => (Direction::Asc, s),
        };
        if !is_field_name(field) {
            return Err(QueryError::BadField(s.to_string()));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.field),
            Direction::Desc => write!(f, "-{}", self.field),
        }
    }
}

impl TryFrom<String> for Sort {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Sort::parse(&s)
    }
}

impl From<Sort> for String {
    fn from(sort: Sort) -> Self {
        sort.to_string()
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Filters,
    pub sorts: Vec<Sort>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            filters: Filters::new(),
            sorts: Vec::new(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Query {
    /// Key identifying the result ordering (filters + sorts, no paging).
    pub fn shape_key(&self) -> String {
        let mut params = encode(self);
        params.remove(PAGE_OFFSET);
        params.remove(PAGE_LIMIT);
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("malformed field name in '{0}'")]
    BadField(String),
    #[error("unknown filter operator '{0}'")]
    BadOp(String),
    #[error("parameter '{key}' is not a valid number: '{value}'")]
    BadNumber { key: String, value: String },
    #[error("page[limit] must be greater than zero")]
    ZeroLimit,
}

const PAGE_OFFSET: &str = "page[offset]";
const PAGE_LIMIT: &str = "page[limit]";
const SORT: &str = "sort";

fn is_field_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(['+', '-'])
        && !s.contains(['[', ']', ','])
}

/// Encode a query into transport parameters.
pub fn encode(query: &Query) -> TransportQuery {
    let mut params = TransportQuery::new();

    for (field, predicate) in &query.filters {
        let key = match predicate.op {
            FilterOp::Eq => format!("filter[{}]", field),
            op => format!("filter[{}][{}]", field, op.as_str()),
        };
        params.insert(key, predicate.value.clone());
    }

    if !query.sorts.is_empty() {
        let sort = query
            .sorts
            .iter()
            .map(Sort::to_string)
            .collect::<Vec<_>>()
            .join(",");
        params.insert(SORT.to_string(), sort);
    }

    params.insert(PAGE_OFFSET.to_string(), query.offset.to_string());
    params.insert(PAGE_LIMIT.to_string(), query.limit.to_string());
    params
}

/// Decode transport parameters into a query.
///
/// Missing paging falls back to `0` / [`DEFAULT_LIMIT`]; unrelated
/// parameters are ignored.
pub fn decode(params: &TransportQuery) -> Result<Query, QueryError> {
    let mut query = Query::default();

    for (key, value) in params {
        if let Some(rest) = key.strip_prefix("filter[") {
            let (field, op) = parse_filter_key(rest).ok_or_else(|| QueryError::BadField(key.clone()))?;
            query
                .filters
                .insert(field.to_string(), Predicate::new(op?, value.clone()));
        } else if key == SORT {
            query.sorts = value
                .split(',')
                .filter(|s| !s.is_empty())
                .map(Sort::parse)
                .collect::<Result<_, _>>()?;
        } else if key == PAGE_OFFSET {
            query.offset = parse_number(key, value)?;
        } else if key == PAGE_LIMIT {
            query.limit = parse_number(key, value)?;
            if query.limit == 0 {
                return Err(QueryError::ZeroLimit);
            }
        }
    }

    Ok(query)
}

/// Split `name]` or `name][op]` (the part after `filter[`).
fn parse_filter_key(rest: &str) -> Option<(&str, Result<FilterOp, QueryError>)> {
    let (field, tail) = rest.split_once(']')?;
    if !is_field_name(field) {
        return None;
    }
    if tail.is_empty() {
        return Some((field, Ok(FilterOp::Eq)));
    }
    let op = tail.strip_prefix('[')?.strip_suffix(']')?;
    let parsed = FilterOp::parse(op).ok_or_else(|| QueryError::BadOp(op.to_string()));
    Some((field, parsed))
}

fn parse_number(key: &str, value: &str) -> Result<usize, QueryError> {
    value.parse().map_err(|_| QueryError::BadNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Client-side filter / sort
// ---------------------------------------------------------------------------

/// Look up `field` on a serialised record (`Null` when absent).
pub fn field_value<'a>(record: &'a Value, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&Value::Null)
}

pub fn matches_all(record: &Value, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(field, predicate)| predicate.matches(field_value(record, field)))
}

/// Keep the items satisfying every filter, preserving order.
pub fn filter_by_all<R: Serialize>(filters: &Filters, items: Vec<R>) -> Vec<R> {
    if filters.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            serde_json::to_value(item)
                .map(|record| matches_all(&record, filters))
                .unwrap_or(false)
        })
        .collect()
}

/// Stable multi-key sort; earlier sorts take precedence.
pub fn sort_by_all<R: Serialize>(sorts: &[Sort], items: Vec<R>) -> Vec<R> {
    if sorts.is_empty() {
        return items;
    }
    let mut keyed: Vec<(Value, R)> = items
        .into_iter()
        .map(|item| (serde_json::to_value(&item).unwrap_or(Value::Null), item))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_records(a, b, sorts));
    keyed.into_iter().map(|(_, item)| item).collect()
}

pub fn compare_records(a: &Value, b: &Value, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let ord = compare_values(field_value(a, &sort.field), field_value(b, &sort.field));
        let ord = match sort.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order over JSON scalars: null < bool < number < string < other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Numeric comparison when both sides parse as numbers, else lexicographic.
fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_query() -> Query {
        let mut filters = Filters::new();
        filters.insert("name".into(), Predicate::eq("Bender"));
        filters.insert("manufacturer".into(), Predicate::contains("mom"));
        Query {
            filters,
            sorts: vec![Sort::asc("name"), Sort::desc("assemblyDate")],
            offset: 20,
            limit: 10,
        }
    }

    #[test]
    fn encode_uses_jsonapi_layout() {
        let params = encode(&sample_query());
        assert_eq!(params["filter[name]"], "Bender");
        assert_eq!(params["filter[manufacturer][contains]"], "mom");
        assert_eq!(params["sort"], "name,-assemblyDate");
        assert_eq!(params["page[offset]"], "20");
        assert_eq!(params["page[limit]"], "10");
    }

    #[test]
    fn decode_inverts_encode() {
        let q = sample_query();
        assert_eq!(decode(&encode(&q)).unwrap(), q);
    }

    #[test]
    fn decode_defaults_paging_and_ignores_unknown_keys() {
        let mut params = TransportQuery::new();
        params.insert("utm_source".into(), "mail".into());
        let q = decode(&params).unwrap();
        assert_eq!(q, Query::default());
    }

    #[test]
    fn decode_rejects_garbage() {
        let mut params = TransportQuery::new();
        params.insert("page[limit]".into(), "ten".into());
        assert!(matches!(decode(&params), Err(QueryError::BadNumber { .. })));

        let mut params = TransportQuery::new();
        params.insert("filter[name][like]".into(), "x".into());
        assert_eq!(decode(&params), Err(QueryError::BadOp("like".into())));

        let mut params = TransportQuery::new();
        params.insert("page[limit]".into(), "0".into());
        assert_eq!(decode(&params), Err(QueryError::ZeroLimit));
    }

    #[test]
    fn plus_prefixed_sort_is_ascending() {
        assert_eq!(Sort::parse("+name").unwrap(), Sort::asc("name"));
        assert!(Sort::parse("-").is_err());
    }

    #[test]
    fn shape_key_ignores_paging() {
        let mut a = sample_query();
        let b = sample_query();
        a.offset = 0;
        a.limit = 99;
        assert_eq!(a.shape_key(), b.shape_key());
    }

    #[test]
    fn predicates_match_strings_and_numbers() {
        assert!(Predicate::eq("X").matches(&json!("X")));
        assert!(!Predicate::eq("X").matches(&json!("Y")));
        assert!(Predicate::contains("end").matches(&json!("Bender")));
        assert!(Predicate::new(FilterOp::Gte, "10").matches(&json!(12)));
        assert!(!Predicate::new(FilterOp::Lte, "10").matches(&json!(12)));
        assert!(Predicate::eq("").matches(&Value::Null));
        assert!(!Predicate::contains("a").matches(&Value::Null));
    }

    #[test]
    fn filter_and_sort_records() {
        let items = vec![
            json!({"name": "b", "age": 2}),
            json!({"name": "a", "age": 2}),
            json!({"name": "c", "age": 1}),
        ];
        let sorted = sort_by_all(&[Sort::desc("age"), Sort::asc("name")], items.clone());
        let names: Vec<_> = sorted.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let mut filters = Filters::new();
        filters.insert("age".into(), Predicate::eq("2"));
        assert_eq!(filter_by_all(&filters, items).len(), 2);
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::dao::query::{CompareOp, Filter, Sort, SortDirection};

pub const ID_SEPARATOR: &str = "::";
pub const END_SUFFIX: &str = "\u{ffff}";

/// Entity fields plus the CouchDB bookkeeping attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Deserialize)]
pub struct FindResponse<T> {
    pub docs: Vec<CouchDocument<T>>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// Body of a successful PUT.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub rev: String,
}

/// Error body CouchDB sends with 4xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub reason: String,
}

/// Minimal view used to check revision and partition before writes.
#[derive(Debug, Deserialize)]
pub struct StoredRevision {
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

pub fn doc_id(collection: &str, id: &str) -> String {
    format!("{collection}{ID_SEPARATOR}{id}")
}

/// Build a `_find` request for one batch of a collection.
pub fn find_body(
    collection: &str,
    filter: Option<&Filter>,
    sort: Option<&Sort>,
    limit: usize,
    bookmark: Option<&str>,
) -> Value {
    let prefix = format!("{collection}{ID_SEPARATOR}");
    let mut clauses = vec![json!({
        "_id": { "$gt": prefix, "$lt": format!("{prefix}{END_SUFFIX}") }
    })];
    if let Some(filter) = filter {
        clauses.push(to_mango_selector(filter));
    }
    if let Some(sort) = sort {
        // Mango only sorts on fields constrained by the selector.
        clauses.push(field(sort.path(), json!({ "$gt": null })));
    }

    let mut body = json!({
        "selector": { "$and": clauses },
        "limit": limit,
    });
    if let Some(sort) = sort {
        let direction = match sort.direction() {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        body["sort"] = json!([field(sort.path(), json!(direction))]);
    }
    if let Some(bookmark) = bookmark {
        body["bookmark"] = json!(bookmark);
    }
    body
}

/// Mango index definition over a single field.
pub fn index_body(path: &str) -> Value {
    json!({
        "index": { "fields": [path] },
        "name": format!("{path}_idx"),
        "type": "json",
    })
}

/// Translate a filter tree into a Mango selector.
pub fn to_mango_selector(filter: &Filter) -> Value {
    match filter {
        Filter::Compare { path, op, value } => {
            let mut condition = Map::new();
            if *op == CompareOp::Ne {
                condition.insert("$exists".into(), Value::Bool(true));
            }
            condition.insert(operator(*op).into(), value.clone());
            field(path, Value::Object(condition))
        }
        Filter::Contains {
            path,
            needle,
            ignore_case,
        } => field(path, regex_condition(regex::escape(needle), *ignore_case)),
        Filter::StartsWith {
            path,
            prefix,
            ignore_case,
        } => field(
            path,
            regex_condition(format!("^{}", regex::escape(prefix)), *ignore_case),
        ),
        Filter::Any { path, filter } => {
            field(path, json!({ "$elemMatch": to_mango_selector(filter) }))
        }
        Filter::And(filters) if filters.is_empty() => json!({}),
        Filter::And(filters) => json!({ "$and": translate_all(filters) }),
        Filter::Or(filters) if filters.is_empty() => json!({ "_id": { "$exists": false } }),
        Filter::Or(filters) => json!({ "$or": translate_all(filters) }),
        Filter::Not(inner) => json!({ "$not": to_mango_selector(inner) }),
    }
}

fn translate_all(filters: &[Filter]) -> Vec<Value> {
    filters.iter().map(to_mango_selector).collect()
}

fn field(path: &str, condition: Value) -> Value {
    let mut selector = Map::new();
    selector.insert(path.to_owned(), condition);
    Value::Object(selector)
}

fn regex_condition(pattern: String, ignore_case: bool) -> Value {
    let pattern = if ignore_case {
        format!("(?i){pattern}")
    } else {
        pattern
    };
    json!({ "$regex": pattern })
}

fn operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "$eq",
        CompareOp::Ne => "$ne",
        CompareOp::Lt => "$lt",
        CompareOp::Le => "$lte",
        CompareOp::Gt => "$gt",
        CompareOp::Ge => "$gte",
    }
}

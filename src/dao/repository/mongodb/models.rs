use mongodb::bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::query::{CompareOp, Filter, Sort, SortDirection};

/// Stored form of an entity: its fields plus the MongoDB key and version tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDocument<T> {
    #[serde(rename = "_id")]
    pub key: String,
    #[serde(rename = "_etag")]
    pub etag: String,
    #[serde(flatten)]
    pub body: T,
}

/// Selector for a single document, optionally restricted to a partition.
pub fn id_selector(id: &str, partition: Option<(&str, &str)>) -> Document {
    let mut selector = doc! { "_id": id };
    if let Some((path, key)) = partition {
        selector.insert(path, key);
    }
    selector
}

/// Translate a filter tree into a MongoDB query document.
pub fn to_mongo_filter(filter: &Filter) -> Document {
    match filter {
        Filter::Compare { path, op, value } => {
            let mut condition = Document::new();
            // `$ne` alone would also match documents lacking the field.
            if *op == CompareOp::Ne {
                condition.insert("$exists", true);
            }
            condition.insert(operator(*op), json_to_bson(value));
            field(path, condition)
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
        Filter::Any { path, filter } => field(path, doc! { "$elemMatch": to_mongo_filter(filter) }),
        Filter::And(filters) if filters.is_empty() => Document::new(),
        Filter::And(filters) => doc! { "$and": translate_all(filters) },
        Filter::Or(filters) if filters.is_empty() => doc! { "_id": { "$exists": false } },
        Filter::Or(filters) => doc! { "$or": translate_all(filters) },
        Filter::Not(inner) => doc! { "$nor": [to_mongo_filter(inner)] },
    }
}

/// Sort document with `_id` as the final tie-breaker.
pub fn sort_document(sort: Option<&Sort>) -> Document {
    let mut document = Document::new();
    if let Some(sort) = sort {
        let direction = match sort.direction() {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        document.insert(sort.path(), direction);
    }
    document.insert("_id", 1);
    document
}

fn translate_all(filters: &[Filter]) -> Vec<Document> {
    filters.iter().map(to_mongo_filter).collect()
}

fn field(path: &str, condition: Document) -> Document {
    let mut document = Document::new();
    document.insert(path, condition);
    document
}

fn regex_condition(pattern: String, ignore_case: bool) -> Document {
    let options = if ignore_case { "i" } else { "" };
    doc! { "$regex": pattern, "$options": options }
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

fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(*flag),
        Value::Number(number) => number
            .as_i64()
            .map(Bson::Int64)
            .or_else(|| number.as_f64().map(Bson::Double))
            .unwrap_or(Bson::Null),
        Value::String(text) => Bson::String(text.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_bson(value)))
                .collect(),
        ),
    }
}

use std::cmp::Ordering;

use serde_json::Value;

/// Document returned by a one-shot query, paired with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned identifier.
    pub id: String,
    /// Document body (without the identifier).
    pub data: Value,
}

/// Sort direction for [`DocumentQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordering applied to query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    /// Top-level field used as sort key.
    pub field: String,
    /// Direction of the ordering.
    pub direction: SortDirection,
}

/// Equality filter, optional ordering, and optional limit for a collection scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Every `(field, value)` pair must match for a document to be returned.
    pub filter: Vec<(String, Value)>,
    /// Optional result ordering.
    pub order: Option<SortOrder>,
    /// Optional maximum number of results.
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Query matching every document of the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only documents whose top-level `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.push((field.into(), value.into()));
        self
    }

    /// Order results by `field`.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            direction,
        });
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `document` passes the equality filter.
    pub fn matches(&self, document: &Value) -> bool {
        self.filter
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }

    /// Sort and truncate already-filtered documents in place.
    pub fn finish(&self, documents: &mut Vec<StoredDocument>) {
        if let Some(order) = &self.order {
            documents.sort_by(|left, right| {
                let ordering = compare_values(
                    left.data.get(&order.field),
                    right.data.get(&order.field),
                );
                match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn stored(id: &str, data: Value) -> StoredDocument {
        StoredDocument {
            id: id.to_owned(),
            data,
        }
    }

    #[test]
    fn descending_order_with_limit() {
        let query = DocumentQuery::all()
            .where_eq("status", "waiting")
            .order_by("createdAt", SortDirection::Descending)
            .limit(2);

        let mut docs: Vec<StoredDocument> = vec![
            stored("a", json!({"status": "waiting", "createdAt": 1})),
            stored("b", json!({"status": "playing", "createdAt": 5})),
            stored("c", json!({"status": "waiting", "createdAt": 3})),
            stored("d", json!({"status": "waiting", "createdAt": 2})),
        ]
        .into_iter()
        .filter(|doc| query.matches(&doc.data))
        .collect();
        query.finish(&mut docs);

        let ids: Vec<_> = docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }
}

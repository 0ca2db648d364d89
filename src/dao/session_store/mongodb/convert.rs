//! Translation between JSON documents and BSON, and of [`DocumentUpdate`]s into
//! MongoDB update operators.

use mongodb::bson::{Bson, Document, doc};
use serde_json::{Map, Number, Value};

use super::error::{MongoDaoError, MongoResult};
use crate::dao::session_store::{
    DocumentQuery, DocumentUpdate, FieldPath, FieldUpdate, PathSegment, SortDirection,
    UpdateGuard,
};

pub const ID_FIELD: &str = "_id";

pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(*flag),
        Value::Number(number) => number_to_bson(number),
        Value::String(text) => Bson::String(text.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Object(fields) => Bson::Document(to_document(fields)),
    }
}

fn number_to_bson(number: &Number) -> Bson {
    if let Some(value) = number.as_i64() {
        Bson::Int64(value)
    } else if let Some(value) = number.as_u64() {
        Bson::Double(value as f64)
    } else {
        Bson::Double(number.as_f64().unwrap_or_default())
    }
}

pub fn to_document(fields: &Map<String, Value>) -> Document {
    let mut document = Document::new();
    for (key, value) in fields {
        document.insert(key.clone(), to_bson(value));
    }
    document
}

/// JSON body of a stored document with its `_id` stripped.
pub fn from_document(mut document: Document) -> (Option<String>, Value) {
    let id = document.remove(ID_FIELD).map(|id| match id {
        Bson::String(text) => text,
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    });
    let mut fields = Map::new();
    for (key, value) in document {
        fields.insert(key, from_bson(value));
    }
    (id, Value::Object(fields))
}

pub fn from_bson(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(flag) => Value::Bool(flag),
        Bson::Int32(number) => Value::from(number),
        Bson::Int64(number) => Value::from(number),
        Bson::Double(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        Bson::String(text) => Value::String(text),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(document) => from_document(document).1,
        Bson::DateTime(at) => Value::from(at.timestamp_millis()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        _ => Value::Null,
    }
}

/// Filter matching document `id` and every guard of `update`.
pub fn update_filter(id: &str, update: &DocumentUpdate) -> MongoResult<Document> {
    let mut filter = entry(ID_FIELD, id);
    let clauses = update
        .guards()
        .iter()
        .map(guard_clause)
        .collect::<MongoResult<Vec<_>>>()?;
    if !clauses.is_empty() {
        filter.insert("$and", clauses);
    }
    Ok(filter)
}

fn guard_clause(guard: &UpdateGuard) -> MongoResult<Document> {
    let path = match guard {
        UpdateGuard::Equals { path, .. } | UpdateGuard::ArrayLen { path, .. } => path,
    };
    let segments = path.segments();
    let element = segments
        .iter()
        .position(|segment| matches!(segment, PathSegment::Element { .. }));

    let Some(position) = element else {
        return Ok(condition(&dotted(segments, path)?, guard));
    };
    let PathSegment::Element { key, value } = &segments[position] else {
        return Err(invalid(path, "expected an element selector"));
    };
    let array = dotted(&segments[..position], path)?;
    let rest = dotted(&segments[position + 1..], path)?;
    if array.is_empty() || rest.is_empty() {
        return Err(invalid(path, "guards must address a field inside the element"));
    }

    let mut matcher = entry(key.clone(), to_bson(value));
    for (field, expected) in condition(&rest, guard) {
        matcher.insert(field, expected);
    }
    Ok(entry(array, doc! { "$elemMatch": matcher }))
}

fn condition(field: &str, guard: &UpdateGuard) -> Document {
    match guard {
        UpdateGuard::Equals { value, .. } => entry(field, to_bson(value)),
        UpdateGuard::ArrayLen { len: 0, .. } => entry(
            "$or",
            vec![
                entry(field, doc! { "$size": 0 }),
                entry(field, doc! { "$exists": false }),
            ],
        ),
        UpdateGuard::ArrayLen { len, .. } => entry(field, doc! { "$size": *len as i64 }),
    }
}

/// Update operators and array filters implementing `update`.
#[derive(Debug, Default, PartialEq)]
pub struct TranslatedUpdate {
    pub operators: Document,
    pub array_filters: Vec<Document>,
}

pub fn translate_update(update: &DocumentUpdate) -> MongoResult<TranslatedUpdate> {
    let mut filters = ArrayFilters::default();
    let mut set = Document::new();
    let mut add_to_set = Document::new();
    let mut pull = Document::new();
    let mut inc = Document::new();
    let mut current_date = Document::new();

    for (path, operation) in update.operations() {
        let target = filters.target(path)?;
        match operation {
            FieldUpdate::Set(value) => {
                set.insert(target, to_bson(value));
            }
            FieldUpdate::Append(values) => {
                let each: Vec<Bson> = values.iter().map(to_bson).collect();
                add_to_set.insert(target, doc! { "$each": each });
            }
            FieldUpdate::Remove(values) => {
                let any: Vec<Bson> = values.iter().map(to_bson).collect();
                pull.insert(target, doc! { "$in": any });
            }
            FieldUpdate::RemoveMatching { key, value } => {
                pull.insert(target, entry(key.clone(), to_bson(value)));
            }
            FieldUpdate::Increment(by) => {
                inc.insert(target, *by);
            }
            FieldUpdate::ServerTimestamp => {
                current_date.insert(target, true);
            }
        }
    }

    let mut operators = Document::new();
    for (operator, fields) in [
        ("$set", set),
        ("$addToSet", add_to_set),
        ("$pull", pull),
        ("$inc", inc),
        ("$currentDate", current_date),
    ] {
        if !fields.is_empty() {
            operators.insert(operator, fields);
        }
    }

    Ok(TranslatedUpdate {
        operators,
        array_filters: filters.into_documents(),
    })
}

/// Assigns one `$[eN]` identifier per distinct element selector.
#[derive(Default)]
struct ArrayFilters {
    assigned: Vec<(String, String, Document)>,
}

impl ArrayFilters {
    fn target(&mut self, path: &FieldPath) -> MongoResult<String> {
        let mut parts = Vec::with_capacity(path.segments().len());
        let mut prefix = String::new();
        for segment in path.segments() {
            match segment {
                PathSegment::Field(name) => {
                    prefix.push('.');
                    prefix.push_str(name);
                    parts.push(name.clone());
                }
                PathSegment::Element { key, value } => {
                    if parts.is_empty() {
                        return Err(invalid(path, "element selector needs an array field"));
                    }
                    prefix.push_str(&format!("[{key}={value}]"));
                    let identifier = self.identifier(&prefix, key, value);
                    parts.push(format!("$[{identifier}]"));
                }
            }
        }
        if parts.is_empty() {
            return Err(invalid(path, "empty path"));
        }
        Ok(parts.join("."))
    }

    fn identifier(&mut self, prefix: &str, key: &str, value: &Value) -> String {
        if let Some((_, identifier, _)) = self.assigned.iter().find(|(seen, ..)| seen == prefix) {
            return identifier.clone();
        }
        let identifier = format!("e{}", self.assigned.len());
        let filter = entry(format!("{identifier}.{key}"), to_bson(value));
        self.assigned
            .push((prefix.to_owned(), identifier.clone(), filter));
        identifier
    }

    fn into_documents(self) -> Vec<Document> {
        self.assigned
            .into_iter()
            .map(|(_, _, filter)| filter)
            .collect()
    }
}

fn dotted(segments: &[PathSegment], path: &FieldPath) -> MongoResult<String> {
    segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Field(name) => Ok(name.as_str()),
            PathSegment::Element { .. } => {
                Err(invalid(path, "at most one element selector is supported"))
            }
        })
        .collect::<MongoResult<Vec<_>>>()
        .map(|parts| parts.join("."))
}

/// Single-field document with a computed key.
fn entry(key: impl Into<String>, value: impl Into<Bson>) -> Document {
    let mut document = Document::new();
    document.insert(key, value);
    document
}

fn invalid(path: &FieldPath, reason: &str) -> MongoDaoError {
    MongoDaoError::InvalidUpdate {
        path: path.to_string(),
        reason: reason.to_owned(),
    }
}

/// Equality filter of a one-shot query.
pub fn query_filter(query: &DocumentQuery) -> Document {
    let mut filter = Document::new();
    for (field, value) in &query.filter {
        filter.insert(field.clone(), to_bson(value));
    }
    filter
}

/// Sort document of a one-shot query, if any.
pub fn query_sort(query: &DocumentQuery) -> Option<Document> {
    query.order.as_ref().map(|order| {
        let direction = match order.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        entry(order.field.clone(), direction)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_documents_survive_bson_translation() {
        let value = json!({
            "status": "waiting",
            "currentTrackIndex": 2,
            "ratio": 0.5,
            "players": [{"uid": "a", "isReady": true, "answers": []}],
            "photoURL": null,
        });
        let Value::Object(fields) = &value else {
            unreachable!()
        };
        let mut document = to_document(fields);
        document.insert(ID_FIELD, "ABCD1234");

        let (id, body) = from_document(document);
        assert_eq!(id.as_deref(), Some("ABCD1234"));
        assert_eq!(body, value);
    }

    #[test]
    fn element_operations_share_one_array_filter() {
        let player = FieldPath::field("players").element("uid", "bob");
        let update = DocumentUpdate::new()
            .append(player.clone().then("answers"), json!({"trackId": "t1"}))
            .increment(player.then("score"), 900)
            .set("lastActivity", 5);

        let translated = translate_update(&update).unwrap();
        assert_eq!(
            translated.operators,
            doc! {
                "$set": { "lastActivity": 5_i64 },
                "$addToSet": { "players.$[e0].answers": { "$each": [{ "trackId": "t1" }] } },
                "$inc": { "players.$[e0].score": 900_i64 },
            }
        );
        assert_eq!(translated.array_filters, vec![doc! { "e0.uid": "bob" }]);
    }

    #[test]
    fn guards_become_filter_clauses() {
        let update = DocumentUpdate::new()
            .guard_equals("status", "playing")
            .guard_len(
                FieldPath::field("players").element("uid", "bob").then("answers"),
                3,
            )
            .guard_len("players", 0);

        let filter = update_filter("LOBBY", &update).unwrap();
        assert_eq!(
            filter,
            doc! {
                "_id": "LOBBY",
                "$and": [
                    { "status": "playing" },
                    { "players": { "$elemMatch": { "uid": "bob", "answers": { "$size": 3_i64 } } } },
                    { "$or": [
                        { "players": { "$size": 0 } },
                        { "players": { "$exists": false } },
                    ] },
                ],
            }
        );
    }

    #[test]
    fn nested_element_selectors_are_rejected() {
        let path = FieldPath::field("players")
            .element("uid", "bob")
            .then("answers")
            .element("trackId", "t1")
            .then("isCorrect");
        let update = DocumentUpdate::new().guard_equals(path, true);
        assert!(matches!(
            update_filter("LOBBY", &update),
            Err(MongoDaoError::InvalidUpdate { .. })
        ));
    }

    #[test]
    fn removals_use_pull() {
        let update = DocumentUpdate::new()
            .remove_matching("players", "uid", "bob")
            .server_timestamp("updatedAt");
        let translated = translate_update(&update).unwrap();
        assert_eq!(
            translated.operators,
            doc! {
                "$pull": { "players": { "uid": "bob" } },
                "$currentDate": { "updatedAt": true },
            }
        );
        assert!(translated.array_filters.is_empty());
    }
}

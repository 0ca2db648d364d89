//! Field-level mutation model shared by every session store backend.
//!
//! A [`DocumentUpdate`] is an ordered list of operations addressed by
//! [`FieldPath`]s plus optional guards. Backends must apply the whole update
//! atomically: either every guard holds and every operation lands, or nothing
//! is written.

use std::fmt;

use serde_json::{Map, Value};

use crate::dao::storage::{StorageError, StorageResult};

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Named field of an object.
    Field(String),
    /// Element of an array whose `key` field equals `value`.
    Element {
        /// Field compared on each array element.
        key: String,
        /// Expected value of `key`.
        value: Value,
    },
}

/// Address of a value inside a document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Path to a top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Field(name.into())],
        }
    }

    /// Descend into a named field.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    /// Descend into the array element whose `key` equals `value`.
    pub fn element(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.segments.push(PathSegment::Element {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Borrow the individual path segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self {
            segments: value
                .split('.')
                .map(|part| PathSegment::Field(part.to_owned()))
                .collect(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if index > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Element { key, value } => write!(f, "[{key}={value}]")?,
            }
        }
        Ok(())
    }
}

/// Operation applied to the value found at a [`FieldPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the value.
    Set(Value),
    /// Array-union: push each value that is not already present.
    Append(Vec<Value>),
    /// Array-remove: drop every element equal to one of the values.
    Remove(Vec<Value>),
    /// Drop every array element whose `key` field equals `value`.
    RemoveMatching {
        /// Field compared on each element.
        key: String,
        /// Value identifying the elements to drop.
        value: Value,
    },
    /// Add to a numeric value, treating a missing field as zero.
    Increment(i64),
    /// Store the backend's current time in epoch milliseconds.
    ServerTimestamp,
}

/// Condition that must hold on the stored document for an update to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateGuard {
    /// The value at `path` equals `value`.
    Equals {
        /// Checked location.
        path: FieldPath,
        /// Required value.
        value: Value,
    },
    /// The array at `path` holds exactly `len` elements (missing counts as empty).
    ArrayLen {
        /// Checked location.
        path: FieldPath,
        /// Required length.
        len: usize,
    },
}

/// Atomic set of field operations targeting a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    operations: Vec<(FieldPath, FieldUpdate)>,
    guards: Vec<UpdateGuard>,
    upsert: bool,
}

impl DocumentUpdate {
    /// Start an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value at `path`.
    pub fn set(self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.push(path, FieldUpdate::Set(value.into()))
    }

    /// Union `value` into the array at `path`.
    pub fn append(self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.push(path, FieldUpdate::Append(vec![value.into()]))
    }

    /// Remove elements equal to `value` from the array at `path`.
    pub fn remove(self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.push(path, FieldUpdate::Remove(vec![value.into()]))
    }

    /// Remove array elements whose `key` field equals `value`.
    pub fn remove_matching(
        self,
        path: impl Into<FieldPath>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.push(
            path,
            FieldUpdate::RemoveMatching {
                key: key.into(),
                value: value.into(),
            },
        )
    }

    /// Add `by` to the numeric value at `path`.
    pub fn increment(self, path: impl Into<FieldPath>, by: i64) -> Self {
        self.push(path, FieldUpdate::Increment(by))
    }

    /// Stamp `path` with the backend clock.
    pub fn server_timestamp(self, path: impl Into<FieldPath>) -> Self {
        self.push(path, FieldUpdate::ServerTimestamp)
    }

    /// Require the value at `path` to equal `value`.
    pub fn guard_equals(mut self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.guards.push(UpdateGuard::Equals {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Require the array at `path` to hold exactly `len` elements.
    pub fn guard_len(mut self, path: impl Into<FieldPath>, len: usize) -> Self {
        self.guards.push(UpdateGuard::ArrayLen {
            path: path.into(),
            len,
        });
        self
    }

    /// Create the document when it does not exist yet.
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    /// Append a raw operation.
    pub fn push(mut self, path: impl Into<FieldPath>, update: FieldUpdate) -> Self {
        self.operations.push((path.into(), update));
        self
    }

    /// Ordered operations carried by this update.
    pub fn operations(&self) -> &[(FieldPath, FieldUpdate)] {
        &self.operations
    }

    /// Guards that must hold before anything is written.
    pub fn guards(&self) -> &[UpdateGuard] {
        &self.guards
    }

    /// Whether a missing document should be created.
    pub fn is_upsert(&self) -> bool {
        self.upsert
    }

    /// Whether every guard holds against `document`.
    pub fn guards_hold(&self, document: &Value) -> bool {
        self.guards.iter().all(|guard| match guard {
            UpdateGuard::Equals { path, value } => {
                lookup(document, path).is_some_and(|found| found == value)
            }
            UpdateGuard::ArrayLen { path, len } => match lookup(document, path) {
                Some(Value::Array(items)) => items.len() == *len,
                Some(Value::Null) | None => *len == 0,
                Some(_) => false,
            },
        })
    }

    /// Apply every operation in order to `document`.
    ///
    /// Guards are not evaluated here; callers check [`Self::guards_hold`] first and
    /// apply to a scratch copy so a failing operation leaves the stored value intact.
    pub fn apply_to(&self, document: &mut Value, now_ms: u64) -> StorageResult<()> {
        for (path, update) in &self.operations {
            apply_operation(document, path, update, now_ms)?;
        }
        Ok(())
    }
}

/// Read the value stored at `path`, if every segment resolves.
pub fn lookup<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.segments() {
        current = match segment {
            PathSegment::Field(name) => current.as_object()?.get(name)?,
            PathSegment::Element { key, value } => current
                .as_array()?
                .iter()
                .find(|item| item.get(key) == Some(value))?,
        };
    }
    Some(current)
}

fn apply_operation(
    document: &mut Value,
    path: &FieldPath,
    update: &FieldUpdate,
    now_ms: u64,
) -> StorageResult<()> {
    let create = matches!(
        update,
        FieldUpdate::Set(_)
            | FieldUpdate::Append(_)
            | FieldUpdate::Increment(_)
            | FieldUpdate::ServerTimestamp
    );

    // An element selector that matches nothing turns the operation into a no-op.
    let Some(target) = resolve_mut(document, path, create)? else {
        return Ok(());
    };

    match update {
        FieldUpdate::Set(value) => *target = value.clone(),
        FieldUpdate::ServerTimestamp => *target = Value::from(now_ms),
        FieldUpdate::Append(values) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return Err(invalid_path(path, "append target is not an array"));
            };
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        FieldUpdate::Remove(values) => match target {
            Value::Array(items) => items.retain(|item| !values.contains(item)),
            Value::Null => {}
            _ => return Err(invalid_path(path, "remove target is not an array")),
        },
        FieldUpdate::RemoveMatching { key, value } => match target {
            Value::Array(items) => items.retain(|item| item.get(key) != Some(value)),
            Value::Null => {}
            _ => return Err(invalid_path(path, "remove target is not an array")),
        },
        FieldUpdate::Increment(by) => {
            let next = match &*target {
                Value::Null => Value::from(*by),
                Value::Number(number) => {
                    if let Some(current) = number.as_i64() {
                        Value::from(current.saturating_add(*by))
                    } else if let Some(current) = number.as_f64() {
                        Value::from(current + *by as f64)
                    } else {
                        return Err(invalid_path(path, "increment target is not numeric"));
                    }
                }
                _ => return Err(invalid_path(path, "increment target is not numeric")),
            };
            *target = next;
        }
    }

    Ok(())
}

fn resolve_mut<'a>(
    document: &'a mut Value,
    path: &FieldPath,
    create: bool,
) -> StorageResult<Option<&'a mut Value>> {
    let mut current = document;
    for segment in path.segments() {
        current = match segment {
            PathSegment::Field(name) => {
                if current.is_null() && create {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else {
                    return Err(invalid_path(path, "expected an object"));
                };
                if create {
                    map.entry(name.clone()).or_insert(Value::Null)
                } else {
                    match map.get_mut(name) {
                        Some(value) => value,
                        None => return Ok(None),
                    }
                }
            }
            PathSegment::Element { key, value } => {
                let Value::Array(items) = current else {
                    return Ok(None);
                };
                match items.iter_mut().find(|item| item.get(key) == Some(value)) {
                    Some(item) => item,
                    None => return Ok(None),
                }
            }
        };
    }
    Ok(Some(current))
}

fn invalid_path(path: &FieldPath, reason: &str) -> StorageError {
    StorageError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lobby() -> Value {
        json!({
            "status": "playing",
            "currentTrackIndex": 0,
            "players": [
                {"uid": "host", "score": 0, "answers": []},
                {"uid": "guest", "score": 10, "answers": [{"trackId": "t0"}]}
            ]
        })
    }

    #[test]
    fn element_path_targets_a_single_player() {
        let mut doc = lobby();
        let player = FieldPath::field("players").element("uid", "host");
        DocumentUpdate::new()
            .append(player.clone().then("answers"), json!({"trackId": "t0"}))
            .increment(player.then("score"), 1200)
            .apply_to(&mut doc, 0)
            .unwrap();

        assert_eq!(doc["players"][0]["score"], json!(1200));
        assert_eq!(doc["players"][0]["answers"].as_array().unwrap().len(), 1);
        assert_eq!(doc["players"][1]["score"], json!(10));
    }

    #[test]
    fn append_behaves_like_a_union() {
        let mut doc = json!({"players": [{"uid": "a"}]});
        DocumentUpdate::new()
            .append("players", json!({"uid": "a"}))
            .append("players", json!({"uid": "b"}))
            .apply_to(&mut doc, 0)
            .unwrap();
        assert_eq!(doc["players"], json!([{"uid": "a"}, {"uid": "b"}]));
    }

    #[test]
    fn remove_matching_drops_by_key() {
        let mut doc = lobby();
        DocumentUpdate::new()
            .remove_matching("players", "uid", "guest")
            .apply_to(&mut doc, 0)
            .unwrap();
        assert_eq!(doc["players"].as_array().unwrap().len(), 1);
        assert_eq!(doc["players"][0]["uid"], json!("host"));
    }

    #[test]
    fn unmatched_element_is_a_no_op() {
        let mut doc = lobby();
        let before = doc.clone();
        DocumentUpdate::new()
            .increment(FieldPath::field("players").element("uid", "ghost").then("score"), 5)
            .apply_to(&mut doc, 0)
            .unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn guards_check_length_and_equality() {
        let doc = lobby();
        let answers = FieldPath::field("players").element("uid", "guest").then("answers");

        assert!(
            DocumentUpdate::new()
                .guard_len(answers.clone(), 1)
                .guard_equals("currentTrackIndex", 0)
                .guards_hold(&doc)
        );
        assert!(!DocumentUpdate::new().guard_len(answers, 0).guards_hold(&doc));
        assert!(
            !DocumentUpdate::new()
                .guard_equals("currentTrackIndex", 1)
                .guards_hold(&doc)
        );
    }

    #[test]
    fn server_timestamp_and_increment_create_missing_fields() {
        let mut doc = json!({});
        DocumentUpdate::new()
            .server_timestamp("startedAt")
            .increment("stats.gamesPlayed", 1)
            .apply_to(&mut doc, 42)
            .unwrap();
        assert_eq!(doc, json!({"startedAt": 42, "stats": {"gamesPlayed": 1}}));
    }

    #[test]
    fn increment_rejects_non_numeric_targets() {
        let mut doc = json!({"status": "waiting"});
        let err = DocumentUpdate::new()
            .increment("status", 1)
            .apply_to(&mut doc, 0)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
    }

    #[test]
    fn display_renders_element_selectors() {
        let path = FieldPath::field("players").element("uid", "abc").then("answers");
        assert_eq!(path.to_string(), "players[uid=\"abc\"].answers");
    }
}

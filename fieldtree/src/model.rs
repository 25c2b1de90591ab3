//! Model access: read and write values at key paths inside a nested JSON model.
//!
//! Keys are authored as dotted paths with optional bracketed indexes
//! (`address.lines[0]`). A plain segment that parses as a number also
//! addresses an array element when the container is an array, which is how
//! array-element fields (keyed `"0"`, `"1"`, ...) find their values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::{FieldTreeError, Result};

/// How many `null` slots a single write may pad onto the end of an array.
pub const MAX_ARRAY_PADDING: usize = 10_000;

/// The live data model, shared by reference between the tree and the host.
pub type SharedModel = Rc<RefCell<Value>>;

/// Wrap a model value so it can be shared with a tree.
pub fn shared_model(value: Value) -> SharedModel {
    Rc::new(RefCell::new(value))
}

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// Array position addressed by this segment, if any.
    fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Key(k) => k.parse().ok(),
        }
    }

    fn as_key(&self) -> String {
        match self {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Split an authored key into path segments.
///
/// `a.b[0].c` becomes `[Key("a"), Key("b"), Index(0), Key("c")]`. Empty
/// segments are dropped; an unparsable bracket body is kept as a key.
pub fn parse_key_path(key: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for part in key.split('.') {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            let head = &rest[..open];
            if !head.is_empty() {
                segments.push(PathSegment::Key(head.to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else {
                    segments.push(PathSegment::Key(stripped.to_string()));
                    break;
                };
                let body = &stripped[..close];
                segments.push(match body.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(body.to_string()),
                });
                rest = &stripped[close + 1..];
            }
        } else if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    segments
}

/// Read the value at `path`, or `None` if any link is missing.
pub fn get_value<'a>(model: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(model, |current, segment| match current {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => segment.as_index().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// True when nothing is stored at `path`. An explicit `null` counts as set.
pub fn is_unset(model: &Value, path: &[PathSegment]) -> bool {
    get_value(model, path).is_none()
}

/// Write `value` at `path`, creating intermediate containers as needed.
///
/// A missing intermediate becomes an array when the segment after it is an
/// index and an object otherwise. Scalars standing in the way are replaced.
/// Writing past the end of an array pads it with `null`, up to
/// [`MAX_ARRAY_PADDING`] slots; a write further out fails with
/// [`FieldTreeError::IndexOutOfRange`]. Containers created before the
/// failing segment stay in place.
pub fn assign_value(model: &mut Value, path: &[PathSegment], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *model = value;
        return Ok(());
    };

    let mut current = model;
    for (position, segment) in parents.iter().enumerate() {
        let next = parents.get(position + 1).unwrap_or(last);
        let child = slot_mut(current, segment)?;
        if !matches!(child, Value::Object(_) | Value::Array(_)) {
            *child = empty_container_for(next);
        }
        current = child;
    }
    *slot_mut(current, last)? = value;
    Ok(())
}

fn empty_container_for(segment: &PathSegment) -> Value {
    match segment {
        PathSegment::Index(_) => Value::Array(Vec::new()),
        PathSegment::Key(_) => Value::Object(Map::new()),
    }
}

/// Mutable slot for `segment` inside `container`, inserting `null` if absent.
fn slot_mut<'a>(container: &'a mut Value, segment: &PathSegment) -> Result<&'a mut Value> {
    let index = segment.as_index();
    let fits = match &*container {
        Value::Object(_) => true,
        Value::Array(_) => index.is_some(),
        _ => false,
    };
    if !fits {
        *container = empty_container_for(segment);
    }

    match container {
        Value::Array(items) => {
            let len = items.len();
            let i = index.unwrap_or(len);
            if i >= len {
                let new_len = i
                    .checked_add(1)
                    .filter(|new_len| new_len - len <= MAX_ARRAY_PADDING)
                    .ok_or(FieldTreeError::IndexOutOfRange { index: i, len })?;
                items.resize(new_len, Value::Null);
            }
            Ok(&mut items[i])
        }
        Value::Object(map) => Ok(map.entry(segment.as_key()).or_insert(Value::Null)),
        other => Ok(other),
    }
}

/// Fill gaps in `target` from `defaults`, recursing into nested objects.
///
/// Values already present in `target` always win; only missing keys are
/// copied over. Non-object values are never merged element-wise.
pub fn reverse_deep_merge(target: &mut Value, defaults: &Value) {
    let (Value::Object(target_map), Value::Object(default_map)) = (target, defaults) else {
        return;
    };
    merge_missing(target_map, default_map);
}

/// Map-level form of [`reverse_deep_merge`].
pub fn merge_missing(target: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default.clone());
            }
            Some(existing) => reverse_deep_merge(existing, default),
        }
    }
}

/// A view of one position inside a shared model.
///
/// The path is fixed when the view is created; the value is read from the
/// shared model every time, so host-side edits are always visible.
#[derive(Debug, Clone)]
pub struct ModelRef {
    root: SharedModel,
    path: Vec<PathSegment>,
}

impl ModelRef {
    /// A view of the whole model.
    pub fn root(model: SharedModel) -> Self {
        Self {
            root: model,
            path: Vec::new(),
        }
    }

    /// A view `segments` deeper than this one.
    pub fn join(&self, segments: &[PathSegment]) -> Self {
        let mut path = self.path.clone();
        path.extend_from_slice(segments);
        Self {
            root: Rc::clone(&self.root),
            path,
        }
    }

    /// Absolute path from the model root.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// The shared model this view reads from.
    pub fn shared(&self) -> &SharedModel {
        &self.root
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> Option<Value> {
        get_value(&self.root.borrow(), &self.path).cloned()
    }

    pub fn is_unset(&self) -> bool {
        is_unset(&self.root.borrow(), &self.path)
    }

    /// Length of the value if it is an array.
    pub fn array_len(&self) -> Option<usize> {
        match get_value(&self.root.borrow(), &self.path) {
            Some(Value::Array(items)) => Some(items.len()),
            _ => None,
        }
    }

    /// Write `value` at this position in the shared model.
    pub fn assign(&self, value: Value) -> Result<()> {
        assign_value(&mut self.root.borrow_mut(), &self.path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    #[test]
    fn parses_dotted_and_indexed_keys() {
        assert_eq!(
            parse_key_path("address.lines[0].text"),
            vec![key("address"), key("lines"), PathSegment::Index(0), key("text")]
        );
        assert_eq!(parse_key_path("name"), vec![key("name")]);
        assert_eq!(
            parse_key_path("matrix[1][2]"),
            vec![key("matrix"), PathSegment::Index(1), PathSegment::Index(2)]
        );
        assert!(parse_key_path("").is_empty());
    }

    #[test]
    fn numeric_key_reads_array_element() {
        let model = json!({"tags": ["a", "b"]});
        let path = vec![key("tags"), key("1")];
        assert_eq!(get_value(&model, &path), Some(&json!("b")));
        assert_eq!(get_value(&model, &[key("tags"), key("5")]), None);
    }

    #[test]
    fn null_is_set_but_missing_is_unset() {
        let model = json!({"nickname": null});
        assert!(!is_unset(&model, &[key("nickname")]));
        assert!(is_unset(&model, &[key("age")]));
        assert!(is_unset(&model, &[key("nickname"), key("inner")]));
    }

    #[test]
    fn assign_creates_objects_and_arrays() {
        let mut model = json!({});
        assign_value(&mut model, &parse_key_path("address.lines[1]"), json!("second")).unwrap();
        assert_eq!(model, json!({"address": {"lines": [null, "second"]}}));

        assign_value(&mut model, &parse_key_path("address.city"), json!("Oslo")).unwrap();
        assert_eq!(model["address"]["city"], json!("Oslo"));
        assert_eq!(model["address"]["lines"][1], json!("second"));
    }

    #[test]
    fn assign_replaces_scalars_in_the_way() {
        let mut model = json!({"profile": 3});
        assign_value(&mut model, &parse_key_path("profile.name"), json!("x")).unwrap();
        assert_eq!(model, json!({"profile": {"name": "x"}}));
    }

    #[test]
    fn assign_with_empty_path_replaces_model() {
        let mut model = json!({"a": 1});
        assign_value(&mut model, &[], json!([])).unwrap();
        assert_eq!(model, json!([]));
    }

    #[test]
    fn reverse_merge_keeps_existing_values() {
        let mut target = json!({"label": "Name", "attrs": {"size": 3}});
        reverse_deep_merge(
            &mut target,
            &json!({"label": "", "placeholder": "", "attrs": {"size": 1, "min": 0}}),
        );
        assert_eq!(
            target,
            json!({"label": "Name", "placeholder": "", "attrs": {"size": 3, "min": 0}})
        );
    }

    #[test]
    fn model_ref_reads_live_values() {
        let model = shared_model(json!({"user": {}}));
        let name = ModelRef::root(Rc::clone(&model)).join(&parse_key_path("user.name"));
        assert!(name.is_unset());

        model.borrow_mut()["user"]["name"] = json!("Ada");
        assert_eq!(name.get(), Some(json!("Ada")));

        name.assign(json!("Grace")).unwrap();
        assert_eq!(model.borrow()["user"]["name"], json!("Grace"));
        assert_eq!(name.array_len(), None);
    }

    #[test]
    fn assign_rejects_index_far_past_the_end() {
        let mut model = json!({"list": []});
        let err = assign_value(&mut model, &parse_key_path("list[18446744073709551615]"), json!("x"))
            .unwrap_err();
        assert!(matches!(err, FieldTreeError::IndexOutOfRange { index: usize::MAX, len: 0 }));

        let err = assign_value(&mut model, &parse_key_path("list[4000000000]"), json!("x"))
            .unwrap_err();
        assert!(matches!(err, FieldTreeError::IndexOutOfRange { len: 0, .. }));
        assert_eq!(model, json!({"list": []}));
    }

    #[test]
    fn assign_pads_up_to_the_limit() {
        let mut model = json!([]);
        let path = [PathSegment::Index(MAX_ARRAY_PADDING - 1)];
        assign_value(&mut model, &path, json!(true)).unwrap();
        assert_eq!(model.as_array().map(Vec::len), Some(MAX_ARRAY_PADDING));

        let far = [PathSegment::Index(2 * MAX_ARRAY_PADDING + 1)];
        assert!(assign_value(&mut model, &far, json!(true)).is_err());
        assert_eq!(model.as_array().map(Vec::len), Some(MAX_ARRAY_PADDING));
    }
}

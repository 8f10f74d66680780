use serde_json::Value;

/// Dot-path accessor into a `serde_json::Value`, supporting numeric array
/// indices at any segment (`hits.hits.0._source.value`). Absent paths are
/// a typed error, never a zero-value (spec.md §9).
pub fn extract<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Extracts a float scalar, coercing numbers and numeric strings.
pub fn extract_f64(root: &Value, path: &str) -> Option<f64> {
    match extract(root, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Extracts the subtree rooted at `path`, cloned.
pub fn extract_subtree(root: &Value, path: &str) -> Option<Value> {
    extract(root, path).cloned()
}

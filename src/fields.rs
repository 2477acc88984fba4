use serde_json::Value;

pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// String form of a scalar field. Numbers and booleans are rendered,
/// objects, arrays and nulls are not.
pub fn text(doc: &Value, path: &str) -> Option<String> {
    match lookup(doc, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn folded(doc: &Value, path: &str) -> Option<String> {
    text(doc, path).map(|s| s.to_lowercase())
}

pub fn number(doc: &Value, path: &str) -> Option<f64> {
    match lookup(doc, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths_resolve() {
        let doc = json!({
            "profile": { "name": "Avery Lee", "tags": ["mentor", "2026"] },
            "score": 7.5,
            "id": 42
        });
        assert_eq!(text(&doc, "profile.name").as_deref(), Some("Avery Lee"));
        assert_eq!(text(&doc, "profile.tags.1").as_deref(), Some("2026"));
        assert_eq!(text(&doc, "id").as_deref(), Some("42"));
        assert_eq!(number(&doc, "score"), Some(7.5));
        assert_eq!(folded(&doc, "profile.name").as_deref(), Some("avery lee"));
    }

    #[test]
    fn absent_paths_are_none() {
        let doc = json!({ "profile": { "name": "Avery" } });
        assert!(lookup(&doc, "profile.email").is_none());
        assert!(lookup(&doc, "profile.name.first").is_none());
        assert!(lookup(&doc, "").is_none());
        assert!(text(&doc, "profile").is_none());
        assert!(number(&doc, "profile.name").is_none());
    }
}

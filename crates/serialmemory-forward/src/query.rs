use serde_json::Value;

/// Encodes a payload object as a query string. Nulls are skipped, strings go
/// in raw, everything else as its JSON text. Non-objects encode to nothing.
pub fn encode_query(payload: &Value) -> String {
    let Value::Object(map) = payload else {
        return String::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&text)
            ))
        })
        .collect::<Vec<_>>()
        .join("&")
}

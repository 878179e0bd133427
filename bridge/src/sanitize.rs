use record_store::Fields;
use serde_json::Value;

/// Drops fields whose value is the empty string. Typed upstream columns
/// (dates in particular) reject `""`, so this runs before every write.
/// `null`, `0` and `false` are kept.
pub fn sanitize_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, value)| !matches!(value, Value::String(s) if s.is_empty()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_empty_strings_are_removed() {
        let fields = json!({
            "Status": "Published",
            "AirDate": "",
            "Views": 0,
            "Featured": false,
            "Notes": null,
            "Spaces": " ",
            "Tags": [],
        });

        let sanitized = sanitize_fields(fields.as_object().unwrap());

        assert_eq!(
            Value::Object(sanitized),
            json!({
                "Status": "Published",
                "Views": 0,
                "Featured": false,
                "Notes": null,
                "Spaces": " ",
                "Tags": [],
            })
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let fields = json!({"b": 1, "a": "", "c": 2});
        let sanitized = sanitize_fields(fields.as_object().unwrap());
        let names: Vec<_> = sanitized.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b", "c"]);
    }
}

/// Column holding the human-readable record label.
pub const TITLE_FIELD: &str = "Title";

/// The field/value pair used to find an existing record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    pub filter_field: String,
    pub filter_value: String,
}

/// An explicit match field and value win over the title; otherwise the title
/// is matched against the `Title` column. Values are used as given.
///
/// Returns `None` only when neither strategy is available.
pub fn resolve_key(
    title: Option<&str>,
    match_field: Option<&str>,
    match_value: Option<&str>,
) -> Option<ResolvedKey> {
    match (match_field, match_value, title) {
        (Some(field), Some(value), _) => Some(ResolvedKey {
            filter_field: field.to_string(),
            filter_value: value.to_string(),
        }),
        (_, _, Some(title)) => Some(ResolvedKey {
            filter_field: TITLE_FIELD.to_string(),
            filter_value: title.to_string(),
        }),
        _ => None,
    }
}

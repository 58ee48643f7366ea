//! Short names for schema resource URIs.
//!
//! Schema lookups hand out URIs (`https://schema.example/Book`); the engine
//! only ever compares their short names, case-normalised. Raw URIs are never
//! compared.

/// Last non-empty `/`-separated segment of `uri`.
pub fn short_name(uri: &str) -> Option<&str> {
    uri.split('/').rev().find(|segment| !segment.is_empty())
}

/// First letter upper-cased, the rest lower-cased.
pub fn normalize_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Comparison key of an entity URI.
pub fn entity_short_name(uri: &str) -> Option<String> {
    short_name(uri).map(normalize_case)
}

/// Suggestion text for a field URI. Field names keep their case.
pub fn field_short_name(uri: &str) -> Option<&str> {
    short_name(uri)
}

/// Trailing whitespace-delimited token of the input; `None` for blank input.
pub fn trailing_token(raw: &str) -> Option<&str> {
    raw.split_whitespace().next_back()
}

/// Whether a typed token names the entity with short name `entity`.
pub fn matches_entity(token: &str, entity: &str) -> bool {
    normalize_case(token) == normalize_case(entity)
}

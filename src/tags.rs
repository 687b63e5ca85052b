//! Core schema tags that rule a scalar out as text.

const CORE_PREFIX: &str = "tag:yaml.org,2002:";

const NON_STRING_TAGS: &[&str] = &["int", "float", "bool", "null", "timestamp", "seq", "map"];

/// Suffix of a core schema tag, written either `!!int` or `tag:yaml.org,2002:int`.
fn core_suffix(tag: &str) -> Option<&str> {
    match tag.strip_prefix(CORE_PREFIX) {
        Some(rest) => Some(rest.trim_start_matches('!')),
        None => tag.strip_prefix("!!"),
    }
}

pub(crate) fn can_parse_into_string(tag: Option<&str>) -> bool {
    match tag.and_then(core_suffix) {
        None => true,
        Some(suffix) => !NON_STRING_TAGS.contains(&suffix),
    }
}

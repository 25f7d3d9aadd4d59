use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating definition machine keys.
    /// Must be lowercase letters and underscores only.
    /// - Valid: "punctuation", "nikud_full", "source_lookup"
    /// - Invalid: "Punctuation", "nikud-full", "nikud2", "nikud full"
    pub static ref DEFINITION_KEY_REGEX: Regex = Regex::new(r"^[a-z_]+$").unwrap();

    /// Regex for validating actor ids carried in JWT subjects.
    /// Hex object ids or UUID-shaped identifiers.
    pub static ref ACTOR_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_key_regex_valid() {
        assert!(DEFINITION_KEY_REGEX.is_match("punctuation"));
        assert!(DEFINITION_KEY_REGEX.is_match("nikud_full"));
        assert!(DEFINITION_KEY_REGEX.is_match("source_lookup"));
        assert!(DEFINITION_KEY_REGEX.is_match("a"));
        assert!(DEFINITION_KEY_REGEX.is_match("_internal"));
    }

    #[test]
    fn test_definition_key_regex_invalid() {
        assert!(!DEFINITION_KEY_REGEX.is_match("Punctuation")); // uppercase
        assert!(!DEFINITION_KEY_REGEX.is_match("nikud-full")); // hyphen
        assert!(!DEFINITION_KEY_REGEX.is_match("nikud2")); // digit
        assert!(!DEFINITION_KEY_REGEX.is_match("nikud full")); // space
        assert!(!DEFINITION_KEY_REGEX.is_match("")); // empty
    }

    #[test]
    fn test_actor_id_regex() {
        assert!(ACTOR_ID_REGEX.is_match("65a1b2c3d4e5f6a7b8c9d0e1"));
        assert!(ACTOR_ID_REGEX.is_match("system"));
        assert!(!ACTOR_ID_REGEX.is_match("actor with spaces"));
        assert!(!ACTOR_ID_REGEX.is_match(""));
    }
}

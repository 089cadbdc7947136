//! Filename and folder name sanitization
//!
//! Character-safety rules for names generated by the naming engine. Both
//! entry points are total and idempotent: sanitizing an already-sanitized
//! name returns it unchanged.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FILENAME_BAD_CHARS: Regex = Regex::new(r#"[<>:"/\\|?*]"#).unwrap();
    static ref SEGMENT_BAD_CHARS: Regex = Regex::new(r#"[<>:"\\|?*]"#).unwrap();
    static ref SEGMENT_WHITELIST: Regex = Regex::new(r"[^0-9A-Za-z._\-()'# ]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Sanitize a single filename (no path separators survive)
pub fn sanitize_filename(name: &str) -> String {
    let stripped = FILENAME_BAD_CHARS.replace_all(name, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    collapsed.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Sanitize a folder path, preserving intentional subfolder structure
///
/// Segments are sanitized independently and restricted to a conservative
/// whitelist; empty segments are dropped. An empty result falls back to
/// the literal "Volume" so downstream path joins always have a component.
pub fn sanitize_folder(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .map(sanitize_folder_segment)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        return "Volume".to_string();
    }

    segments.join("/")
}

fn sanitize_folder_segment(segment: &str) -> String {
    let stripped = SEGMENT_BAD_CHARS.replace_all(segment, "");
    let whitelisted = SEGMENT_WHITELIST.replace_all(&stripped, "");
    let collapsed = WHITESPACE_RUN.replace_all(&whitelisted, " ");
    collapsed.trim_matches(|c| c == '.' || c == ' ').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_filename_strips_reserved_chars() {
        assert_eq!(
            sanitize_filename("Spider-Man: Issue <001>?"),
            "Spider-Man Issue 001"
        );
        assert_eq!(sanitize_filename("a/b\\c|d"), "abcd");
    }

    #[test]
    fn test_sanitize_filename_trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  .name. "), "name");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn test_sanitize_filename_collapses_whitespace() {
        assert_eq!(sanitize_filename("a   b\t c"), "a b c");
    }

    #[test]
    fn test_sanitize_folder_preserves_structure() {
        assert_eq!(
            sanitize_folder("Marvel/Spider-Man (2022)/Issues"),
            "Marvel/Spider-Man (2022)/Issues"
        );
    }

    #[test]
    fn test_sanitize_folder_drops_empty_segments() {
        assert_eq!(sanitize_folder("//a///b//"), "a/b");
        assert_eq!(sanitize_folder("a/???/b"), "a/b");
    }

    #[test]
    fn test_sanitize_folder_whitelist() {
        assert_eq!(sanitize_folder("Vol. #1 - 'X' (a)"), "Vol. #1 - 'X' (a)");
        assert_eq!(sanitize_folder("naïve/café"), "nave/caf");
    }

    #[test]
    fn test_sanitize_folder_empty_falls_back() {
        assert_eq!(sanitize_folder(""), "Volume");
        assert_eq!(sanitize_folder("///"), "Volume");
        assert_eq!(sanitize_folder("???"), "Volume");
    }

    proptest! {
        #[test]
        fn prop_sanitize_folder_idempotent(input in ".{0,80}") {
            let once = sanitize_folder(&input);
            let twice = sanitize_folder(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitize_filename_idempotent(input in ".{0,80}") {
            let once = sanitize_filename(&input);
            let twice = sanitize_filename(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitize_filename_no_reserved_chars(input in ".{0,80}") {
            let cleaned = sanitize_filename(&input);
            prop_assert!(!cleaned.contains(|c| "<>:\"/\\|?*".contains(c)));
        }
    }
}

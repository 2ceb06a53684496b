//! Display-name sanitizing for names that end up on disk or echoed back to a host
//!
//! Names arrive straight from the connecting client and are untrusted. Before a
//! name is stored or shown anywhere it goes through [`sanitize_username`], which:
//! - escapes names that exactly match a reserved broadcast keyword
//! - redacts forbidden substrings with asterisks of the same length
//! - caps the result at [`MAX_USERNAME_CHARS`] characters

/// Names that would trigger a mass mention when echoed verbatim
const RESERVED_NAMES: [&str; 2] = ["everyone", "here"];

/// Substrings that are blanked out, matched without regard to ASCII case
const FORBIDDEN_SUBSTRINGS: [&str; 5] = ["discord", "@", "#", ":", "```"];

pub const MAX_USERNAME_CHARS: usize = 80;

/// Returns a storage-safe version of `name`
///
/// The reserved-name check compares the whole name case-sensitively and wins
/// over redaction. Truncation always runs last.
pub fn sanitize_username(name: &str) -> String {
    let cleaned = match RESERVED_NAMES.iter().find(|reserved| **reserved == name) {
        Some(reserved) => format!("_{}", reserved),
        None => FORBIDDEN_SUBSTRINGS
            .iter()
            .fold(name.to_string(), |acc, pattern| redact(&acc, pattern)),
    };

    cleaned.chars().take(MAX_USERNAME_CHARS).collect()
}

/// Replaces every case-insensitive occurrence of `pattern` with asterisks
///
/// `pattern` is ASCII, so every match covers whole characters and the
/// replacement keeps the byte length of the input.
fn redact(name: &str, pattern: &str) -> String {
    let needle = pattern.as_bytes();
    let haystack = name.as_bytes();
    let mut out = String::with_capacity(name.len());
    let mut i = 0;

    while i < haystack.len() {
        let end = i + needle.len();
        if end <= haystack.len() && haystack[i..end].eq_ignore_ascii_case(needle) {
            out.extend(std::iter::repeat('*').take(needle.len()));
            i = end;
        } else if let Some(c) = name[i..].chars().next() {
            out.push(c);
            i += c.len_utf8();
        } else {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names_are_escaped() {
        assert_eq!(sanitize_username("everyone"), "_everyone");
        assert_eq!(sanitize_username("here"), "_here");
    }

    #[test]
    fn test_reserved_check_is_case_sensitive() {
        assert_eq!(sanitize_username("Everyone"), "Everyone");
        assert_eq!(sanitize_username("everyone!"), "everyone!");
    }

    #[test]
    fn test_discord_is_redacted() {
        let raw = "join my discord now";
        let clean = sanitize_username(raw);

        assert_eq!(clean, "join my ******* now");
        assert_eq!(clean.len(), raw.len());
    }

    #[test]
    fn test_redaction_ignores_case() {
        assert_eq!(sanitize_username("DiScOrD.gg"), "*******.gg");
    }

    #[test]
    fn test_every_occurrence_is_redacted() {
        assert_eq!(sanitize_username("a@b#c:d```e@"), "a*b*c*d***e*");
        assert_eq!(sanitize_username("discorddiscord"), "**************");
    }

    #[test]
    fn test_clean_name_unchanged() {
        assert_eq!(sanitize_username("TestDriver"), "TestDriver");
        assert_eq!(sanitize_username(""), "");
    }

    #[test]
    fn test_non_ascii_is_preserved() {
        assert_eq!(sanitize_username("Jürgen@Köln"), "Jürgen*Köln");
    }

    #[test]
    fn test_truncates_to_max_length() {
        let long = "x".repeat(200);
        let clean = sanitize_username(&long);
        assert_eq!(clean.chars().count(), MAX_USERNAME_CHARS);

        let exact = "y".repeat(MAX_USERNAME_CHARS);
        assert_eq!(sanitize_username(&exact), exact);
    }

    #[test]
    fn test_truncation_runs_after_redaction() {
        let raw = format!("{}discord", "a".repeat(76));
        let clean = sanitize_username(&raw);

        assert_eq!(clean.chars().count(), MAX_USERNAME_CHARS);
        assert!(clean.ends_with("****"));
        assert!(!clean.to_lowercase().contains("disc"));
    }

    #[test]
    fn test_output_never_exceeds_limit() {
        let inputs = [
            "everyone".to_string(),
            "@".repeat(500),
            "ü".repeat(81),
            "name with spaces".to_string(),
        ];

        for input in &inputs {
            assert!(sanitize_username(input).chars().count() <= MAX_USERNAME_CHARS);
        }
    }
}

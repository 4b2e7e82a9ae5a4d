//! Sanitization for free-text fields that end up on other clients' screens:
//! nicknames, pack titles, prompt texts, custom themes.

/// Strip HTML-like tags and ASCII control characters, then trim.
pub fn clean_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if in_tag => {
                // Lone '<' not followed by a closing '>' is dropped along
                // with everything after it, same as a dangling tag.
                let _ = c;
            }
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Phrases that indicate an attempt to smuggle instructions into an LLM
/// theme. Matched against a lowercased, whitespace-normalized copy.
const INJECTION_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "ignore above",
    "ignore all above",
    "disregard previous",
    "disregard all previous",
    "new instruction:",
    "new instructions:",
    "system:",
    "you are now a",
    "you are now an",
    "you are now in",
    "<script",
    "javascript:",
];

/// True if the theme text contains a known prompt-injection pattern.
pub fn looks_like_injection(input: &str) -> bool {
    let normalized = input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    INJECTION_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        assert_eq!(clean_text("<b>Alice</b>"), "Alice");
        assert_eq!(clean_text("no tags here"), "no tags here");
    }

    #[test]
    fn test_strips_control_chars() {
        assert_eq!(clean_text("Ali\x00ce\x07"), "Alice");
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(clean_text("  Bob  "), "Bob");
    }

    #[test]
    fn test_injection_detection() {
        assert!(looks_like_injection("please IGNORE  previous\ninstructions"));
        assert!(looks_like_injection("you are now a pirate"));
        assert!(looks_like_injection("inject <script>alert(1)</script>"));
        assert!(!looks_like_injection("pirates at a birthday party"));
    }
}

//! Stored-XSS mitigation for free-text fields.
//!
//! Anything destined for storage and later display (names, descriptions) is
//! passed through here before it reaches the database.

/// Strip executable markup while keeping the visible text.
pub(crate) fn clean_text(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::clean_text;

    #[test]
    fn clean_text_strips_script_tags() {
        let cleaned = clean_text("Alice<script>alert('x')</script>");
        assert_eq!(cleaned, "Alice");
    }

    #[test]
    fn clean_text_strips_event_handlers() {
        let cleaned = clean_text("<img src=x onerror=alert(1)>Bob");
        assert!(!cleaned.contains("onerror"));
        assert!(cleaned.contains("Bob"));
    }

    #[test]
    fn clean_text_keeps_plain_text() {
        assert_eq!(clean_text("Charlie O'Brien"), "Charlie O'Brien");
    }
}

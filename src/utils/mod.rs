//! Utility functions and helpers.

pub mod http;
pub mod log;

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace("\u{a0}محكمة  التمييز\n"), "محكمة التمييز");
        assert_eq!(normalize_whitespace(""), "");
    }
}

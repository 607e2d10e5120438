//! Recipient-list parsing for the send forms.

/// Split a free-form recipient list on commas and newlines.
///
/// Entries are trimmed and empties dropped; order and duplicates are preserved.
pub fn parse_recipients(input: &str) -> Vec<String> {
    input
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join parsed recipients back into the comma-separated form.
pub fn join_recipients(recipients: &[String]) -> String {
    recipients.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_empties_and_trims() {
        assert_eq!(parse_recipients("a, b,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_newlines_and_crlf() {
        assert_eq!(
            parse_recipients("5511999990000\r\n5511999990001\n, 5511999990002"),
            vec!["5511999990000", "5511999990001", "5511999990002"]
        );
    }

    #[test]
    fn test_parse_keeps_duplicates_in_order() {
        assert_eq!(parse_recipients("b,a,b"), vec!["b", "a", "b"]);
    }

    #[test]
    fn test_parse_blank_input() {
        assert!(parse_recipients("").is_empty());
        assert!(parse_recipients(" ,\n , ").is_empty());
    }

    #[test]
    fn test_parse_join_parse_is_stable() {
        for input in [
            "a, b,,c",
            "  x\n\ny ,z,",
            "",
            ",,,",
            "5511 9999, 5522",
            "one",
        ] {
            let once = parse_recipients(input);
            let twice = parse_recipients(&join_recipients(&once));
            assert_eq!(once, twice, "round trip failed for {input:?}");
        }
    }
}

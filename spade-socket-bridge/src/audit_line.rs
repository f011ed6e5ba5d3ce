//! Parsing helpers for a single raw audit line.
//!
//! These are pure functions over `&str` rather than a parsed struct: callers
//! only ever need two facts about a line (its event id and whether it
//! belongs to a filtered record type), and both are cheap substring scans.
//! Keeping them as free functions avoids allocating a line-wrapper type that
//! nothing else needs.

/// Extract the event id (the `NNNN` in `msg=audit(TIMESTAMP:NNNN):`).
///
/// Finds the first `:` in the line; the decimal integer immediately
/// following it is the id. Returns `None` if there is no colon, or the text
/// after it does not start with a decimal digit.
pub fn extract_event_id(line: &str) -> Option<u64> {
    let colon = line.find(':')?;
    let rest = &line[colon + 1..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Whether a line belongs to a record type the Record Assembler filters out
/// entirely (never forwarded, never occupies a slot in the event buffer).
pub fn is_filtered(line: &str) -> bool {
    line.contains("type=EOE") || line.contains("type=UNKNOWN") || line.contains("type=PROCTITLE")
}

/// Whether a line (or an assembled multi-line record) carries a SYSCALL tag.
pub fn contains_syscall(payload: &str) -> bool {
    payload.contains("type=SYSCALL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_after_first_colon() {
        let line = "type=SYSCALL msg=audit(1428946800.123:4567): arch=c000003e syscall=59\n";
        assert_eq!(extract_event_id(line), Some(4567));
    }

    #[test]
    fn missing_colon_returns_none() {
        assert_eq!(extract_event_id("no colon here\n"), None);
    }

    #[test]
    fn non_numeric_after_colon_returns_none() {
        assert_eq!(extract_event_id("type=SYSCALL msg=audit(x:oops)\n"), None);
    }

    #[test]
    fn filters_eoe_unknown_proctitle() {
        assert!(is_filtered("type=EOE msg=audit(1:2):\n"));
        assert!(is_filtered("type=UNKNOWN[1327] msg=audit(1:2):\n"));
        assert!(is_filtered("type=PROCTITLE msg=audit(1:2): proctitle=...\n"));
        assert!(!is_filtered("type=SYSCALL msg=audit(1:2): syscall=59\n"));
    }

    #[test]
    fn detects_syscall_tag() {
        assert!(contains_syscall("type=SYSCALL msg=audit(1:2): syscall=59\n"));
        assert!(!contains_syscall("type=PATH msg=audit(1:2): item=0\n"));
    }
}

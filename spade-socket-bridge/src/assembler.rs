//! Record Assembler.
//!
//! Turns single lines into appends against the [`ReorderBuffer`]: filters
//! EOE/UNKNOWN/PROCTITLE lines, extracts the event id, and reports a parse
//! diagnostic for anything it cannot make sense of.

use log::warn;

use crate::audit_line::{extract_event_id, is_filtered};
use crate::reorder::ReorderBuffer;

/// Feed one raw line into `buffer`. Returns the event id the line was
/// merged into, or `None` if the line was filtered or unparseable.
pub fn assemble(buffer: &mut ReorderBuffer, line: &str) -> Option<u64> {
    if is_filtered(line) {
        return None;
    }

    let id = match extract_event_id(line) {
        Some(id) => id,
        None => {
            warn!("cannot parse event id, dropping line: {}", line.trim_end());
            return None;
        }
    };

    buffer.append(id, line);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_lines_never_touch_the_buffer() {
        let mut buf = ReorderBuffer::new(10);
        assert_eq!(assemble(&mut buf, "type=EOE msg=audit(1:1):\n"), None);
        assert_eq!(buf.watermark(), 0);
    }

    #[test]
    fn unparseable_lines_are_dropped() {
        let mut buf = ReorderBuffer::new(10);
        assert_eq!(assemble(&mut buf, "garbage line with no colon\n"), None);
        assert_eq!(buf.watermark(), 0);
    }

    #[test]
    fn syscall_line_merges_into_buffer() {
        let mut buf = ReorderBuffer::new(10);
        let id = assemble(
            &mut buf,
            "type=SYSCALL msg=audit(1428946800.123:4567): syscall=59\n",
        );
        assert_eq!(id, Some(4567));
        assert_eq!(buf.watermark(), 1);
    }
}

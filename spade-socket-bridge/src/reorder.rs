//! Reorder Buffer.
//!
//! Holds in-progress [`EventRecord`]s keyed by audit event id and releases
//! them in ascending id order once a configurable window is exceeded or the
//! stream ends.

use std::collections::HashMap;

use log::warn;

/// One logical audit event: the concatenation of every non-filtered line
/// that shares an event id.
#[derive(Debug, Default, Clone)]
pub struct EventRecord {
    pub id: u64,
    payload: String,
}

impl EventRecord {
    fn new(id: u64) -> Self {
        Self {
            id,
            payload: String::new(),
        }
    }

    fn append_line(&mut self, line: &str) {
        self.payload.push_str(line);
        if !self.payload.ends_with('\n') {
            self.payload.push('\n');
        }
    }

    /// The concatenated payload, in arrival order.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Default reordering window: number of in-flight records tolerated before
/// the oldest is forcibly released.
pub const DEFAULT_WINDOW: usize = 10_000;

/// Owns the event-id -> EventRecord map and the monotonic release cursor.
/// Appending is [`crate::assembler::assemble`]'s job; this type only knows
/// how to hold records and release them in order.
pub struct ReorderBuffer {
    window: usize,
    buffer: HashMap<u64, EventRecord>,
    /// Next id to release. Unset until the first line is observed.
    cursor: Option<u64>,
    /// Whether `release_next` has ever been called. Before the first
    /// release, the cursor may still move backward as earlier ids arrive
    /// (the window simply hasn't started releasing yet); afterward it is a
    /// firm floor.
    started_releasing: bool,
}

impl ReorderBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            buffer: HashMap::new(),
            cursor: None,
            started_releasing: false,
        }
    }

    /// Count of buffered (not yet released) records.
    pub fn watermark(&self) -> usize {
        self.buffer.len()
    }

    /// Append `line` (including its trailing newline) to the record for
    /// `id`, creating a fresh record if this is the first line seen for it.
    ///
    /// Once the release cursor has passed `id` (i.e. id's record has
    /// already gone out), a further line for it is an out-of-window late
    /// line: it is dropped with a diagnostic rather than resurrecting an
    /// already-released id (see DESIGN.md).
    pub fn append(&mut self, id: u64, line: &str) {
        match self.cursor {
            None => self.cursor = Some(id),
            Some(cursor) if id < cursor => {
                if self.started_releasing {
                    warn!("dropping out-of-window late line for event {id} (cursor at {cursor})");
                    return;
                }
                self.cursor = Some(id);
            }
            _ => {}
        }

        self.buffer
            .entry(id)
            .or_insert_with(|| EventRecord::new(id))
            .append_line(line);
    }

    /// Release the record at the current cursor position (if any) and
    /// advance the cursor by one regardless of whether a record was found.
    /// A missing id is a permanent gap: it is skipped, not waited for.
    pub fn release_next(&mut self) -> Option<EventRecord> {
        let id = self.cursor?;
        self.cursor = Some(id + 1);
        self.started_releasing = true;
        self.buffer.remove(&id)
    }

    /// Release every record at or below the window threshold, in ascending
    /// id order, calling `emit` on each one released.
    pub fn release_ready(&mut self, mut emit: impl FnMut(EventRecord)) {
        while self.watermark() > self.window {
            match self.release_next() {
                Some(record) => emit(record),
                None => continue,
            }
        }
    }

    /// Release every remaining record in ascending id order, skipping gaps,
    /// until the buffer is empty. Used on EOF and on signal-driven drain.
    pub fn drain(&mut self, mut emit: impl FnMut(EventRecord)) {
        while !self.buffer.is_empty() {
            if let Some(record) = self.release_next() {
                emit(record);
            }
        }
    }
}

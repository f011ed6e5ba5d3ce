//! Wires the line reader, assembler, reorder buffer, UBSI analyzer, output
//! emitter, and drain controller together into one value owned by `main`,
//! rather than file-scope statics.

use std::io;

use log::{error, warn};

use crate::assembler::assemble;
use crate::audit_line::contains_syscall;
use crate::drain::DrainController;
use crate::emitter::OutputEmitter;
use crate::line_reader::LineReader;
use crate::reorder::{EventRecord, ReorderBuffer, DEFAULT_WINDOW};
use crate::ubsi::{self, ThreadTable};

pub struct Engine {
    line_reader: LineReader,
    reorder: ReorderBuffer,
    threads: ThreadTable,
    emitter: OutputEmitter,
    drain: DrainController,
    unit_analysis: bool,
}

impl Engine {
    pub fn new(line_reader: LineReader, unit_analysis: bool, drain: DrainController) -> Self {
        Self {
            line_reader,
            reorder: ReorderBuffer::new(DEFAULT_WINDOW),
            threads: ThreadTable::new(),
            emitter: OutputEmitter::new(),
            drain,
            unit_analysis,
        }
    }

    /// Run until EOF or a signal-driven drain completes.
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            if self.drain.should_drain() {
                break;
            }

            match self.line_reader.next_line() {
                Ok(Some(line)) => {
                    assemble(&mut self.reorder, &line);
                    self.release_pending();
                }
                Ok(None) => break,
                Err(err) => {
                    error!("input source failed: {err}");
                    return Err(err.into());
                }
            }
        }

        self.drain_remaining();
        Ok(())
    }

    fn release_pending(&mut self) {
        let threads = &mut self.threads;
        let emitter = &mut self.emitter;
        let unit_analysis = self.unit_analysis;
        self.reorder.release_ready(|record| {
            if let Err(err) = dispatch(threads, emitter, unit_analysis, record) {
                warn!("failed writing to standard output: {err}");
            }
        });
    }

    fn drain_remaining(&mut self) {
        let threads = &mut self.threads;
        let emitter = &mut self.emitter;
        let unit_analysis = self.unit_analysis;
        self.reorder.drain(|record| {
            if let Err(err) = dispatch(threads, emitter, unit_analysis, record) {
                warn!("failed writing to standard output: {err}");
            }
        });
    }
}

/// Choose pass-through or UBSI analysis based on the presence of a
/// `type=SYSCALL` tag, then hand the result(s) to the Output Emitter.
fn dispatch(
    threads: &mut ThreadTable,
    emitter: &mut OutputEmitter,
    unit_analysis: bool,
    record: EventRecord,
) -> io::Result<()> {
    if unit_analysis && contains_syscall(record.payload()) {
        for line in ubsi::process(threads, record) {
            emitter.emit(&line)?;
        }
        Ok(())
    } else {
        emitter.emit(&record.into_payload())
    }
}

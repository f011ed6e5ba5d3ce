//! UBSI Analyzer.
//!
//! Interprets `kill()` syscalls carrying one of eight sentinel `a0` values as
//! in-band unit-boundary and memory-dependency markers, maintains one
//! [`UnitContext`] per thread, and annotates ordinary SYSCALL records with
//! the emitting thread's current unit id.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::reorder::EventRecord;

/// The eight `kill()` `a0` values that carry UBSI markers instead of real
/// signal arguments. The protocol is fixed by the instrumented applications
/// that emit it and must be matched bit-exactly, not inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    UnitEntry,
    UnitEntryId,
    UnitExit,
    MemReadHigh,
    MemReadLow,
    MemWriteHigh,
    MemWriteLow,
    UnitDependency,
}

impl Sentinel {
    pub fn from_a0(a0: i32) -> Option<Self> {
        match a0 {
            -100 => Some(Self::UnitEntry),
            -102 => Some(Self::UnitEntryId),
            -101 => Some(Self::UnitExit),
            -200 => Some(Self::MemReadHigh),
            -201 => Some(Self::MemReadLow),
            -300 => Some(Self::MemWriteHigh),
            -301 => Some(Self::MemWriteLow),
            -400 => Some(Self::UnitDependency),
            _ => None,
        }
    }
}

/// The currently open unit on one thread.
#[derive(Debug)]
pub struct UnitContext {
    pub tid: i32,
    /// Thread-group leader's tid. Equal to `tid` until a clone/fork/vfork
    /// seeds this context as a child of another thread.
    pub pid: i32,
    pub unit_id: u32,
    pub valid: bool,
    read_addr_high: u32,
    write_addr_high: u32,
    pub linked_units: IndexSet<(i32, u32)>,
    unit_written_addrs: IndexSet<u64>,
}

impl UnitContext {
    fn new(tid: i32, pid: i32) -> Self {
        Self {
            tid,
            pid,
            unit_id: 0,
            valid: false,
            read_addr_high: 0,
            write_addr_high: 0,
            linked_units: IndexSet::new(),
            unit_written_addrs: IndexSet::new(),
        }
    }
}

/// Map `tid -> UnitContext`, plus the process-wide written-address maps
/// (one per thread-group leader). Owned by the [`crate::engine::Engine`];
/// nothing here is shared across threads in any concurrency sense — a
/// non-leader thread's "shared" map access is just a lookup through this
/// table keyed by its leader's tid.
#[derive(Default)]
pub struct ThreadTable {
    units: HashMap<i32, UnitContext>,
    proc_written: HashMap<i32, HashMap<u64, (i32, u32)>>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_context(&self, tid: i32) -> bool {
        self.units.contains_key(&tid)
    }

    pub fn context(&self, tid: i32) -> Option<&UnitContext> {
        self.units.get(&tid)
    }

    fn context_mut(&mut self, tid: i32) -> &mut UnitContext {
        self.units.entry(tid).or_insert_with(|| UnitContext::new(tid, tid))
    }

    /// Seed a freshly cloned/forked thread's context, inheriting the
    /// parent's thread-group leader. A no-op if the tid already has a
    /// context (the child raced ahead and reported an event first).
    pub fn seed_child(&mut self, child_tid: i32, leader_pid: i32) {
        self.units
            .entry(child_tid)
            .or_insert_with(|| UnitContext::new(child_tid, leader_pid));
    }

    /// §4.5.4 `write_record`.
    pub fn write_record(&mut self, tid: i32, addr: u64) {
        let (leader_pid, unit_id, already_written) = {
            let ctx = self.context_mut(tid);
            let already_written = ctx.unit_written_addrs.contains(&addr);
            if !already_written {
                ctx.unit_written_addrs.insert(addr);
            }
            (ctx.pid, ctx.unit_id, already_written)
        };
        if already_written {
            return;
        }
        self.proc_written
            .entry(leader_pid)
            .or_default()
            .insert(addr, (tid, unit_id));
    }

    /// §4.5.4 `read_link`.
    pub fn read_link(&mut self, tid: i32, addr: u64) {
        let (leader_pid, this_unit) = {
            let ctx = self.context_mut(tid);
            (ctx.pid, (ctx.tid, ctx.unit_id))
        };
        let writer = self
            .proc_written
            .get(&leader_pid)
            .and_then(|writes| writes.get(&addr))
            .copied();
        if let Some(writer) = writer {
            if writer != this_unit {
                self.context_mut(tid).linked_units.insert(writer);
            }
        }
    }

    /// §4.5.5. Always resets the context's per-unit state and advances
    /// `unit_id`; returns the synthetic `type=UNIT` line only if the unit
    /// did something worth recording.
    pub fn close_unit(&mut self, tid: i32) -> Option<String> {
        let ctx = self.context_mut(tid);
        let should_emit = ctx.valid || !ctx.linked_units.is_empty();

        let line = should_emit.then(|| {
            let mut list = String::new();
            for (linked_tid, linked_unit) in &ctx.linked_units {
                list.push_str(&format!("{linked_tid}-{linked_unit},"));
            }
            format!("type=UNIT list=\"{list}\" tid={tid}\n")
        });

        ctx.linked_units.clear();
        ctx.unit_written_addrs.clear();
        ctx.read_addr_high = 0;
        ctx.write_addr_high = 0;
        ctx.valid = false;
        ctx.unit_id += 1;

        line
    }

    /// Close every thread sharing `leader_pid`'s group, then drop their
    /// contexts and the group's written-address map. Used on `exit_group`
    /// (§4.5.6 item 3). Members are closed in ascending tid order: the
    /// default hasher is randomly seeded per process, so iterating
    /// `units` directly would make the order (and therefore the sequence
    /// of emitted `type=UNIT` lines) vary run to run on identical input,
    /// violating the idempotent-drain invariant (spec §8).
    pub fn teardown_group(&mut self, leader_pid: i32) -> Vec<String> {
        let mut members: Vec<i32> = self
            .units
            .iter()
            .filter(|(_, ctx)| ctx.pid == leader_pid)
            .map(|(tid, _)| *tid)
            .collect();
        members.sort_unstable();

        let mut lines = Vec::new();
        for tid in members {
            if let Some(line) = self.close_unit(tid) {
                lines.push(line);
            }
            self.units.remove(&tid);
        }
        self.proc_written.remove(&leader_pid);
        lines
    }

    /// Drop a single thread's context, e.g. on plain `exit` (§4.5.6 item 3;
    /// spec §3 pairs syscalls 60 and 231 as the thread-context destruction
    /// triggers). Does not touch `proc_written`: that map is keyed by
    /// thread-group leader and is only torn down on `exit_group`.
    pub fn remove(&mut self, tid: i32) {
        self.units.remove(&tid);
    }
}

/// The numeric fields pulled out of one SYSCALL line (§4.5.1).
struct SyscallFields {
    syscall: i64,
    success: bool,
    pid: i32,
    a0: i32,
    a1: u32,
    a2: u64,
    exit: i64,
}

impl SyscallFields {
    fn parse(line: &str) -> Option<Self> {
        Some(Self {
            syscall: field(line, "syscall")?.parse().ok()?,
            success: field(line, "success")? == "yes",
            pid: field(line, "pid")?.parse().ok()?,
            a0: parse_hex_i32(field(line, "a0")?)?,
            a1: parse_hex_u32(field(line, "a1")?)?,
            a2: field(line, "a2").and_then(parse_hex_u64).unwrap_or(0),
            exit: field(line, "exit")?.parse().ok()?,
        })
    }
}

/// Find ` {key}=` (or `{key}=` at the very start of the line) and return the
/// value up to the next whitespace. Guards against matching a shorter key
/// that is itself a suffix of a longer one, e.g. `pid` inside `ppid`.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(idx) = line[search_from..].find(key) {
        let start = search_from + idx;
        let at_boundary = start == 0 || line.as_bytes()[start - 1] == b' ';
        let key_end = start + key.len();
        if at_boundary && line.as_bytes().get(key_end) == Some(&b'=') {
            let rest = &line[key_end + 1..];
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            return Some(&rest[..end]);
        }
        search_from = key_end;
        if search_from >= line.len() {
            break;
        }
    }
    None
}

fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s, 16).ok()
}

fn parse_hex_u32(s: &str) -> Option<u32> {
    parse_hex_u64(s).map(|v| v as u32)
}

fn parse_hex_i32(s: &str) -> Option<i32> {
    parse_hex_u32(s).map(|v| v as i32)
}

fn first_line_with_tag<'a>(payload: &'a str, tag: &str) -> Option<&'a str> {
    payload.split_inclusive('\n').find(|line| line.contains(tag))
}

fn annotate_syscall_line(payload: &str, syscall_line: &str, unit_id: u32) -> String {
    let stripped = syscall_line.trim_end_matches('\n');
    let annotated = format!("{stripped} unitid={unit_id}\n");
    payload.replacen(syscall_line, &annotated, 1)
}

fn handle_sentinel(
    table: &mut ThreadTable,
    tid: i32,
    sentinel: Sentinel,
    fields: &SyscallFields,
) -> Vec<String> {
    match sentinel {
        Sentinel::UnitEntry | Sentinel::UnitEntryId | Sentinel::UnitExit => {
            if table.has_context(tid) {
                table.close_unit(tid).into_iter().collect()
            } else {
                // Freshly observed thread: this marker is the opening of
                // unit 0, not a boundary between two units.
                table.context_mut(tid);
                Vec::new()
            }
        }
        Sentinel::MemReadHigh => {
            table.context_mut(tid).read_addr_high = fields.a1;
            Vec::new()
        }
        Sentinel::MemReadLow => {
            let high = table.context_mut(tid).read_addr_high;
            let addr = ((high as u64) << 32) | fields.a1 as u64;
            table.read_link(tid, addr);
            Vec::new()
        }
        Sentinel::MemWriteHigh => {
            table.context_mut(tid).write_addr_high = fields.a1;
            Vec::new()
        }
        Sentinel::MemWriteLow => {
            let high = table.context_mut(tid).write_addr_high;
            let addr = ((high as u64) << 32) | fields.a1 as u64;
            table.write_record(tid, addr);
            Vec::new()
        }
        Sentinel::UnitDependency => Vec::new(),
    }
}

/// Process one released record known to carry a `type=SYSCALL` line.
/// Returns the lines to hand to the Output Emitter, in order: zero lines if
/// the record was a UBSI marker consumed in full, one if it was an ordinary
/// syscall, or two if closing a unit (or a thread-group teardown) produced
/// a synthetic `type=UNIT` line alongside it.
pub fn process(table: &mut ThreadTable, record: EventRecord) -> Vec<String> {
    let payload = record.into_payload();

    let Some(line) = first_line_with_tag(&payload, "type=SYSCALL") else {
        return vec![payload];
    };
    let Some(fields) = SyscallFields::parse(line) else {
        return vec![payload];
    };
    let tid = fields.pid;

    if fields.syscall == 62 {
        if let Some(sentinel) = Sentinel::from_a0(fields.a0) {
            return handle_sentinel(table, tid, sentinel, &fields);
        }
    }

    let unit_id = table.context_mut(tid).unit_id;
    let mut out = vec![annotate_syscall_line(&payload, line, unit_id)];

    if fields.success && matches!(fields.syscall, 56 | 57 | 58) && fields.a2 > 0 {
        if let Ok(child_tid) = i32::try_from(fields.exit) {
            let leader_pid = table.context_mut(tid).pid;
            table.seed_child(child_tid, leader_pid);
        }
    }

    if fields.success && matches!(fields.syscall, 59 | 322) {
        out.extend(table.close_unit(tid));
    } else if fields.success && fields.syscall == 60 {
        out.extend(table.close_unit(tid));
        table.remove(tid);
    } else if fields.success && fields.syscall == 231 {
        let leader_pid = table.context_mut(tid).pid;
        out.extend(table.teardown_group(leader_pid));
    } else {
        table.context_mut(tid).valid = true;
    }

    out
}

//! The fixed-width trace event record.
//!
//! Events are produced by an instrumentation front-end outside this crate
//! and streamed over a named pipe as raw bytes. [`Event`] mirrors that wire
//! layout field-for-field; [`Event::encode`]/[`Event::decode`] are the only
//! places the byte layout is pinned down, so the sending and receiving ends
//! of a pipe must agree on this crate's version.

use crate::error::DecodeError;

/// Sentinel thread id meaning "no thread" (all-ones, matching the front-end's
/// `uint16_t(-1)` convention).
pub const INVALID_TID: u16 = u16::MAX;

/// The wire size of one [`Event`] record, in bytes.
pub const EVENT_SIZE: usize = 32;

/// Discriminant for [`Event`]'s `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Marks entry into the profiled region of interest. Stats-only.
    RoiStart,
    /// Marks exit from the profiled region of interest. Stats-only.
    RoiFinish,
    /// A thread began executing.
    ThreadStart,
    /// A thread finished executing. `tid == 0` (main thread) ends the trace.
    ThreadFinish,
    /// A thread entered a blocking kernel operation.
    ThreadBlocked,
    /// A thread left a blocking kernel operation.
    ThreadUnblocked,
    /// A memory load.
    MemRead,
    /// A memory store.
    MemWrite,
    /// A heap allocation. Stats-only.
    MemAlloc,
    /// A heap deallocation. Stats-only.
    MemFree,
    /// A fixed number of instructions were retired without a memory op.
    BasicBlock,
    /// The source side of a happens-before synchronization edge.
    HbSource,
    /// The sink side of a happens-before synchronization edge.
    HbSink,
}

impl EventKind {
    const fn to_tag(self) -> u8 {
        match self {
            Self::RoiStart => 0,
            Self::RoiFinish => 1,
            Self::ThreadStart => 2,
            Self::ThreadFinish => 3,
            Self::ThreadBlocked => 4,
            Self::ThreadUnblocked => 5,
            Self::MemRead => 6,
            Self::MemWrite => 7,
            Self::MemAlloc => 8,
            Self::MemFree => 9,
            Self::BasicBlock => 10,
            Self::HbSource => 11,
            Self::HbSink => 12,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::RoiStart),
            1 => Some(Self::RoiFinish),
            2 => Some(Self::ThreadStart),
            3 => Some(Self::ThreadFinish),
            4 => Some(Self::ThreadBlocked),
            5 => Some(Self::ThreadUnblocked),
            6 => Some(Self::MemRead),
            7 => Some(Self::MemWrite),
            8 => Some(Self::MemAlloc),
            9 => Some(Self::MemFree),
            10 => Some(Self::BasicBlock),
            11 => Some(Self::HbSource),
            12 => Some(Self::HbSink),
            _ => None,
        }
    }

    /// Whether this event type carries the happens-before payload fields.
    #[must_use]
    pub const fn is_sync(self) -> bool {
        matches!(self, Self::HbSource | Self::HbSink)
    }

    /// Whether this event type carries the memory-op payload fields.
    #[must_use]
    pub const fn is_mem_op(self) -> bool {
        matches!(self, Self::MemRead | Self::MemWrite)
    }
}

/// One trace record. Field meanings vary by [`EventKind`]; unused fields for
/// a given kind are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The event's type.
    pub kind: EventKind,
    /// Owning thread id, or [`INVALID_TID`] if not applicable.
    pub tid: u16,
    /// Mem ops: byte address. Alloc/free: base address.
    pub addr: u64,
    /// Mem ops: access size in bytes. Alloc: extent. Free: always 0.
    pub mem_op_size: u8,
    /// Mem ops: true if the access targets the owning thread's stack.
    pub stack_ref: bool,
    /// Hb events: identifier of the synchronized object.
    pub sync_object: u64,
    /// Hb events: true for the synthetic thread create/join ordering that
    /// requires a causal total order (a "life-lock").
    pub is_life_lock: bool,
    /// Hb-sink: tid of the thread that last sourced this sync object, or
    /// [`INVALID_TID`] if none has yet.
    pub hb_source_thread: u16,
    /// Life-lock hb events: 1-indexed per-object sequence number assigned
    /// by the dispatcher at pipe-arrival time. Zero until assigned.
    pub logical_time: u64,
    /// Basic-block events: instructions retired in the block.
    pub insn_count: u8,
}

impl Event {
    /// Serializes this event to its fixed-width wire layout.
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        buf[0] = self.kind.to_tag();
        buf[2..4].copy_from_slice(&self.tid.to_ne_bytes());
        buf[4..12].copy_from_slice(&self.addr.to_ne_bytes());
        buf[12] = self.mem_op_size;
        buf[13] = u8::from(self.stack_ref);
        buf[14..22].copy_from_slice(&self.sync_object.to_ne_bytes());
        buf[22] = u8::from(self.is_life_lock);
        buf[24..26].copy_from_slice(&self.hb_source_thread.to_ne_bytes());
        buf[26] = self.insn_count;
        // logical_time is assigned by the dispatcher after arrival, not on
        // the wire from the front-end, but is included for round-trip tests
        // and for the optional multiplexer pass-through.
        buf[27..32.min(EVENT_SIZE)].copy_from_slice(&self.logical_time.to_ne_bytes()[..5]);
        buf
    }

    /// Parses a fixed-width record out of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::ShortRead`] if `buf` is smaller than
    /// [`EVENT_SIZE`], or [`DecodeError::UnknownEventType`] if the leading
    /// tag byte does not match a known [`EventKind`].
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < EVENT_SIZE {
            return Err(DecodeError::ShortRead {
                got: buf.len(),
                want: EVENT_SIZE,
            });
        }
        let kind = EventKind::from_tag(buf[0]).ok_or(DecodeError::UnknownEventType {
            tag: buf[0],
        })?;
        let tid = u16::from_ne_bytes([buf[2], buf[3]]);
        let addr = u64::from_ne_bytes(buf[4..12].try_into().unwrap_or_default());
        let mem_op_size = buf[12];
        let stack_ref = buf[13] != 0;
        let sync_object = u64::from_ne_bytes(buf[14..22].try_into().unwrap_or_default());
        let is_life_lock = buf[22] != 0;
        let hb_source_thread = u16::from_ne_bytes([buf[24], buf[25]]);
        let insn_count = buf[26];
        let mut lt_bytes = [0u8; 8];
        lt_bytes[..5].copy_from_slice(&buf[27..32]);
        let logical_time = u64::from_ne_bytes(lt_bytes);

        Ok(Self {
            kind,
            tid,
            addr,
            mem_op_size,
            stack_ref,
            sync_object,
            is_life_lock,
            hb_source_thread,
            logical_time,
            insn_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_mem_write() {
        let e = Event {
            kind: EventKind::MemWrite,
            tid: 3,
            addr: 0xdead_beef,
            mem_op_size: 8,
            stack_ref: true,
            sync_object: 0,
            is_life_lock: false,
            hb_source_thread: INVALID_TID,
            logical_time: 0,
            insn_count: 0,
        };
        let decoded = Event::decode(&e.encode()).expect("decodes");
        assert_eq!(decoded, e);
    }

    #[test]
    fn round_trips_a_life_lock_sink_with_logical_time() {
        let e = Event {
            kind: EventKind::HbSink,
            tid: 1,
            addr: 0,
            mem_op_size: 0,
            stack_ref: false,
            sync_object: 42,
            is_life_lock: true,
            hb_source_thread: 2,
            logical_time: 7,
            insn_count: 0,
        };
        let decoded = Event::decode(&e.encode()).expect("decodes");
        assert_eq!(decoded, e);
    }

    #[test]
    fn short_read_is_reported() {
        let buf = [0u8; 10];
        assert_eq!(
            Event::decode(&buf),
            Err(DecodeError::ShortRead { got: 10, want: EVENT_SIZE })
        );
    }

    #[test]
    fn unknown_tag_is_reported() {
        let mut buf = [0u8; EVENT_SIZE];
        buf[0] = 200;
        assert_eq!(
            Event::decode(&buf),
            Err(DecodeError::UnknownEventType { tag: 200 })
        );
    }
}

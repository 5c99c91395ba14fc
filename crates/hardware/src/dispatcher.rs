//! Event dispatcher: the main loop that drains per-core event queues and
//! drives [`Orchestrator`].
//!
//! Events arrive off the wire in producer order, one thread's trace at a
//! time, but the dispatcher must interleave across cores fairly (a
//! round-robin, rotating-start drain avoids always favoring core 0) and
//! must additionally honor a *causal* total order for "life-lock" events —
//! the synthetic thread create/join edges that must apply in the exact
//! sequence the front-end assigned them, regardless of which core's queue
//! they sit in. An event that arrives at the front of its queue before its
//! causal predecessor has been applied elsewhere is pushed back and
//! revisited after the rest of the rotation — never blocked on in place,
//! which would turn one stalled core into a global deadlock.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::ExecutionPolicy;
use crate::event::{Event, EventKind, INVALID_TID};
use crate::orchestrator::Orchestrator;

/// Number of idle rotations with no forward progress before the dispatcher
/// gives up waiting for natural round completion and forces a commit. Any
/// one core stalled on an unmet causal dependency, or a genuine
/// producer-side deadlock, must not hang the simulation forever.
pub const FORCED_COMMIT_SPIN_BUDGET: u64 = 100_000;

/// Drains per-core event queues against an [`Orchestrator`], enforcing
/// causal ordering for life-lock events and forcing quantum-round
/// completion if progress stalls.
pub struct Dispatcher {
    orchestrator: Orchestrator,
    fifos: Vec<VecDeque<Event>>,
    rotate_start: usize,
    /// Per-sync-object counter for assigning life-lock logical time at
    /// arrival. Starts at 0; the first life-lock event for an object gets
    /// logical_time 1.
    next_logical_time: HashMap<u64, u64>,
    /// Per-sync-object logical time of the last life-lock event actually
    /// applied. An event may apply only when its logical_time is exactly
    /// one more than this.
    applied_logical_time: HashMap<u64, u64>,
    /// Distinct application thread ids seen as started but not yet
    /// finished. `Orchestrator::live_threads` tracks only the count, since
    /// `cpu(tid) = tid mod cores` makes the mapping many-to-one.
    live_tids: HashSet<u16>,
    ignore_stack: bool,
    eof_reached: bool,
}

impl Dispatcher {
    /// Builds a dispatcher for `cores` cores, driving `orchestrator`.
    #[must_use]
    pub fn new(orchestrator: Orchestrator, ignore_stack: bool) -> Self {
        let cores = orchestrator.core_count();
        Self {
            orchestrator,
            fifos: (0..cores).map(|_| VecDeque::new()).collect(),
            rotate_start: 0,
            next_logical_time: HashMap::new(),
            applied_logical_time: HashMap::new(),
            live_tids: HashSet::new(),
            ignore_stack,
            eof_reached: false,
        }
    }

    /// Access to the underlying orchestrator, e.g. for final stats output.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Enqueues a decoded event on its owning thread's queue, assigning
    /// life-lock logical time at this arrival point if applicable. Threads
    /// multiplex onto cores as `cpu(tid) = tid mod cores`, so several tids
    /// may share one queue.
    ///
    /// # Panics
    ///
    /// Panics if `event.tid` is [`INVALID_TID`] — every routable event must
    /// name a live thread.
    pub fn push_event(&mut self, mut event: Event) {
        assert_ne!(event.tid, INVALID_TID, "event has no owning thread");
        let core = event.tid as usize % self.fifos.len();

        if event.kind.is_sync() && event.is_life_lock {
            let counter = self.next_logical_time.entry(event.sync_object).or_insert(0);
            *counter += 1;
            event.logical_time = *counter;
        }
        self.fifos[core].push_back(event);
    }

    /// Marks end-of-stream: no more events will arrive. The drain loop
    /// treats an empty, EOF'd queue as a finished core rather than idle.
    pub fn mark_eof(&mut self) {
        self.eof_reached = true;
    }

    /// Whether a life-lock event is cleared to apply now: either it is not
    /// life-locked at all, or its logical time is exactly the next one due
    /// for its sync object.
    fn causality_satisfied(&self, event: &Event) -> bool {
        if !(event.kind.is_sync() && event.is_life_lock) {
            return true;
        }
        let applied = self.applied_logical_time.get(&event.sync_object).copied().unwrap_or(0);
        event.logical_time == applied + 1
    }

    fn record_applied(&mut self, event: &Event) {
        if event.kind.is_sync() && event.is_life_lock {
            let _ = self.applied_logical_time.insert(event.sync_object, event.logical_time);
        }
    }

    /// Applies one event to the orchestrator, returning whether the
    /// applying core's quantum ended as a result.
    fn apply(&mut self, core: usize, event: &Event) -> bool {
        match event.kind {
            EventKind::MemRead => {
                // Reads never touch the store buffer regardless of
                // ignore-stack; only writes can become dirty.
                self.orchestrator.cache_read(core, event.addr).store_buffer_overflowed
            }
            EventKind::MemWrite => {
                let skip_store_buffer = self.ignore_stack && event.stack_ref;
                self.orchestrator
                    .cache_write(core, event.addr, skip_store_buffer)
                    .store_buffer_overflowed
            }
            EventKind::BasicBlock => {
                self.orchestrator.basic_block(core, u64::from(event.insn_count));
                false
            }
            EventKind::HbSource => self.orchestrator.sync_op(core, true, event.sync_object),
            EventKind::HbSink => self.orchestrator.sync_op(core, false, event.sync_object),
            EventKind::ThreadBlocked => {
                self.orchestrator.block(core);
                false
            }
            EventKind::ThreadUnblocked => {
                self.orchestrator.unblock(core);
                false
            }
            EventKind::ThreadStart => {
                let _ = self.live_tids.insert(event.tid);
                self.orchestrator.set_live_threads(self.live_tids.len() as u32);
                false
            }
            EventKind::ThreadFinish => {
                let _ = self.live_tids.remove(&event.tid);
                self.orchestrator.set_live_threads(self.live_tids.len() as u32);
                false
            }
            EventKind::RoiStart => {
                self.orchestrator.record_roi_start();
                false
            }
            EventKind::RoiFinish => {
                self.orchestrator.record_roi_finish();
                false
            }
            EventKind::MemAlloc => {
                self.orchestrator.record_alloc(u64::from(event.mem_op_size));
                false
            }
            EventKind::MemFree => {
                self.orchestrator.record_free(u64::from(event.mem_op_size));
                false
            }
        }
    }

    /// Drains queued events in rotating per-core order until the current
    /// quantum round completes naturally or the deadlock spin budget is
    /// exhausted, in which case the round is force-committed. Returns
    /// `false` once every queue is empty and EOF has been observed (the
    /// simulation has nothing left to do).
    pub fn run_round(&mut self) -> bool {
        let cores = self.fifos.len();
        let mut idle_rotations = 0u64;

        loop {
            if self.orchestrator.round_complete() {
                self.orchestrator.finish_quantum_round(false);
                return self.has_pending_work();
            }

            let mut made_progress = false;
            for offset in 0..cores {
                let core = (self.rotate_start + offset) % cores;
                if let Some(event) = self.fifos[core].pop_front() {
                    if self.orchestrator.core_stalled(core) {
                        // Core already ended its quantum this round: hold
                        // the event rather than apply it.
                        self.fifos[core].push_front(event);
                    } else if self.causality_satisfied(&event) {
                        let _ = self.apply(core, &event);
                        self.record_applied(&event);
                        self.orchestrator.satisfied_causality(core);
                        made_progress = true;
                    } else {
                        // Not this event's turn yet: put it back and try a
                        // later rotation once its predecessor lands.
                        self.orchestrator.wait_for_causality(core);
                        self.orchestrator.record_causality_delay();
                        self.fifos[core].push_front(event);
                    }
                }
            }
            self.rotate_start = (self.rotate_start + 1) % cores.max(1);

            if made_progress {
                idle_rotations = 0;
            } else {
                idle_rotations += 1;
            }

            if !made_progress && self.eof_reached && self.fifos.iter().all(VecDeque::is_empty) {
                self.orchestrator.finish_quantum_round(false);
                return false;
            }

            if idle_rotations >= FORCED_COMMIT_SPIN_BUDGET {
                self.orchestrator.finish_quantum_round(true);
                idle_rotations = 0;
                if !self.has_pending_work() {
                    return false;
                }
            }
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.fifos.iter().all(VecDeque::is_empty) || !self.eof_reached
    }

    /// Runs rounds until the stream is exhausted.
    pub fn run_to_completion(&mut self) {
        while self.run_round() {}
    }

    /// The configured execution policy, exposed for the CLI's stats tags.
    #[must_use]
    pub fn policy(&self) -> ExecutionPolicy {
        // Orchestrator does not expose its policy directly since nothing
        // inside this crate other than this accessor needs it after
        // construction; route through a dedicated getter instead of
        // duplicating the field.
        self.orchestrator.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheGeometry, Config, Tags};

    fn config(cores: u32) -> Config {
        Config {
            cores,
            block_size: 4,
            l1: CacheGeometry { size_bytes: 16, ways: 2 },
            l2: None,
            l3: None,
            policy: ExecutionPolicy::NonDet,
            quantum_size: 1000,
            smart_quantum_building: false,
            ignore_stack: false,
            stats_file: "out.py".to_string(),
            tags: Tags::default(),
        }
    }

    fn mem_event(tid: u16, kind: EventKind, addr: u64) -> Event {
        Event {
            kind,
            tid,
            addr,
            mem_op_size: 8,
            stack_ref: false,
            sync_object: 0,
            is_life_lock: false,
            hb_source_thread: INVALID_TID,
            logical_time: 0,
            insn_count: 0,
        }
    }

    fn life_lock_event(tid: u16, kind: EventKind, sync_object: u64) -> Event {
        Event {
            kind,
            tid,
            addr: 0,
            mem_op_size: 0,
            stack_ref: false,
            sync_object,
            is_life_lock: true,
            hb_source_thread: INVALID_TID,
            logical_time: 0,
            insn_count: 0,
        }
    }

    #[test]
    fn drains_independent_memory_events_to_completion() {
        let mut d = Dispatcher::new(Orchestrator::new(&config(2)), false);
        d.push_event(mem_event(0, EventKind::MemWrite, 0));
        d.push_event(mem_event(1, EventKind::MemRead, 16));
        d.mark_eof();
        d.run_to_completion();
        assert!(d.fifos.iter().all(VecDeque::is_empty));
    }

    #[test]
    fn life_lock_events_apply_in_assigned_order_even_out_of_queue_order() {
        let mut d = Dispatcher::new(Orchestrator::new(&config(2)), false);
        // Two life-locked events on the same sync object, arriving on
        // different cores: core 1's event is pushed first but must wait
        // for core 0's to apply first, since arrival order assigned it
        // logical_time 1 before core 1's logical_time 2.
        let first = life_lock_event(0, EventKind::HbSource, 99);
        let second = life_lock_event(1, EventKind::HbSink, 99);
        d.push_event(first);
        d.push_event(second);
        assert_eq!(d.fifos[0][0].logical_time, 1);
        assert_eq!(d.fifos[1][0].logical_time, 2);
        d.mark_eof();
        d.run_to_completion();
        assert_eq!(d.applied_logical_time.get(&99), Some(&2));
    }

    #[test]
    fn forced_commit_breaks_a_stalled_round() {
        // quantum_size so large the core never reaches a natural boundary;
        // one basic block, then EOF never arrives mid-test — but with
        // mark_eof the drain should still terminate once the queue is dry.
        let mut cfg = config(1);
        cfg.quantum_size = u64::MAX;
        let mut d = Dispatcher::new(Orchestrator::new(&cfg), false);
        d.push_event(Event {
            kind: EventKind::BasicBlock,
            insn_count: 1,
            ..mem_event(0, EventKind::BasicBlock, 0)
        });
        d.mark_eof();
        d.run_to_completion();
        assert!(d.fifos[0].is_empty());
    }
}

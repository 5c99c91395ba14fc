//! Quantum scheduler: drives every core's private cache plus the shared L3,
//! and decides when a core's quantum — and a global quantum round — ends.
//!
//! A [`HierarchicalCache`] knows nothing about its neighbors; an
//! [`crate::smp::SmpCache`] knows nothing about its peers. This type is
//! where cross-core coherence actually happens: it owns every core's
//! private hierarchy plus the one shared L3, and uses
//! [`<[T]>::split_at_mut`] to hand the current core mutable access to its
//! own state while every other core is visited read/write as a snoop
//! target. That slice-splitting is the "non-owning handles with lifetimes
//! tied to the orchestrator" shape design note 9 calls for, without `Rc`,
//! `RefCell`, or unsafe aliasing.

use std::collections::HashSet;

use crate::cache::line::{MesiState, PlainLine};
use crate::cache::policy::LruPolicy;
use crate::cache::HierarchicalCache;
use crate::config::{Config, ExecutionPolicy};
use crate::counters::{Counter, CounterRegistry};
use crate::event::INVALID_TID;
use crate::smp::{latency, PrivateHit, SmpCache};

/// Outcome of a memory access, for the dispatcher's quantum-boundary and
/// accounting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOutcome {
    /// Simulated cycles charged to the accessing core.
    pub cycles: u64,
    /// Whether this access overflowed the deterministic store buffer and
    /// therefore forces the accessing core's quantum to end now.
    pub store_buffer_overflowed: bool,
}

#[derive(Clone, Copy)]
struct PerCoreCounters {
    read_hits: Counter,
    read_misses: Counter,
    write_hits: Counter,
    write_misses: Counter,
    store_buffer_overflows: Counter,
    quanta_completed: Counter,
    forced_commits: Counter,
}

#[derive(Clone, Copy)]
struct GlobalCounters {
    runtime: Counter,
    total_quantum_imbalance: Counter,
    quantum_rounds: Counter,
    quantum_round_commits: Counter,
    total_quanta: Counter,
    sync_induced_round_boundaries: Counter,
    causality_delay: Counter,
    alloc_bytes: Counter,
    free_bytes: Counter,
    roi_starts: Counter,
    roi_finishes: Counter,
    max_live_threads: Counter,
}

struct CoreState {
    /// Quantum work budget, compared against `quantum_size`. Under
    /// `smart_quantum_building` this accumulates per-access deterministic
    /// cycle deltas; otherwise it accumulates basic-block instruction
    /// counts.
    work_count: u64,
    /// Raw instructions-retired tally for this round, always incremented
    /// by basic-block events regardless of accounting mode. Used only for
    /// the round's runtime computation.
    insns_this_round: u64,
    /// Cycles spent in the memory hierarchy this round, accumulated by
    /// every cache access regardless of accounting mode.
    time_in_memory_hierarchy: u64,
    /// Deterministic cycles spent in the memory hierarchy this round: a
    /// hit-level-only accounting that never depends on real peer/memory
    /// contention timing, so two runs agree on it regardless of
    /// scheduling. Feeds `work_count` under `smart_quantum_building`.
    det_time_in_memory_hierarchy: u64,
    stalled_at_boundary: bool,
    blocked: bool,
    waiting_for_causality: bool,
}

impl CoreState {
    fn new() -> Self {
        Self {
            work_count: 0,
            insns_this_round: 0,
            time_in_memory_hierarchy: 0,
            det_time_in_memory_hierarchy: 0,
            stalled_at_boundary: false,
            blocked: false,
            waiting_for_causality: false,
        }
    }

    /// A core is "accounted for" this round once it has reached a
    /// boundary, is blocked in a kernel call, or is waiting on a causal
    /// predecessor — the three states spec's round-completion formula
    /// counts.
    fn accounted_for(&self) -> bool {
        self.stalled_at_boundary || self.blocked || self.waiting_for_causality
    }

    fn runtime(&self) -> u64 {
        self.insns_this_round + self.time_in_memory_hierarchy
    }
}

/// Owns every core's private cache hierarchy, the shared L3, and the
/// quantum/round bookkeeping that the event dispatcher drives.
pub struct Orchestrator {
    cores: Vec<SmpCache>,
    l3: Option<HierarchicalCache<PlainLine>>,
    policy: ExecutionPolicy,
    quantum_size: u64,
    smart_quantum_building: bool,
    per_core: Vec<CoreState>,
    per_core_counters: Vec<PerCoreCounters>,
    global_counters: GlobalCounters,
    /// Sync objects sourced during the current round (`HbSource`), for the
    /// Det-HB rule: a sink only forces a boundary if its object's source
    /// landed in this same round.
    sourced_this_round: HashSet<u64>,
    /// Whether any trigger (overflow, budget, sync) ended a core's quantum
    /// this round, as opposed to the round closing with nothing left to do.
    commit_this_round: bool,
    /// Distinct application threads still running; a core only counts
    /// toward round completion while threads remain for it to run.
    live_threads: u32,
    /// High-water mark of `live_threads` ever observed, for the
    /// `max_live_threads` counter.
    max_live_threads_seen: u32,
    counters: CounterRegistry,
}

impl Orchestrator {
    /// Builds an orchestrator for a validated [`Config`].
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let l1_sets = config.l1.num_sets(config.block_size);
        let l1_ways = config.l1.ways as usize;
        let l2_geom = config
            .l2
            .map(|g| (g.num_sets(config.block_size), g.ways as usize));
        let l3 = config.l3.map(|g| {
            HierarchicalCache::new(
                g.num_sets(config.block_size),
                g.ways as usize,
                config.block_size,
                3,
                Box::new(LruPolicy),
            )
        });

        let mut counters = CounterRegistry::new();
        let mut per_core_counters = Vec::with_capacity(config.cores as usize);
        for cpu in 0..config.cores {
            per_core_counters.push(PerCoreCounters {
                read_hits: counters.register(cpu, "numReadHits"),
                read_misses: counters.register(cpu, "numReadMisses"),
                write_hits: counters.register(cpu, "numWriteHits"),
                write_misses: counters.register(cpu, "numWriteMisses"),
                store_buffer_overflows: counters.register(cpu, "numStoreBufferOverflows"),
                quanta_completed: counters.register(cpu, "numQuantaCompleted"),
                forced_commits: counters.register(cpu, "numForcedCommits"),
            });
        }
        let global_counters = GlobalCounters {
            runtime: counters.register(0, "Runtime"),
            total_quantum_imbalance: counters.register(0, "TotalQuantumImbalance"),
            quantum_rounds: counters.register(0, "QuantumRounds"),
            quantum_round_commits: counters.register(0, "QuantumRoundCommits"),
            total_quanta: counters.register(0, "TotalQuanta"),
            sync_induced_round_boundaries: counters.register(0, "SyncInducedRoundBoundaries"),
            causality_delay: counters.register(0, "CausalityDelay"),
            alloc_bytes: counters.register(0, "AllocBytes"),
            free_bytes: counters.register(0, "FreeBytes"),
            roi_starts: counters.register(0, "RoiStarts"),
            roi_finishes: counters.register(0, "RoiFinishes"),
            max_live_threads: counters.register(0, "MaxLiveThreads"),
        };
        counters.set(global_counters.max_live_threads, u64::from(config.cores));

        Self {
            cores: (0..config.cores)
                .map(|_| SmpCache::new(l1_sets, l1_ways, l2_geom, config.block_size))
                .collect(),
            l3,
            policy: config.policy,
            quantum_size: config.quantum_size,
            smart_quantum_building: config.smart_quantum_building,
            per_core: (0..config.cores).map(|_| CoreState::new()).collect(),
            per_core_counters,
            global_counters,
            sourced_this_round: HashSet::new(),
            commit_this_round: false,
            live_threads: config.cores,
            max_live_threads_seen: config.cores,
            counters,
        }
    }

    /// Number of cores.
    #[must_use]
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// The configured execution policy.
    #[must_use]
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Installs `victim` (evicted from a core's private hierarchy) into the
    /// shared L3, if one exists. The L3 is non-coherent: it holds presence
    /// only, so a `PlainLine` is all it needs regardless of the victim's
    /// MESI state.
    fn writeback_to_l3(&mut self, addr: u64, victim_was_valid: bool) {
        if victim_was_valid {
            if let Some(l3) = &mut self.l3 {
                let _ = l3.install(addr, PlainLine::valid_placeholder());
            }
        }
    }

    fn charge_eviction(&mut self, core: usize, addr: u64, victim: Option<crate::cache::line::RcdcLine>) {
        let had_victim = victim.is_some();
        self.writeback_to_l3(addr, had_victim);
        if self.cores[core].store_buffer_overflowed {
            self.counters.inc(self.per_core_counters[core].store_buffer_overflows);
        }
    }

    /// Performs a read, searching this core's private hierarchy — L1, L2,
    /// and the shared L3, which an L1cache-style private search resolves
    /// before ever consulting a peer — then every peer, then memory,
    /// installing the result and transitioning MESI state along the way.
    pub fn cache_read(&mut self, core: usize, addr: u64) -> AccessOutcome {
        let (cycles, det_cycles, overflowed) = match self.cores[core].search_private(addr) {
            PrivateHit::L1 => {
                self.cores[core].touch_l1(addr);
                self.counters.inc(self.per_core_counters[core].read_hits);
                (latency::L1, latency::L1, false)
            }
            PrivateHit::L2 => {
                let loc = self.l2_lookup(core, addr);
                let dirty = loc.is_some_and(|(set, way)| self.cores[core].l2_is_dirty(set, way));
                if let Some((set, way)) = loc {
                    let victim = self.cores[core].promote_l2_to_l1(addr, set, way);
                    self.charge_eviction(core, addr, victim);
                }
                self.counters.inc(self.per_core_counters[core].read_hits);
                let det = if dirty { latency::L2 } else { latency::L1 };
                (latency::L2, det, self.take_overflow(core))
            }
            PrivateHit::Miss => {
                self.counters.inc(self.per_core_counters[core].read_misses);
                let (found_state, cycles) = if self.l3_hit(addr) {
                    (MesiState::Shared, latency::L3)
                } else {
                    self.snoop_for_read(core, addr)
                };
                let victim = self.cores[core].install_fetched(addr, found_state);
                self.charge_eviction(core, addr, victim);
                (cycles, latency::L1, self.take_overflow(core))
            }
        };
        self.account_access(core, cycles, det_cycles);
        AccessOutcome {
            cycles,
            store_buffer_overflowed: overflowed,
        }
    }

    /// Performs a write: on a private hit in `Shared`, invalidates every
    /// peer's copy before transitioning to `Modified`; on a miss,
    /// invalidates every peer unconditionally (a write always wants sole
    /// ownership) before fetching and installing as `Modified`.
    ///
    /// `skip_store_buffer` is set for stack references under the
    /// `ignore-stack` configuration knob: the write still updates the
    /// cache and MESI state, but never sets the dirty bit, so it can never
    /// be the cause of a store-buffer overflow.
    pub fn cache_write(&mut self, core: usize, addr: u64, skip_store_buffer: bool) -> AccessOutcome {
        let (cycles, det_cycles, overflowed) = match self.cores[core].search_private(addr) {
            PrivateHit::L1 => {
                let state = self.cores[core].l1_state(addr);
                if state == Some(MesiState::Shared) {
                    self.invalidate_peers(core, addr);
                }
                self.cores[core].with_l1_line(addr, |line| {
                    line.set_state(MesiState::Modified);
                    line.dirty = !skip_store_buffer;
                });
                self.counters.inc(self.per_core_counters[core].write_hits);
                (latency::L1, latency::L1, self.take_overflow(core))
            }
            PrivateHit::L2 => {
                let loc = self.l2_lookup(core, addr);
                let dirty = loc.is_some_and(|(set, way)| self.cores[core].l2_is_dirty(set, way));
                if let Some((set, way)) = loc {
                    let victim = self.cores[core].promote_l2_to_l1(addr, set, way);
                    self.charge_eviction(core, addr, victim);
                }
                self.invalidate_peers(core, addr);
                self.cores[core].with_l1_line(addr, |line| {
                    line.set_state(MesiState::Modified);
                    line.dirty = !skip_store_buffer;
                });
                self.counters.inc(self.per_core_counters[core].write_hits);
                let det = if dirty { latency::L2 } else { latency::L1 };
                (latency::L2, det, self.take_overflow(core))
            }
            PrivateHit::Miss => {
                self.counters.inc(self.per_core_counters[core].write_misses);
                self.invalidate_peers(core, addr);
                let cycles = self.fetch_latency_ignoring_state(core, addr);
                let victim = self.cores[core].install_fetched(addr, MesiState::Modified);
                self.cores[core].with_l1_line(addr, |line| line.dirty = !skip_store_buffer);
                self.charge_eviction(core, addr, victim);
                (cycles, latency::L1, self.take_overflow(core))
            }
        };
        self.account_access(core, cycles, det_cycles);
        AccessOutcome {
            cycles,
            store_buffer_overflowed: overflowed,
        }
    }

    /// Reads the sticky store-buffer-overflow flag and, if set, forces
    /// `core`'s quantum to end at the current boundary. The flag itself
    /// stays set until a quantum round drains it (see
    /// [`crate::smp::SmpCache::drain_store_buffer`]).
    fn take_overflow(&mut self, core: usize) -> bool {
        let overflowed = self.cores[core].store_buffer_overflowed;
        if overflowed {
            self.per_core[core].stalled_at_boundary = true;
            self.commit_this_round = true;
            self.counters.inc(self.global_counters.total_quanta);
        }
        overflowed
    }

    /// Accumulates `cycles` into this round's real memory-hierarchy time
    /// for `core`, and `det_cycles` into its deterministic counterpart.
    /// Under `smart_quantum_building` the quantum work budget accrues from
    /// `det_cycles`, never the real `cycles` — the latter varies with peer
    /// and memory contention timing, which would make smart quantum
    /// building non-deterministic. The budget-overflow check itself only
    /// happens at a basic-block boundary, in both accounting modes.
    fn account_access(&mut self, core: usize, cycles: u64, det_cycles: u64) {
        let state = &mut self.per_core[core];
        state.time_in_memory_hierarchy += cycles;
        state.det_time_in_memory_hierarchy += det_cycles;
        if self.smart_quantum_building {
            state.work_count += det_cycles;
        }
    }

    fn l2_lookup(&self, core: usize, addr: u64) -> Option<(usize, usize)> {
        self.cores[core].l2_lookup(addr)
    }

    /// Checks the shared L3 for `addr`, removing it on a hit — a hit above
    /// L1 physically removes the line from that level, since the caller is
    /// about to reinstall it into the requester's private hierarchy.
    fn l3_hit(&mut self, addr: u64) -> bool {
        let Some(l3) = &mut self.l3 else {
            return false;
        };
        let Some((set, way)) = l3.lookup(addr) else {
            return false;
        };
        let _ = l3.remove(set, way);
        true
    }

    /// Visits every peer of `core` and invalidates `addr` if present,
    /// unconditionally — a write always demands sole ownership regardless
    /// of the peer's current state.
    fn invalidate_peers(&mut self, core: usize, addr: u64) {
        let (before, at_and_after) = self.cores.split_at_mut(core);
        let (_current, after) = at_and_after
            .split_first_mut()
            .expect("core index is in range");
        for peer in before.iter_mut().chain(after.iter_mut()) {
            let _ = peer.invalidate_l1(addr);
        }
    }

    /// Searches every peer for `addr`, called only once the caller has
    /// already ruled out an L3 hit. If any peer holds it Modified or
    /// Exclusive, that peer demotes to Shared and supplies the data at
    /// remote latency. Otherwise, if any peer holds it Shared, data comes
    /// from that peer (also remote latency). Otherwise this is a true miss
    /// to memory, and the requester becomes the sole Exclusive owner.
    fn snoop_for_read(&mut self, core: usize, addr: u64) -> (MesiState, u64) {
        let (before, at_and_after) = self.cores.split_at_mut(core);
        let (_current, after) = at_and_after
            .split_first_mut()
            .expect("core index is in range");

        let mut any_shared = false;
        for peer in before.iter_mut().chain(after.iter_mut()) {
            match peer.l1_state(addr) {
                Some(MesiState::Modified) | Some(MesiState::Exclusive) => {
                    peer.with_l1_line(addr, |line| line.set_state(MesiState::Shared));
                    return (MesiState::Shared, latency::REMOTE);
                }
                Some(MesiState::Shared) => any_shared = true,
                _ => {}
            }
        }
        if any_shared {
            return (MesiState::Shared, latency::REMOTE);
        }
        (MesiState::Exclusive, latency::MEMORY - 1)
    }

    /// Latency for a write miss that already invalidated every peer: the
    /// data still has to come from the fastest place that had it (L3 or
    /// memory), since the MESI state itself is forced to Modified
    /// regardless of where it came from.
    fn fetch_latency_ignoring_state(&mut self, _core: usize, addr: u64) -> u64 {
        if self.l3_hit(addr) {
            return latency::L3;
        }
        latency::MEMORY - 1
    }

    /// Records a basic block of `insn_count` retired instructions. Always
    /// tallies the round's raw instruction count; under
    /// `smart_quantum_building` the quantum work budget instead accrues
    /// from per-access deterministic cycle deltas (already applied in
    /// [`Self::account_access`]), so only the non-smart mode adds
    /// `insn_count` to that budget here. Either way, the budget is checked
    /// only at this basic-block boundary.
    pub fn basic_block(&mut self, core: usize, insn_count: u64) {
        self.per_core[core].insns_this_round += insn_count;
        if !self.smart_quantum_building {
            self.per_core[core].work_count += insn_count;
        }
        if self.per_core[core].work_count >= self.quantum_size {
            self.per_core[core].stalled_at_boundary = true;
            self.commit_this_round = true;
            self.counters.inc(self.global_counters.total_quanta);
        }
    }

    /// Records a synchronization event for the Det-HB same-round rule and
    /// reports whether it forces `core`'s quantum to end now.
    pub fn sync_op(&mut self, core: usize, is_source: bool, sync_object: u64) -> bool {
        if is_source {
            let _ = self.sourced_this_round.insert(sync_object);
            return false;
        }
        let forces_boundary = match self.policy {
            ExecutionPolicy::NonDet => false,
            ExecutionPolicy::DetTso => true,
            ExecutionPolicy::DetHb => self.sourced_this_round.contains(&sync_object),
        };
        if forces_boundary {
            self.per_core[core].stalled_at_boundary = true;
            self.commit_this_round = true;
            self.counters.inc(self.global_counters.total_quanta);
            self.counters.inc(self.global_counters.sync_induced_round_boundaries);
        }
        forces_boundary
    }

    /// Marks `core` as blocked in a kernel operation; blocked cores count
    /// as accounted-for in round completion until unblocked.
    pub fn block(&mut self, core: usize) {
        self.per_core[core].blocked = true;
    }

    /// Marks `core` as runnable again.
    pub fn unblock(&mut self, core: usize) {
        self.per_core[core].blocked = false;
    }

    /// Sets the number of distinct application threads still running.
    /// Thread-to-core mapping is many-to-one (`cpu(tid) = tid mod cores`),
    /// so this is tracked globally rather than per core; the dispatcher
    /// calls this as `ThreadStart`/`ThreadFinish` events change the live
    /// thread set. Bumps the `MaxLiveThreads` high-water mark if this raises
    /// it.
    pub fn set_live_threads(&mut self, live_threads: u32) {
        self.live_threads = live_threads;
        if live_threads > self.max_live_threads_seen {
            self.max_live_threads_seen = live_threads;
            self.counters.set(self.global_counters.max_live_threads, u64::from(live_threads));
        }
    }

    /// Whether `core` has already reached a quantum boundary this round —
    /// the dispatcher must hold further events for it in its per-core FIFO
    /// rather than applying them.
    #[must_use]
    pub fn core_stalled(&self, core: usize) -> bool {
        self.per_core[core].stalled_at_boundary
    }

    /// Increments the causality-delay counter: called once per event the
    /// dispatcher requeues because its causal predecessor has not yet
    /// applied.
    pub fn record_causality_delay(&mut self) {
        self.counters.inc(self.global_counters.causality_delay);
    }

    /// Records a heap allocation of `bytes` for stats only.
    pub fn record_alloc(&mut self, bytes: u64) {
        self.counters.add(self.global_counters.alloc_bytes, bytes);
    }

    /// Records a heap deallocation of `bytes` for stats only.
    pub fn record_free(&mut self, bytes: u64) {
        self.counters.add(self.global_counters.free_bytes, bytes);
    }

    /// Records entry into the profiled region of interest, for stats only.
    pub fn record_roi_start(&mut self) {
        self.counters.inc(self.global_counters.roi_starts);
    }

    /// Records exit from the profiled region of interest, for stats only.
    pub fn record_roi_finish(&mut self) {
        self.counters.inc(self.global_counters.roi_finishes);
    }

    /// Marks `core` as waiting for a life-lock causal predecessor to
    /// arrive; the dispatcher consults this before delivering the next
    /// event for this core.
    pub fn wait_for_causality(&mut self, core: usize) {
        self.per_core[core].waiting_for_causality = true;
    }

    /// Clears `core`'s causal wait once its predecessor has been applied.
    pub fn satisfied_causality(&mut self, core: usize) {
        self.per_core[core].waiting_for_causality = false;
    }

    /// Whether `core` is currently blocked on a causal predecessor.
    #[must_use]
    pub fn is_waiting_for_causality(&self, core: usize) -> bool {
        self.per_core[core].waiting_for_causality
    }

    /// Whether the current round is done: `count(stalled-at-boundary ∨
    /// blocked ∨ waiting-for-causality) >= min(cores, live-threads)`.
    #[must_use]
    pub fn round_complete(&self) -> bool {
        let accounted_for = self.per_core.iter().filter(|c| c.accounted_for()).count();
        let threshold = self.live_threads.min(self.cores.len() as u32);
        accounted_for as u32 >= threshold
    }

    /// Ends the current quantum round: computes runtime/imbalance,
    /// drains every core's store buffer, resets quantum bookkeeping, and
    /// clears the Det-HB same-round source set. `forced` records whether
    /// this round closed via the deadlock breaker.
    pub fn finish_quantum_round(&mut self, forced: bool) {
        let (max_runtime, min_runtime) = self
            .per_core
            .iter()
            .map(CoreState::runtime)
            .fold((0u64, u64::MAX), |(max, min), r| (max.max(r), min.min(r)));
        let min_runtime = if self.per_core.is_empty() { 0 } else { min_runtime };

        self.counters.add(self.global_counters.runtime, max_runtime);
        self.counters
            .add(self.global_counters.total_quantum_imbalance, max_runtime.saturating_sub(min_runtime));
        self.counters.inc(self.global_counters.quantum_rounds);
        if self.commit_this_round {
            self.counters.inc(self.global_counters.quantum_round_commits);
        }

        for (i, core) in self.cores.iter_mut().enumerate() {
            let _ = core.drain_store_buffer();
            let state = &mut self.per_core[i];
            state.work_count = 0;
            state.insns_this_round = 0;
            state.time_in_memory_hierarchy = 0;
            state.det_time_in_memory_hierarchy = 0;
            state.stalled_at_boundary = false;
            self.counters.inc(self.per_core_counters[i].quanta_completed);
            if forced {
                self.counters.inc(self.per_core_counters[i].forced_commits);
            }
        }
        self.sourced_this_round.clear();
        self.commit_this_round = false;
    }

    /// Writes every registered counter to `writer` in the external stats
    /// format, delegating the prefix/suffix framing to the caller.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error encountered while writing.
    pub fn dump_stats(&self, writer: &mut impl std::io::Write, prefix: &str, suffix: &str) -> std::io::Result<()> {
        self.counters.dump(writer, prefix, suffix)
    }
}

/// Distinguishes a thread id from the sentinel meaning "not yet sourced",
/// kept here so callers driving [`Orchestrator::sync_op`] from raw event
/// fields don't need to import [`crate::event`] just for this constant.
#[must_use]
pub fn has_prior_source(hb_source_thread: u16) -> bool {
    hb_source_thread != INVALID_TID
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheGeometry;

    fn config(cores: u32, policy: ExecutionPolicy) -> Config {
        Config {
            cores,
            block_size: 4,
            l1: CacheGeometry { size_bytes: 16, ways: 2 },
            l2: None,
            l3: None,
            policy,
            quantum_size: 4,
            smart_quantum_building: false,
            ignore_stack: false,
            stats_file: "out.py".to_string(),
            tags: crate::config::Tags::default(),
        }
    }

    #[test]
    fn read_miss_then_hit() {
        let mut orch = Orchestrator::new(&config(2, ExecutionPolicy::NonDet));
        let miss = orch.cache_read(0, 0);
        assert_eq!(miss.cycles, latency::MEMORY - 1);
        let hit = orch.cache_read(0, 0);
        assert_eq!(hit.cycles, latency::L1);
    }

    #[test]
    fn write_miss_invalidates_peer_copy() {
        let mut orch = Orchestrator::new(&config(2, ExecutionPolicy::NonDet));
        let _ = orch.cache_read(0, 0); // core 0 becomes Exclusive owner
        let _ = orch.cache_write(1, 0, false); // core 1 writes, must invalidate core 0's copy
        assert_eq!(orch.cores[0].search_private(0), PrivateHit::Miss);
        assert_eq!(orch.cores[1].l1_state(0), Some(MesiState::Modified));
    }

    #[test]
    fn det_tso_sink_forces_boundary() {
        let mut orch = Orchestrator::new(&config(1, ExecutionPolicy::DetTso));
        assert!(orch.sync_op(0, false, 7));
        assert!(orch.round_complete());
    }

    #[test]
    fn det_hb_sink_without_same_round_source_does_not_force_boundary() {
        let mut orch = Orchestrator::new(&config(1, ExecutionPolicy::DetHb));
        assert!(!orch.sync_op(0, false, 7));
        assert!(!orch.round_complete());
    }

    #[test]
    fn det_hb_sink_with_same_round_source_forces_boundary() {
        let mut orch = Orchestrator::new(&config(1, ExecutionPolicy::DetHb));
        let _ = orch.sync_op(0, true, 7);
        assert!(orch.sync_op(0, false, 7));
    }

    #[test]
    fn basic_block_reaching_quantum_size_marks_boundary() {
        let mut orch = Orchestrator::new(&config(1, ExecutionPolicy::NonDet));
        orch.basic_block(0, 2);
        assert!(!orch.round_complete());
        orch.basic_block(0, 2);
        assert!(orch.round_complete());
    }

    #[test]
    fn blocked_core_excluded_from_round_completion() {
        let mut orch = Orchestrator::new(&config(2, ExecutionPolicy::NonDet));
        orch.block(1);
        orch.basic_block(0, 10);
        assert!(orch.round_complete(), "core 1 is blocked, only core 0's progress matters");
    }

    #[test]
    fn finish_quantum_round_resets_bookkeeping() {
        let mut orch = Orchestrator::new(&config(1, ExecutionPolicy::NonDet));
        orch.basic_block(0, 10);
        assert!(orch.round_complete());
        orch.finish_quantum_round(false);
        assert!(!orch.round_complete());
    }
}

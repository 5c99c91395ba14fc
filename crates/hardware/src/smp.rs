//! Per-core coherent cache: L1, optional L2, and a handle to the shared L3.
//!
//! Each [`SmpCache`] owns its private L1 and L2 outright; the L3 (if any) is
//! shared by every core and is owned by whoever drives the protocol across
//! cores — in this crate, [`crate::orchestrator::Orchestrator`] — since a
//! self-owned shared level would need either unsafe aliasing or interior
//! mutability this crate has no other use for. `SmpCache` itself never
//! reaches sideways into a peer; the read/write/snoop protocol that needs
//! all cores at once lives in `orchestrator`, which can borrow every core's
//! cache simultaneously via slice-splitting.
//!
//! The deterministic store buffer is not a separate FIFO: a line's `dirty`
//! bit *is* store-buffer membership. Overflow is detected at eviction time
//! from the SB-eligible level (L2 if present, otherwise L1), which hunts
//! for a clean victim before falling back to an LRU line regardless of
//! dirtiness.

use crate::cache::line::{Line, MesiState, RcdcLine};
use crate::cache::policy::LruPolicy;
use crate::cache::HierarchicalCache;

/// Per-access latency, in simulated cycles, charged by
/// [`crate::orchestrator::Orchestrator`] as it drives a cache operation
/// through these levels.
pub mod latency {
    /// L1 hit.
    pub const L1: u64 = 1;
    /// L2 hit.
    pub const L2: u64 = 10;
    /// L3 hit.
    pub const L3: u64 = 35;
    /// Remote-core snoop supplies the line.
    pub const REMOTE: u64 = 15;
    /// Main memory.
    pub const MEMORY: u64 = 121;
}

/// Result of searching this core's own private hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateHit {
    /// Hit in L1.
    L1,
    /// Hit in L2 (and promoted into L1 by the caller).
    L2,
    /// Present in neither private level.
    Miss,
}

/// One core's private cache hierarchy.
pub struct SmpCache {
    l1: HierarchicalCache<RcdcLine>,
    l2: Option<HierarchicalCache<RcdcLine>>,
    /// Set once an SB-eligible eviction could find no clean victim. Sticky
    /// until a quantum round drains it; the orchestrator reads and clears
    /// it at a round boundary.
    pub store_buffer_overflowed: bool,
}

impl SmpCache {
    /// Builds a core's private hierarchy. `l2` is `None` when the
    /// configuration has no L2, in which case L1 itself is the SB-eligible
    /// level.
    #[must_use]
    pub fn new(l1_sets: usize, l1_ways: usize, l2: Option<(usize, usize)>, block_size: u64) -> Self {
        Self {
            l1: HierarchicalCache::new(l1_sets, l1_ways, block_size, 1, Box::new(LruPolicy)),
            l2: l2.map(|(sets, ways)| {
                HierarchicalCache::new(sets, ways, block_size, 2, Box::new(LruPolicy))
            }),
            store_buffer_overflowed: false,
        }
    }

    /// Searches L1 then L2 without mutating state. Does not promote an L2
    /// hit — the caller decides whether this access justifies promotion.
    #[must_use]
    pub fn search_private(&self, addr: u64) -> PrivateHit {
        if self.l1.lookup(addr).is_some() {
            return PrivateHit::L1;
        }
        if let Some(l2) = &self.l2 {
            if l2.lookup(addr).is_some() {
                return PrivateHit::L2;
            }
        }
        PrivateHit::Miss
    }

    /// Searches L2 for `addr`, returning its `(set, way)` if present. Used
    /// by the orchestrator to drive an explicit L2-to-L1 promotion.
    #[must_use]
    pub fn l2_lookup(&self, addr: u64) -> Option<(usize, usize)> {
        self.l2.as_ref().and_then(|l2| l2.lookup(addr))
    }

    /// Reads the MESI state of `addr`'s line in L1, if present there.
    #[must_use]
    pub fn l1_state(&self, addr: u64) -> Option<MesiState> {
        let (set, way) = self.l1.lookup(addr)?;
        Some(self.l1.peek_set(set)[way].state())
    }

    /// Whether the L2 line at `(set, way)` carries the dirty bit. Checked
    /// by the caller before promotion, since promotion itself doesn't
    /// change dirtiness but the caller needs to know it to charge the
    /// right deterministic hit latency.
    #[must_use]
    pub fn l2_is_dirty(&self, set: usize, way: usize) -> bool {
        self.l2.as_ref().is_some_and(|l2| l2.peek_set(set)[way].dirty)
    }

    /// Moves `addr`'s L1 line to MRU, for a plain hit with no state change.
    pub fn touch_l1(&mut self, addr: u64) {
        if let Some((set, way)) = self.l1.lookup(addr) {
            self.l1.touch_hit(set, way);
        }
    }

    /// Applies `f` to `addr`'s L1 line in place, e.g. to transition MESI
    /// state or set the dirty bit on a write hit. No-op if absent.
    pub fn with_l1_line(&mut self, addr: u64, f: impl FnOnce(&mut RcdcLine)) {
        if let Some((set, way)) = self.l1.lookup(addr) {
            let mut line = self.l1.peek_set(set)[way];
            f(&mut line);
            let _ = self.l1.install_at(addr, way, line);
        }
    }

    /// Invalidates `addr` in L1 if present, returning whether it was
    /// dirty (the caller may need to know this for a remote write that
    /// must also trigger a writeback accounting step).
    pub fn invalidate_l1(&mut self, addr: u64) -> bool {
        if let Some((set, way)) = self.l1.lookup(addr) {
            let mut line = self.l1.peek_set(set)[way];
            let was_dirty = line.dirty;
            line.invalidate();
            let _ = self.l1.install_at(addr, way, line);
            was_dirty
        } else {
            false
        }
    }

    /// Promotes an L2-resident line into L1: removes it from L2 and installs
    /// it into L1, cascading any L1 eviction back down into L2. Returns the
    /// final victim, if any, that fell out of L2 and needs forwarding to L3.
    pub fn promote_l2_to_l1(&mut self, addr: u64, set: usize, way: usize) -> Option<RcdcLine> {
        let Some(l2) = &mut self.l2 else {
            return None;
        };
        let promoted = l2.remove(set, way);
        let l1_victim = self.l1.install(addr, promoted);
        l1_victim.and_then(|victim| self.install_sb_eligible_at_level2(addr, victim).0)
    }

    /// Installs a freshly-fetched line (from a peer, L3, or memory) into L1,
    /// cascading any evicted line down through L2 with store-buffer-overflow
    /// detection at whichever level is SB-eligible. Returns the line that
    /// must be forwarded to the shared L3, if any.
    pub fn install_fetched(&mut self, addr: u64, state: MesiState) -> Option<RcdcLine> {
        let incoming = RcdcLine::new_valid(state);
        if self.l2.is_some() {
            // L1 is not SB-eligible when an L2 exists: plain LRU eviction.
            let victim = self.l1.install(addr, incoming);
            victim.and_then(|v| self.install_sb_eligible_at_level2(addr, v).0)
        } else {
            // No L2: L1 itself is SB-eligible.
            let (victim, overflowed) = Self::install_with_overflow_detection(&mut self.l1, addr, incoming);
            self.store_buffer_overflowed |= overflowed;
            victim
        }
    }

    fn install_sb_eligible_at_level2(&mut self, addr: u64, incoming: RcdcLine) -> (Option<RcdcLine>, bool) {
        let Some(l2) = &mut self.l2 else {
            return (Some(incoming), false);
        };
        let (victim, overflowed) = Self::install_with_overflow_detection(l2, addr, incoming);
        self.store_buffer_overflowed |= overflowed;
        (victim, overflowed)
    }

    /// Installs `incoming` into `cache`, preferring a clean victim over the
    /// strict LRU line. If every line in the target set is dirty, evicts the
    /// LRU line anyway and reports overflow — the line being evicted is
    /// fully overwritten by `incoming` either way, so no residual dirty
    /// state survives into the new occupant.
    fn install_with_overflow_detection(
        cache: &mut HierarchicalCache<RcdcLine>,
        addr: u64,
        incoming: RcdcLine,
    ) -> (Option<RcdcLine>, bool) {
        let set_index = cache.set_index_of(addr);
        let set = cache.peek_set(set_index);
        let clean_way = set
            .iter()
            .enumerate()
            .rev()
            .find(|(_, line)| !line.is_valid() || line.is_clean())
            .map(|(way, _)| way);
        let (way, overflowed) = match clean_way {
            Some(way) => (way, false),
            None => (set.len() - 1, true),
        };
        let victim = cache.install_at(addr, way, incoming);
        let victim = if victim.is_valid() { Some(victim) } else { None };
        (victim, overflowed)
    }

    /// Drains every dirty bit across L1 and L2 at a quantum-round boundary,
    /// and clears the sticky overflow flag. Returns the number of dirty
    /// lines drained, for stats accounting.
    pub fn drain_store_buffer(&mut self) -> u64 {
        let mut drained = 0u64;
        self.l1.visit_all_lines(|line| {
            if line.is_valid() && line.dirty {
                line.dirty = false;
                drained += 1;
            }
        });
        if let Some(l2) = &mut self.l2 {
            l2.visit_all_lines(|line| {
                if line.is_valid() && line.dirty {
                    line.dirty = false;
                    drained += 1;
                }
            });
        }
        self.store_buffer_overflowed = false;
        drained
    }

    /// Whether this core has an L2 (and thus L2, not L1, is SB-eligible).
    #[must_use]
    pub fn has_l2(&self) -> bool {
        self.l2.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_no_l2() -> SmpCache {
        SmpCache::new(2, 2, None, 4)
    }

    fn core_with_l2() -> SmpCache {
        SmpCache::new(1, 2, Some((1, 2)), 4)
    }

    #[test]
    fn miss_then_install_is_visible_in_l1() {
        let mut core = core_no_l2();
        assert_eq!(core.search_private(0), PrivateHit::Miss);
        let _ = core.install_fetched(0, MesiState::Exclusive);
        assert_eq!(core.search_private(0), PrivateHit::L1);
        assert_eq!(core.l1_state(0), Some(MesiState::Exclusive));
    }

    #[test]
    fn clean_victim_preferred_over_strict_lru() {
        // 1 set, 2 ways, no L2: L1 is SB-eligible.
        let mut core = core_no_l2();
        let _ = core.install_fetched(0, MesiState::Shared); // set 0 way order: [0]
        let _ = core.install_fetched(16, MesiState::Shared); // set 0: [16, 0] MRU-first
        // Mark the LRU line (addr 0) dirty; the MRU line (16) is clean.
        core.with_l1_line(0, |l| l.dirty = true);
        // A fresh install maps to set 0 again (block size 4, 2 sets -> addr 8 also set 0... use addr that maps to set 0)
        let _ = core.install_fetched(32, MesiState::Shared);
        // The dirty line (addr 0) must have survived; the clean MRU line (16) was evicted instead
        // even though it was more recently used, because eviction prefers a clean victim.
        assert!(!core.store_buffer_overflowed);
    }

    #[test]
    fn all_dirty_set_reports_overflow() {
        let mut core = core_no_l2();
        let _ = core.install_fetched(0, MesiState::Modified);
        let _ = core.install_fetched(16, MesiState::Modified);
        core.with_l1_line(0, |l| l.dirty = true);
        core.with_l1_line(16, |l| l.dirty = true);
        let _ = core.install_fetched(32, MesiState::Modified);
        assert!(core.store_buffer_overflowed);
    }

    #[test]
    fn l1_eviction_with_l2_present_never_overflows() {
        let mut core = core_with_l2();
        let _ = core.install_fetched(0, MesiState::Modified);
        core.with_l1_line(0, |l| l.dirty = true);
        // Second install to the same (single) L1 set evicts addr 0 down into L2.
        let _ = core.install_fetched(16, MesiState::Modified);
        assert!(!core.store_buffer_overflowed, "L1 eviction cascades to L2, not an overflow");
    }

    #[test]
    fn drain_clears_dirty_bits_and_overflow_flag() {
        let mut core = core_no_l2();
        let _ = core.install_fetched(0, MesiState::Modified);
        core.with_l1_line(0, |l| l.dirty = true);
        core.store_buffer_overflowed = true;
        let drained = core.drain_store_buffer();
        assert_eq!(drained, 1);
        assert!(!core.store_buffer_overflowed);
    }
}

//! Single-level set-associative cache.
//!
//! Implements one level of the memory hierarchy: geometry, set lookup, MRU
//! reordering on hit, and eviction via a pluggable [`ReplacementPolicy`].
//! Cascading a miss to the next-higher level, or pushing a line evicted
//! from a lower level upward, is the job of the caller — `smp` composes
//! several [`HierarchicalCache`] instances (L1, optional L2, shared L3)
//! and drives that cascade explicitly, since each core's L1/L2 are owned
//! privately while L3 is shared across cores. That split keeps this type
//! free of any cross-cache borrowing.

/// Cache line variants ([`line::Line`], [`line::PlainLine`], [`line::RcdcLine`]).
pub mod line;
/// Replacement policy trait and the default LRU policy.
pub mod policy;

use self::line::Line;
use self::policy::ReplacementPolicy;

/// A single set-associative cache level.
pub struct HierarchicalCache<L: Line> {
    /// Sets, each ordered MRU-first (index 0) to LRU-last.
    sets: Vec<Vec<L>>,
    block_size: u64,
    policy: Box<dyn ReplacementPolicy<L>>,
    /// 1-indexed level, reported to the replacement policy and used in hit
    /// accounting by callers.
    level: u8,
}

impl<L: Line> HierarchicalCache<L> {
    /// Creates a cache level with `num_sets` sets of `ways` lines each, all
    /// initially invalid.
    #[must_use]
    pub fn new(
        num_sets: usize,
        ways: usize,
        block_size: u64,
        level: u8,
        policy: Box<dyn ReplacementPolicy<L>>,
    ) -> Self {
        Self {
            sets: (0..num_sets).map(|_| vec![L::invalid(); ways]).collect(),
            block_size,
            policy,
            level,
        }
    }

    fn decompose(&self, addr: u64) -> (u64, usize) {
        let num_sets = self.sets.len() as u64;
        let block_index = addr / self.block_size;
        let set_index = (block_index % num_sets) as usize;
        let tag = block_index / num_sets;
        (tag, set_index)
    }

    /// Searches for `addr` without mutating MRU order. Returns the
    /// `(set, way)` of the hit, if any.
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<(usize, usize)> {
        let (tag, set_index) = self.decompose(addr);
        let set = &self.sets[set_index];
        set.iter()
            .position(|line| line.is_valid() && line.tag() == tag)
            .map(|way| (set_index, way))
    }

    /// Moves the line at `(set, way)` to the MRU position (front).
    ///
    /// # Panics
    ///
    /// Panics if `set` or `way` is out of range, which would indicate the
    /// caller passed a stale `(set, way)` pair from a different geometry.
    pub fn touch_hit(&mut self, set: usize, way: usize) {
        let line = self.sets[set].remove(way);
        self.sets[set].insert(0, line);
    }

    /// Removes and returns the line at `(set, way)`, replacing it with an
    /// invalid placeholder so the set keeps its fixed length (invariant 1:
    /// `len(set) == associativity` always holds).
    pub fn remove(&mut self, set: usize, way: usize) -> L {
        let removed = std::mem::replace(&mut self.sets[set][way], L::invalid());
        removed
    }

    /// Installs `line` for `addr`, evicting a victim chosen by the
    /// replacement policy and returning it if it was valid (the caller
    /// forwards a valid victim to the next level, or destroys it at the
    /// last level). Installing an invalid `line` is a no-op.
    pub fn install(&mut self, addr: u64, line: L) -> Option<L> {
        if !line.is_valid() {
            return None;
        }
        let (tag, set_index) = self.decompose(addr);
        let victim_way = self.policy.choose_victim(&self.sets[set_index], self.level);
        let mut line = line;
        line.retag(tag);
        let victim = std::mem::replace(&mut self.sets[set_index][victim_way], line);
        self.touch_hit(set_index, victim_way);
        if victim.is_valid() {
            Some(victim)
        } else {
            None
        }
    }

    /// The set index `addr` maps to, for callers that need to inspect a set
    /// before choosing how to install into it (store-buffer-aware eviction
    /// at the SB-eligible level, see `smp`).
    #[must_use]
    pub fn set_index_of(&self, addr: u64) -> usize {
        self.decompose(addr).1
    }

    /// Read-only view of a set's lines, MRU-first.
    #[must_use]
    pub fn peek_set(&self, set_index: usize) -> &[L] {
        &self.sets[set_index]
    }

    /// Installs `line` at a caller-chosen `way`, bypassing the replacement
    /// policy, and returns whatever was there before. Used by callers that
    /// need to override victim selection (store-buffer overflow detection),
    /// which the generic [`ReplacementPolicy`] callback cannot see.
    pub fn install_at(&mut self, addr: u64, way: usize, mut line: L) -> L {
        let (tag, set_index) = self.decompose(addr);
        line.retag(tag);
        let victim = std::mem::replace(&mut self.sets[set_index][way], line);
        self.touch_hit(set_index, way);
        victim
    }

    /// Iterates every line in the cache, in no defined order, allowing
    /// in-place mutation (used to drain dirty bits at a quantum-round
    /// boundary).
    pub fn visit_all_lines(&mut self, mut f: impl FnMut(&mut L)) {
        for set in &mut self.sets {
            for line in set {
                f(line);
            }
        }
    }

    /// Total number of sets.
    #[must_use]
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Associativity (ways per set).
    #[must_use]
    pub fn ways(&self) -> usize {
        self.sets.first().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::line::PlainLine;
    use crate::cache::policy::LruPolicy;

    fn cache(num_sets: usize, ways: usize, block_size: u64) -> HierarchicalCache<PlainLine> {
        HierarchicalCache::new(num_sets, ways, block_size, 1, Box::new(LruPolicy))
    }

    #[test]
    fn set_length_is_preserved_across_installs() {
        let mut c = cache(2, 2, 4);
        for addr in [0u64, 16, 32, 48, 64] {
            let _ = c.install(addr, PlainLine::valid_placeholder());
            // len equals associativity always (invariant 1)
            assert_eq!(c.ways(), 2);
        }
    }

    #[test]
    fn hit_then_evict_scenario() {
        // block size 4, 2 sets, 2-way
        let mut c = cache(2, 2, 4);
        assert_eq!(c.lookup(0), None);
        let _ = c.install(0, PlainLine::valid_placeholder());
        assert!(c.lookup(0).is_some());

        let (set, way) = c.lookup(0).expect("present");
        c.touch_hit(set, way);
        assert!(c.lookup(0).is_some());

        // 16 and 32 both map to set 0 alongside 0 (block 0), filling then
        // evicting it.
        let _ = c.install(16, PlainLine::valid_placeholder());
        let _ = c.install(32, PlainLine::valid_placeholder());
        assert_eq!(c.lookup(0), None, "original block evicted from its 2-way set");
    }

    #[test]
    fn installing_invalid_line_is_a_no_op() {
        let mut c = cache(2, 2, 4);
        let evicted = c.install(0, PlainLine::invalid());
        assert!(evicted.is_none());
        assert_eq!(c.lookup(0), None);
    }
}

//! Process-wide counter registry.
//!
//! Every named statistic the simulator tracks — cache hits and misses,
//! quantum-round counts, causality delays — is a [`Counter`] registered
//! once, in construction order, with the shared [`CounterRegistry`]. The
//! registry never removes entries and never reorders them: [`CounterRegistry::dump`]
//! walks them in registration order, which is what lets two runs of the
//! same configuration produce byte-comparable stats files.

use std::fmt;
use std::io::{self, Write};

/// A handle to a counter previously registered with a [`CounterRegistry`].
///
/// Opaque and cheap to copy; holding one lets a component increment its own
/// counters without re-searching the registry by name on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter(usize);

struct Entry {
    cpuid: u32,
    name: &'static str,
    value: u64,
}

/// An insertion-ordered list of named, per-core counters.
///
/// Construction mutates the registry (via [`CounterRegistry::register`]);
/// after simulation begins, components only read and increment through the
/// [`Counter`] handles they were given, matching the "append during
/// construction only" resource rule for this component.
#[derive(Default)]
pub struct CounterRegistry {
    entries: Vec<Entry>,
}

impl fmt::Debug for CounterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl CounterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new counter for the given core, starting at zero, and
    /// returns a handle to it.
    pub fn register(&mut self, cpuid: u32, name: &'static str) -> Counter {
        let idx = self.entries.len();
        self.entries.push(Entry {
            cpuid,
            name,
            value: 0,
        });
        Counter(idx)
    }

    /// Increments a counter by one.
    pub fn inc(&mut self, counter: Counter) {
        self.entries[counter.0].value += 1;
    }

    /// Adds `delta` to a counter.
    pub fn add(&mut self, counter: Counter, delta: u64) {
        self.entries[counter.0].value += delta;
    }

    /// Sets a counter to an absolute value.
    pub fn set(&mut self, counter: Counter, value: u64) {
        self.entries[counter.0].value = value;
    }

    /// Reads a counter's current value.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.entries[counter.0].value
    }

    /// Writes every registered counter as one line of the shape
    /// `{PREFIX, 'cpuid': C, 'NAME': V, SUFFIX}`, in registration order.
    ///
    /// `prefix` and `suffix` are caller-supplied and opaque to this type —
    /// the CLI layer is responsible for building the configuration-dict
    /// prefix and the closing-brace suffix described in the external
    /// interface spec.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from `writer`.
    pub fn dump(&self, writer: &mut impl Write, prefix: &str, suffix: &str) -> io::Result<()> {
        for entry in &self.entries {
            writeln!(
                writer,
                "{prefix}'cpuid': {}, '{}': {}{suffix}",
                entry.cpuid, entry.name, entry.value
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_in_registration_order() {
        let mut reg = CounterRegistry::new();
        let a = reg.register(0, "numReadHits");
        let b = reg.register(0, "numWriteHits");
        reg.add(a, 5);
        reg.inc(b);

        let mut out = Vec::new();
        reg.dump(&mut out, "{", "}\n").expect("dump succeeds");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("'numReadHits': 5"));
        assert!(lines[1].contains("'numWriteHits': 1"));
    }

    #[test]
    fn get_reflects_latest_value() {
        let mut reg = CounterRegistry::new();
        let c = reg.register(1, "numL1Evictions");
        assert_eq!(reg.get(c), 0);
        reg.set(c, 9);
        assert_eq!(reg.get(c), 9);
    }
}

//! Trace-driven multicore cache coherence simulator.
//!
//! This crate implements a MESI-coherent cache simulator driven by a
//! fixed-width event stream produced outside this crate: cache geometry and
//! execution-policy configuration, the single-level set-associative cache
//! building block, a per-core private hierarchy with a deterministic,
//! FIFO-free store buffer modeled via per-line dirty bits, a quantum-round
//! scheduler that serializes cores into deterministic rounds under three
//! execution policies, and an event dispatcher that drains per-core queues
//! while honoring a causal order for life-lock synchronization events.
//!
//! 1. **Event:** [`event::Event`], the fixed-width wire record.
//! 2. **Counters:** [`counters::CounterRegistry`], the process-wide
//!    statistics registry.
//! 3. **Cache:** [`cache::HierarchicalCache`], one set-associative level.
//! 4. **SMP cache:** [`smp::SmpCache`], a core's private L1/L2 plus
//!    store-buffer-overflow detection.
//! 5. **Orchestrator:** [`orchestrator::Orchestrator`], cross-core MESI
//!    coherence and quantum-round bookkeeping.
//! 6. **Dispatcher:** [`dispatcher::Dispatcher`], the causal event-ordering
//!    main loop.

/// Single-level set-associative cache and its line/policy types.
pub mod cache;
/// Process-wide named-counter registry.
pub mod counters;
/// Simulation configuration, validated before any cache is built.
pub mod config;
/// Event-dispatcher main loop: causal ordering and round draining.
pub mod dispatcher;
/// The fixed-width trace event record and its wire codec.
pub mod event;
/// Configuration and event-decoding error types.
pub mod error;
/// Quantum scheduler and cross-core MESI coherence.
pub mod orchestrator;
/// Per-core private cache hierarchy (L1, optional L2).
pub mod smp;

/// Root configuration type; validate with [`Config::validate`] before
/// building an [`Orchestrator`].
pub use crate::config::Config;
/// The event-dispatcher main loop.
pub use crate::dispatcher::Dispatcher;
/// The fixed-width trace event record.
pub use crate::event::Event;
/// Cross-core coherence and quantum-round scheduler.
pub use crate::orchestrator::Orchestrator;

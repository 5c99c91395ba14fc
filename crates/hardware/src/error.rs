//! Error types for configuration validation and event-stream decoding.
//!
//! Most anomalies the simulation core encounters are treated as programming
//! errors (see the module-level docs on `dispatcher`): a stalled core being
//! handed an event, or a replacement policy returning an out-of-range way,
//! are bugs in this crate's own bookkeeping and are asserted against rather
//! than reported through these types. The two error enums here cover the
//! boundary instead: malformed user configuration and malformed bytes on
//! the wire, both of which originate outside this crate.

use thiserror::Error;

/// Errors raised while validating a [`crate::config::Config`] or
/// [`crate::config::CacheGeometry`] before any cache is constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A cache dimension (size, associativity, or the shared block size)
    /// was not a power of two.
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Name of the offending field.
        field: &'static str,
        /// The value that failed the check.
        value: u64,
    },

    /// A cache's size was not an exact multiple of `block_size * ways`.
    #[error(
        "{level} size {size_bytes} is not a multiple of block_size ({block_size}) * ways ({ways})"
    )]
    GeometryMismatch {
        /// Which cache level failed (`"l1"`, `"l2"`, `"l3"`).
        level: &'static str,
        /// The configured cache size in bytes.
        size_bytes: u64,
        /// The configured block size in bytes.
        block_size: u64,
        /// The configured associativity.
        ways: u64,
    },

    /// None of `det-tso`, `det-hb`, or `nondet` was selected.
    #[error("exactly one of det-tso, det-hb, nondet must be selected, got none")]
    NoExecutionPolicy,

    /// More than one of `det-tso`, `det-hb`, `nondet` was selected.
    #[error("exactly one of det-tso, det-hb, nondet must be selected, got {count}")]
    MultipleExecutionPolicies {
        /// How many of the three mutually exclusive flags were set.
        count: u8,
    },

    /// `cores` was zero; at least one core is required to route events to.
    #[error("cores must be at least 1")]
    ZeroCores,
}

/// Errors raised while decoding a fixed-width [`crate::event::Event`] record
/// from a byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes were available than a full record requires; the stream
    /// ended (or stalled) mid-record.
    #[error("short read mid-record: got {got} of {want} bytes")]
    ShortRead {
        /// Bytes actually read before the stream ran dry.
        got: usize,
        /// Bytes a full record requires.
        want: usize,
    },

    /// The leading type tag did not match any known event type.
    #[error("unknown event type tag: {tag}")]
    UnknownEventType {
        /// The raw tag byte that failed to decode.
        tag: u8,
    },
}

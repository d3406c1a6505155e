//! Error types for the ESLR engine.
//!
//! Spec §7 names four error kinds, but only one of them — the fatal
//! invariant violation — is ever surfaced as a `Result::Err`. Decode
//! failures, authentication failures, and policy rejections are all
//! silently dropped and counted (see [`crate::metrics::DropCounters`]);
//! they never reach a caller as an error value.

use crate::types::InterfaceIndex;
use thiserror::Error;

/// Failures in [`crate::wire`] decoding (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet shorter than the 8-byte base header ({0} bytes)")]
    ShortHeader(usize),

    #[error("unknown command octet: {0}")]
    UnknownCommand(u8),

    #[error("record section length {len} is not a multiple of the record size {record_size}")]
    RecordLengthMismatch { len: usize, record_size: usize },

    #[error("truncated record at index {index}")]
    TruncatedRecord { index: usize },
}

/// Top-level error type for `eslr-core`.
///
/// Only [`EslrError::UnboundInterface`] corresponds to the spec §7 fatal
/// case; everything else reaching the engine from the wire or from a
/// peer is logged and dropped rather than returned.
#[derive(Debug, Error)]
pub enum EslrError {
    /// A packet was received on an interface the host adapter never
    /// registered an endpoint for. Spec §7 calls this case fatal
    /// ("abort; indicates a bug in the host adapter"); a library can't
    /// abort its host, so it surfaces the condition as an error and lets
    /// the caller decide (see DESIGN.md).
    #[error("received a packet on interface {0} with no bound endpoint")]
    UnboundInterface(InterfaceIndex),

    /// An invalid `RouterConfig` was supplied.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration validation failures (spec §6 option table).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "minTriggeredCooldown ({min:?}) must not exceed maxTriggeredCooldown ({max:?})"
    )]
    CooldownOrder {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("K1, K2, and K3 weights must be nonzero for a meaningful metric")]
    ZeroWeight,
}

pub type Result<T> = std::result::Result<T, EslrError>;

//! Error types shared across the crate.

use thiserror::Error;

use crate::tree::NodeId;

/// Misuse of the trace recorder.
///
/// These indicate a caller bug. The panicking entry points (`end_trace`,
/// `end_sub_trace`, ...) panic with this message; the `try_*` variants
/// return it instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("no trace is active on this thread")]
    NotTracing,

    #[error("end_sub_trace called without an active sub-trace")]
    NoSubTrace,

    #[error("end_trace called while a sub-trace is still open")]
    SubTraceOpen,
}

/// Errors returned by the tree and configuration APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("node {0:?} does not exist in this document")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("cannot insert {child:?} under {parent:?}: it would become its own ancestor")]
    InvalidHierarchy { parent: NodeId, child: NodeId },

    #[error("node {0:?} holds no text")]
    NotText(NodeId),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

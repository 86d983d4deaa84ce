//! Error types for NETCONF sessions and AP tag handling.
//!
//! This module defines all errors that can occur while talking to the
//! controller, parsing its replies, and reading or writing AP tag files.

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

use crate::session::RpcError;

/// Errors that can occur during NETCONF session handling and AP tag I/O.
#[derive(Error, Debug)]
pub enum NetconfError {
    /// The transport channel was disconnected while waiting for a message.
    ///
    /// This typically happens when the controller closes the subsystem
    /// unexpectedly during the hello exchange or while an RPC is pending.
    #[error("channel disconnect on wait reply")]
    ChannelDisconnectError,

    /// The session has been closed.
    #[error("session closed")]
    ConnectClosedError,

    /// No reply was received within the RPC timeout.
    #[error("rpc timeout: {0}")]
    RpcTimeout(String),

    /// The peer sent bytes that violate RFC 6242 framing.
    #[error("framing error: {0}")]
    Framing(String),

    /// The server hello was missing or malformed.
    #[error("hello error: {0}")]
    HelloError(String),

    /// The reply carried a message-id different from the request.
    #[error("message-id mismatch: sent {sent}, received {received}")]
    MessageIdMismatch { sent: String, received: String },

    /// The controller answered with an `rpc-error` of severity `error`.
    #[error("{0}")]
    Rpc(RpcError),

    /// Malformed XML in a reply or template.
    #[error("xml error: {0}")]
    Xml(String),

    /// Malformed CSV input or a CSV write failure.
    #[error("csv error: {0}")]
    Csv(String),

    /// A required element or column was missing.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Filesystem error while writing schemas or CSV exports.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("replay mismatch: {0}")]
    ReplayMismatchError(String),

    #[error("internal error: {0}")]
    InternalServerError(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Failed to send data through the channel.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<Vec<u8>>),
}

impl From<quick_xml::Error> for NetconfError {
    fn from(e: quick_xml::Error) -> Self {
        NetconfError::Xml(e.to_string())
    }
}

impl From<csv::Error> for NetconfError {
    fn from(e: csv::Error) -> Self {
        NetconfError::Csv(e.to_string())
    }
}

//! NETCONF session management and RPC execution.
//!
//! This module opens the `netconf` SSH subsystem on a controller, runs the
//! hello exchange, negotiates RFC 6242 framing and executes RPCs one at a
//! time. Sessions can be cached and reused through the global [`MANAGER`].
//!
//! # Main Components
//!
//! - [`NetconfManager`] - Session cache (singleton via `MANAGER`)
//! - [`NetconfSession`] - One NETCONF session with its framing state
//! - [`RpcReply`] - Parsed reply, including any `rpc-error` elements
//! - [`SessionRecorder`] - Optional JSONL transcript of the exchange

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use log::{debug, info, trace};
use moka::future::Cache;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config;
use crate::error::NetconfError;
use crate::templates;

pub use framing::{FrameDecoder, Framing};
pub use recording::{
    NormalizeOptions, ReplayContext, SessionEvent, SessionRecordEntry, SessionRecordLevel,
    SessionRecorder, SessionReplayer,
};
pub use reply::{RpcError, RpcReply, ServerHello};
pub use security::{ConnectionSecurityOptions, SecurityLevel};

/// Global singleton NETCONF session manager.
pub static MANAGER: Lazy<NetconfManager> = Lazy::new(NetconfManager::new);

/// A NETCONF session bound to one controller.
pub struct NetconfSession {
    /// `None` when the session runs over caller-supplied channels.
    client: Option<Client>,
    sender: Sender<Vec<u8>>,
    recv: Receiver<Vec<u8>>,
    decoder: FrameDecoder,
    device_addr: String,
    hello: ServerHello,
    next_message_id: u64,
    rpc_timeout: Duration,
    closed: bool,

    /// SHA-256 hash of the password, used for connection parameter comparison
    password_hash: [u8; 32],

    /// Effective security options used when the connection was established.
    security_options: ConnectionSecurityOptions,

    /// Optional session recorder bound to this session.
    recorder: Option<SessionRecorder>,
}

/// Configuration datastores addressable by `get-config` and `edit-config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Datastore {
    #[default]
    Running,
    Candidate,
    Startup,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

/// Connection parameters for one controller.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub user: String,
    pub addr: String,
    pub port: u16,
    pub password: String,
    pub rpc_timeout: Duration,
}

impl ConnectParams {
    pub fn new(user: impl Into<String>, addr: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            addr: addr.into(),
            port: config::DEFAULT_NETCONF_PORT,
            password: password.into(),
            rpc_timeout: config::DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn device_addr(&self) -> String {
        format!("{}@{}:{}", self.user, self.addr, self.port)
    }
}

/// NETCONF session cache.
///
/// Sessions are cached for 5 minutes of inactivity and shared behind an
/// async mutex, so RPCs on one session never interleave.
#[derive(Clone)]
pub struct NetconfManager {
    cache: Cache<String, Arc<Mutex<NetconfSession>>>,
}

mod client;
pub mod framing;
mod manager;
mod recording;
mod reply;
mod security;

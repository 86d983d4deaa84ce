//! # wlc-netconf - NETCONF client for Cisco 9800 wireless controllers
//!
//! `wlc-netconf` talks NETCONF over SSH to a Catalyst 9800 wireless LAN
//! controller. It reads server capabilities and YANG schemas, dumps the
//! running configuration, and reads or writes Access Point tag assignments
//! (policy-tag, site-tag, rf-tag) with CSV import and export.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wlc_netconf::aptag;
//! use wlc_netconf::session::{ConnectParams, ConnectionSecurityOptions, MANAGER};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = ConnectParams::new("netconf", "192.168.203.10", "changeme");
//!     let session = MANAGER
//!         .get_with_security(&params, ConnectionSecurityOptions::legacy_compatible())
//!         .await?;
//!
//!     let mut session = session.lock().await;
//!     let tags = aptag::fetch_ap_tags(&mut session).await?;
//!     let path = aptag::export_csv(&tags, Path::new("."))?;
//!     println!("exported {} AP(s) to {}", tags.len(), path.display());
//!
//!     session.close_session().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::NetconfManager`] - Caches NETCONF sessions per device
//! - [`session::NetconfSession`] - Hello exchange, framing and RPC execution
//! - [`aptag`] - AP tag records, reply parsing, CSV import/export
//! - [`schema`] - YANG module discovery and schema download
//! - [`templates`] - XML request templates
//! - [`error::NetconfError`] - Error type shared by all of the above

pub mod aptag;
pub mod config;
pub mod error;
pub mod schema;
pub mod session;
pub mod templates;

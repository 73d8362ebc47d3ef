//! # ms-02-fbts-ingest
//!
//! The FBTS side channel: a small binary protocol an external controller
//! uses to start sessions and hand authentication results to a simulated
//! mobile station over UDP.
//!
//! - [`codec`]: decode/encode of [`FbtsFrame`]
//! - [`ingest`]: the per-station receive thread ([`FbtsIngest`])
//! - [`uplink`]: replies to the controller ([`FbtsUplink`])
//!
//! Malformed datagrams never leave the receive thread; they are logged and
//! dropped.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod error;
pub mod ingest;
pub mod uplink;

pub use codec::{FbtsFrame, FrameTag, HEADER_LEN};
pub use error::{FrameError, IngestError, UplinkError};
pub use ingest::{FbtsIngest, IngestConfig, IngestTarget, DEFAULT_RECV_TIMEOUT};
pub use uplink::FbtsUplink;

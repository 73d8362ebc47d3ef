//! Reply path towards the FBTS controller.

use std::net::UdpSocket;
use std::sync::Arc;

use shared_types::SessionHandle;
use tracing::debug;

use crate::codec::FbtsFrame;
use crate::error::UplinkError;

/// Sends frames to the first controller that contacted a station.
///
/// Shares the ingest socket, so replies come from the port the controller
/// already talks to.
#[derive(Debug, Clone)]
pub struct FbtsUplink {
    socket: Arc<UdpSocket>,
    session: SessionHandle,
}

impl FbtsUplink {
    pub(crate) fn new(socket: Arc<UdpSocket>, session: SessionHandle) -> Self {
        Self { socket, session }
    }

    /// Encode and send `frame` to the remembered peer.
    ///
    /// # Errors
    ///
    /// [`UplinkError::NoPeer`] before any datagram was received, or the
    /// socket error if the send fails.
    pub fn send(&self, frame: &FbtsFrame) -> Result<usize, UplinkError> {
        let peer = self.session.read().peer.ok_or(UplinkError::NoPeer)?;
        let bytes = frame.encode();
        let sent = self.socket.send_to(&bytes, peer)?;
        debug!(%peer, tag = ?frame.tag(), len = sent, "FBTS frame sent");
        Ok(sent)
    }
}

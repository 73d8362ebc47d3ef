//! # FBTS Wire Codec
//!
//! Every datagram starts with a 4-byte header:
//!
//! ```text
//!  0       1       2       3       4
//! ┌───────┬───────────────┬───────┬──────────────────────────────┐
//! │  tag  │ length (BE16) │ spare │ body: session_id (BE32) ...  │
//! └───────┴───────────────┴───────┴──────────────────────────────┘
//! ```
//!
//! `length` counts the body, so it must equal `datagram.len() - 4`. The
//! length is checked before the tag is looked at, and no field is read
//! before the body is known to be long enough for its variant. Bodies
//! longer than a variant needs are accepted; the tail is ignored.

use shared_types::{IMEI_FIELD_LEN, IMSI_FIELD_LEN};

use crate::error::FrameError;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 4;

/// Message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameTag {
    /// Controller opens a session for an IMSI.
    StartSession = 0x01,
    /// Authentication challenge (RAND) towards the controller.
    AuthenRequest = 0x02,
    /// SRES computed by the controller.
    AuthenResponse = 0x03,
    /// IMEI/IMSI pair.
    Identity = 0x04,
    /// Reserved for future use.
    Reserved = 0x05,
}

impl FrameTag {
    /// Minimum body length of this message.
    #[must_use]
    pub fn min_body_len(self) -> usize {
        match self {
            Self::StartSession => 4 + IMSI_FIELD_LEN,
            Self::AuthenRequest => 4 + 1 + 16,
            Self::AuthenResponse => 4 + 4,
            Self::Identity => 4 + IMEI_FIELD_LEN + IMSI_FIELD_LEN,
            Self::Reserved => 0,
        }
    }
}

impl TryFrom<u8> for FrameTag {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::StartSession),
            0x02 => Ok(Self::AuthenRequest),
            0x03 => Ok(Self::AuthenResponse),
            0x04 => Ok(Self::Identity),
            0x05 => Ok(Self::Reserved),
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

/// A decoded FBTS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FbtsFrame {
    StartSession {
        session_id: u32,
        imsi: [u8; IMSI_FIELD_LEN],
    },
    AuthenRequest {
        session_id: u32,
        ckey_sqn: u8,
        rand: [u8; 16],
    },
    AuthenResponse {
        session_id: u32,
        sres: [u8; 4],
    },
    Identity {
        session_id: u32,
        imei: [u8; IMEI_FIELD_LEN],
        imsi: [u8; IMSI_FIELD_LEN],
    },
    Reserved,
}

impl FbtsFrame {
    /// Tag of this message.
    #[must_use]
    pub fn tag(&self) -> FrameTag {
        match self {
            Self::StartSession { .. } => FrameTag::StartSession,
            Self::AuthenRequest { .. } => FrameTag::AuthenRequest,
            Self::AuthenResponse { .. } => FrameTag::AuthenResponse,
            Self::Identity { .. } => FrameTag::Identity,
            Self::Reserved => FrameTag::Reserved,
        }
    }

    /// Session id carried by the message, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<u32> {
        match *self {
            Self::StartSession { session_id, .. }
            | Self::AuthenRequest { session_id, .. }
            | Self::AuthenResponse { session_id, .. }
            | Self::Identity { session_id, .. } => Some(session_id),
            Self::Reserved => None,
        }
    }

    /// Decode one datagram.
    ///
    /// # Errors
    ///
    /// - [`FrameError::TooShort`] for datagrams under 4 bytes
    /// - [`FrameError::LengthMismatch`] when `length != len - 4`
    /// - [`FrameError::UnknownTag`] for tags outside 1..=5
    /// - [`FrameError::Truncated`] when the body is too short for its tag
    pub fn decode(datagram: &[u8]) -> Result<Self, FrameError> {
        if datagram.len() < HEADER_LEN {
            return Err(FrameError::TooShort {
                len: datagram.len(),
            });
        }

        let declared = usize::from(u16::from_be_bytes([datagram[1], datagram[2]]));
        let body = &datagram[HEADER_LEN..];
        if declared != body.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let tag = FrameTag::try_from(datagram[0])?;
        if body.len() < tag.min_body_len() {
            return Err(FrameError::Truncated {
                tag: tag as u8,
                need: tag.min_body_len(),
                got: body.len(),
            });
        }

        let mut r = Reader::new(body);
        let frame = match tag {
            FrameTag::StartSession => Self::StartSession {
                session_id: r.u32(),
                imsi: r.array(),
            },
            FrameTag::AuthenRequest => Self::AuthenRequest {
                session_id: r.u32(),
                ckey_sqn: r.u8(),
                rand: r.array(),
            },
            FrameTag::AuthenResponse => Self::AuthenResponse {
                session_id: r.u32(),
                sres: r.array(),
            },
            FrameTag::Identity => Self::Identity {
                session_id: r.u32(),
                imei: r.array(),
                imsi: r.array(),
            },
            FrameTag::Reserved => Self::Reserved,
        };
        Ok(frame)
    }

    /// Encode into the layout [`Self::decode`] accepts.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.tag().min_body_len());
        match self {
            Self::StartSession { session_id, imsi } => {
                body.extend_from_slice(&session_id.to_be_bytes());
                body.extend_from_slice(imsi);
            }
            Self::AuthenRequest {
                session_id,
                ckey_sqn,
                rand,
            } => {
                body.extend_from_slice(&session_id.to_be_bytes());
                body.push(*ckey_sqn);
                body.extend_from_slice(rand);
            }
            Self::AuthenResponse { session_id, sres } => {
                body.extend_from_slice(&session_id.to_be_bytes());
                body.extend_from_slice(sres);
            }
            Self::Identity {
                session_id,
                imei,
                imsi,
            } => {
                body.extend_from_slice(&session_id.to_be_bytes());
                body.extend_from_slice(imei);
                body.extend_from_slice(imsi);
            }
            Self::Reserved => {}
        }

        // Bodies are at most 28 bytes.
        let len = body.len() as u16;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.push(self.tag() as u8);
        out.extend_from_slice(&len.to_be_bytes());
        out.push(0);
        out.extend_from_slice(&body);
        out
    }
}

/// Cursor over a body already checked against `min_body_len`.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.array())
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;
use tracing::trace;

use crate::coding::{self, BufExt, BufMutExt};
use crate::connection_id::ConnectionId;
use crate::version::Version;
use crate::{Side, CONNECTION_ID_LEN, DIVERSIFICATION_NONCE_LEN};

// Public flag byte layout. Bits 6 and 7 are unused: ignored when parsing,
// left zero when writing.
const VERSION_FLAG: u8 = 0x01;
const RESET_FLAG: u8 = 0x02;
const NONCE_FLAG: u8 = 0x04;
const CONNECTION_ID_FLAG: u8 = 0x08;
const PACKET_NUMBER_LEN_MASK: u8 = 0x30;
const PACKET_NUMBER_LEN_SHIFT: u8 = 4;

/// Width of a truncated packet number.
///
/// The wire reserves a fourth selector for a legacy 6-byte width; it is not
/// supported and surfaces as [`PacketDecodeError::InvalidPacketNumberLength`]
/// when the packet number is read.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PacketNumberLen {
    /// 1-byte packet number
    One,
    /// 2-byte packet number
    Two,
    /// 4-byte packet number
    Four,
}

impl PacketNumberLen {
    /// Encoded size in bytes
    pub fn len(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::One => 0b00,
            Self::Two => 0b01,
            Self::Four => 0b10,
        }
    }

    fn from_byte(first: u8) -> Result<Self, PacketDecodeError> {
        Ok(match (first & PACKET_NUMBER_LEN_MASK) >> PACKET_NUMBER_LEN_SHIFT {
            0b00 => Self::One,
            0b01 => Self::Two,
            0b10 => Self::Four,
            _ => return Err(PacketDecodeError::InvalidPacketNumberLength),
        })
    }
}

/// The decoded, or to-be-encoded, Public Header of a single packet.
///
/// Values are transient: the decoder builds one per packet and callers build
/// one by hand to encode; nothing is cached across packets. The wire carries
/// a single connection ID, exposed here under both the destination and
/// source names; the encoder insists the two agree rather than silently
/// picking one.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PublicHeader {
    /// Connection ID of the packet's destination
    pub dest_connection_id: ConnectionId,
    /// Connection ID of the packet's source, always equal to
    /// `dest_connection_id` on the wire
    pub src_connection_id: ConnectionId,
    /// Whether the header omits the connection ID; only server-sent packets
    /// may do so
    pub omit_connection_id: bool,
    /// Whether the version flag bit is set
    pub version_flag: bool,
    /// The version tag, when the header carries exactly one
    pub version: Version,
    /// Whether this is a server-sent version negotiation packet
    pub is_version_negotiation: bool,
    /// Version tags listed by a version negotiation packet, in wire order,
    /// unknown tags included
    pub supported_versions: Vec<Version>,
    /// Whether the public reset flag bit is set
    pub reset_flag: bool,
    /// Server-supplied key diversification nonce; empty when absent
    pub diversification_nonce: Vec<u8>,
}

/// Header decode state retained for the packet number read.
///
/// Parsing a packet is two-phase: the header proper first, then — for
/// packets that carry one — the truncated packet number, whose width only
/// the flag byte knows. [`Self::packet_number`] must be given the same
/// cursor, positioned where [`Self::new`] left it.
#[derive(Debug)]
pub struct PartialDecode {
    header: PublicHeader,
    first: u8,
}

impl PartialDecode {
    /// Decode the Public Header of a packet sent by `sender` from the front
    /// of `buf`.
    ///
    /// On error the header is discarded whole; no partially populated value
    /// is ever returned. Short reads surface as the cursor's own
    /// [`UnexpectedEnd`](coding::UnexpectedEnd).
    pub fn new<B: Buf>(buf: &mut B, sender: Side) -> Result<Self, PacketDecodeError> {
        let first = buf.get::<u8>()?;
        let mut header = PublicHeader {
            version_flag: first & VERSION_FLAG != 0,
            reset_flag: first & RESET_FLAG != 0,
            ..PublicHeader::default()
        };

        if first & CONNECTION_ID_FLAG != 0 {
            let id = ConnectionId::decode(buf)?;
            if id.is_zero() {
                return Err(PacketDecodeError::InvalidConnectionId);
            }
            header.dest_connection_id = id;
            header.src_connection_id = id;
        } else if sender.is_client() {
            // Only the server is addressable by transport context alone; the
            // client must always say which connection it means.
            return Err(PacketDecodeError::OmittedConnectionId);
        } else {
            header.omit_connection_id = true;
        }

        // The nonce bit is only meaningful on server-sent packets.
        if sender.is_server() && first & NONCE_FLAG != 0 {
            if buf.remaining() < DIVERSIFICATION_NONCE_LEN {
                return Err(coding::UnexpectedEnd.into());
            }
            let mut nonce = vec![0; DIVERSIFICATION_NONCE_LEN];
            buf.copy_to_slice(&mut nonce);
            header.diversification_nonce = nonce;
        }

        if !header.reset_flag && header.version_flag {
            if sender.is_server() && !header.omit_connection_id {
                // Version negotiation: the list of tags runs to the end of
                // the packet, without a count.
                if buf.remaining() == 0 {
                    return Err(PacketDecodeError::EmptyVersionList);
                }
                if buf.remaining() % 4 != 0 {
                    return Err(PacketDecodeError::MalformedVersionList);
                }
                header.is_version_negotiation = true;
                while buf.remaining() > 0 {
                    header.supported_versions.push(buf.get()?);
                }
                trace!(
                    count = header.supported_versions.len(),
                    "decoded version negotiation packet"
                );
            } else {
                header.version = buf.get()?;
            }
        }

        Ok(Self { header, first })
    }

    /// The decoded header
    pub fn header(&self) -> &PublicHeader {
        &self.header
    }

    /// Discard the decode state, keeping the header
    pub fn into_header(self) -> PublicHeader {
        self.header
    }

    /// Read the truncated packet number that follows the header.
    ///
    /// Returns the raw truncated value and the width it was carried at;
    /// expanding it back to a full packet number is the caller's job. Must
    /// only be called for packets that carry one — version negotiation and
    /// public reset packets do not.
    pub fn packet_number<B: Buf>(
        &self,
        buf: &mut B,
    ) -> Result<(u64, PacketNumberLen), PacketDecodeError> {
        debug_assert!(!self.header.is_version_negotiation && !self.header.reset_flag);
        let len = PacketNumberLen::from_byte(self.first)?;
        let pn = match len {
            PacketNumberLen::One => u64::from(buf.get::<u8>()?),
            PacketNumberLen::Two => u64::from(buf.get::<u16>()?),
            PacketNumberLen::Four => u64::from(buf.get::<u32>()?),
        };
        Ok((pn, len))
    }
}

impl PublicHeader {
    /// Serialize the header as sent by `sender`, followed by
    /// `packet_number` truncated to `pn_len` bytes.
    ///
    /// All validation happens before the first byte is written; on error the
    /// buffer is untouched. Version negotiation packets cannot be written
    /// here — use [`compose_version_negotiation`] — and public reset packets
    /// have a separate format this encoder does not produce.
    pub fn encode<W: BufMut>(
        &self,
        w: &mut W,
        packet_number: u64,
        pn_len: PacketNumberLen,
        sender: Side,
    ) -> Result<(), PacketEncodeError> {
        if self.src_connection_id != self.dest_connection_id {
            return Err(PacketEncodeError::MismatchedConnectionIds);
        }
        if self.reset_flag {
            return Err(PacketEncodeError::PublicReset);
        }
        if self.version_flag && sender.is_server() {
            return Err(PacketEncodeError::VersionNegotiation);
        }
        if !self.omit_connection_id && self.dest_connection_id.len() != CONNECTION_ID_LEN {
            return Err(PacketEncodeError::InvalidConnectionIdLength {
                actual: self.dest_connection_id.len(),
                expected: CONNECTION_ID_LEN,
            });
        }

        let mut first = pn_len.tag() << PACKET_NUMBER_LEN_SHIFT;
        if self.version_flag {
            first |= VERSION_FLAG;
        }
        if !self.omit_connection_id {
            first |= CONNECTION_ID_FLAG;
        }
        if !self.diversification_nonce.is_empty() {
            first |= NONCE_FLAG;
        }
        w.write(first);

        if !self.omit_connection_id {
            w.put_slice(&self.dest_connection_id);
        }
        w.put_slice(&self.diversification_nonce);
        if self.version_flag {
            w.write(self.version);
        }
        match pn_len {
            PacketNumberLen::One => w.write(packet_number as u8),
            PacketNumberLen::Two => w.write(packet_number as u16),
            PacketNumberLen::Four => w.write(packet_number as u32),
        }
        Ok(())
    }

    /// Exact number of bytes [`encode`](Self::encode) produces for the same
    /// arguments, without writing any.
    ///
    /// Callers use this to reserve room for the header before laying out the
    /// payload behind it.
    pub fn len(&self, pn_len: PacketNumberLen, sender: Side) -> usize {
        let mut len = 1;
        if !self.omit_connection_id {
            len += CONNECTION_ID_LEN;
        }
        len += self.diversification_nonce.len();
        if self.version_flag && sender.is_client() {
            len += 4;
        }
        len + pn_len.len()
    }
}

impl fmt::Display for PublicHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Public Header{ConnectionID: ")?;
        if self.dest_connection_id.is_empty() {
            f.write_str("(empty)")?;
        } else {
            write!(f, "0x{}", self.dest_connection_id)?;
        }
        write!(f, ", Version: {}", self.version)?;
        if !self.diversification_nonce.is_empty() {
            write!(
                f,
                ", DiversificationNonce: {:02x?}",
                self.diversification_nonce
            )?;
        }
        f.write_str("}")
    }
}

/// Build a version negotiation packet offering `versions`, in order.
///
/// This is the only operation that serializes more than one version tag; the
/// general encoder refuses version-flagged headers on the server side
/// precisely so that negotiation packets all come through here.
pub fn compose_version_negotiation(connection_id: ConnectionId, versions: &[Version]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + CONNECTION_ID_LEN + versions.len() * 4);
    buf.write(VERSION_FLAG | CONNECTION_ID_FLAG);
    buf.put_slice(&connection_id);
    for v in versions {
        buf.write(*v);
    }
    trace!(
        %connection_id,
        count = versions.len(),
        "composed version negotiation packet"
    );
    buf
}

/// Errors produced when decoding a Public Header or its packet number
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum PacketDecodeError {
    /// The input ended before the field being read did
    #[error(transparent)]
    UnexpectedEnd(#[from] coding::UnexpectedEnd),
    /// A client-sent packet did not carry a connection ID
    #[error("omitted connection ID on a client-sent packet")]
    OmittedConnectionId,
    /// The connection ID is the reserved all-zero value
    #[error("invalid connection ID")]
    InvalidConnectionId,
    /// A version negotiation packet listed no versions
    #[error("empty version list in version negotiation packet")]
    EmptyVersionList,
    /// A version negotiation packet's list did not divide into whole tags
    #[error("invalid version negotiation packet")]
    MalformedVersionList,
    /// The flag byte selects the reserved 6-byte packet number encoding
    #[error("invalid packet number length")]
    InvalidPacketNumberLength,
}

/// Errors produced when encoding a Public Header
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum PacketEncodeError {
    /// The destination and source fields name different connection IDs
    #[error("source connection ID must equal destination connection ID")]
    MismatchedConnectionIds,
    /// The connection ID is not the fixed 8-byte width
    #[error("wrong length for connection ID: {actual} (expected {expected})")]
    InvalidConnectionIdLength {
        /// Width of the ID the caller supplied
        actual: usize,
        /// The only width the wire format carries
        expected: usize,
    },
    /// Public reset packets have a separate format this encoder cannot write
    #[error("writing of public reset packets is not supported")]
    PublicReset,
    /// Server-sent version-flagged packets are negotiation packets; use
    /// [`compose_version_negotiation`]
    #[error("writing of version negotiation packets is not supported")]
    VersionNegotiation,
}

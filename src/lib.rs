//! Wire codec for the Public Header framing of the legacy gQUIC transport
//! protocol.
//!
//! Every gQUIC packet begins with an unencrypted Public Header carrying the
//! connection ID, version negotiation metadata, the width of the truncated
//! packet number, and an optional key diversification nonce. This crate
//! decodes that header into a [`PublicHeader`] and encodes one back into the
//! exact byte layout a peer consumes. Everything after the header — frame
//! parsing, crypto, packet number reconstruction — belongs to other layers.
//!
//! Parsing is two-phase, matching how callers consume packets: decode the
//! header via [`PartialDecode`], inspect it (version negotiation and public
//! reset packets carry no packet number), then read the truncated packet
//! number from the same cursor. The flag byte retained by the decode step
//! determines the packet number width.
//!
//! The header format is not self-describing: which fields are legal depends
//! on which endpoint sent the packet, so both directions take an explicit
//! [`Side`] naming the sender.

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

use std::ops;

#[doc(hidden)]
pub mod coding;
mod connection_id;
mod packet;
mod version;

pub use crate::connection_id::ConnectionId;
pub use crate::packet::{
    compose_version_negotiation, PacketDecodeError, PacketEncodeError, PacketNumberLen,
    PartialDecode, PublicHeader,
};
pub use crate::version::{choose_supported, Version, SUPPORTED_VERSIONS};

/// Width of a connection ID carried in a Public Header, in bytes
pub const CONNECTION_ID_LEN: usize = 8;
/// Width of a server-sent diversification nonce, in bytes
pub const DIVERSIFICATION_NONCE_LEN: usize = 32;

/// Which endpoint sent, or is about to send, a packet
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Side {
    /// The initiator of a connection
    Client = 0,
    /// The acceptor of a connection
    Server = 1,
}

impl Side {
    #[inline]
    /// Shorthand for `self == Side::Client`
    pub fn is_client(self) -> bool {
        self == Self::Client
    }

    #[inline]
    /// Shorthand for `self == Side::Server`
    pub fn is_server(self) -> bool {
        self == Self::Server
    }
}

impl ops::Not for Side {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

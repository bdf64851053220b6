use std::{fmt, ops};

use bytes::Buf;
use rand::Rng;

use crate::coding::{self, UnexpectedEnd};
use crate::CONNECTION_ID_LEN;

/// Identifier demultiplexing connections that share a transport address.
///
/// The Public Header carries connection IDs at a fixed 8-byte width. The
/// empty ID stands in for a header that omits the field entirely.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConnectionId {
    len: u8,
    bytes: [u8; CONNECTION_ID_LEN],
}

impl ConnectionId {
    /// The empty connection ID
    pub const EMPTY: Self = Self {
        len: 0,
        bytes: [0; CONNECTION_ID_LEN],
    };

    /// Construct from a slice of at most 8 bytes
    pub fn new(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= CONNECTION_ID_LEN);
        let mut res = Self {
            len: bytes.len() as u8,
            bytes: [0; CONNECTION_ID_LEN],
        };
        res.bytes[..bytes.len()].copy_from_slice(bytes);
        res
    }

    /// Generate a random full-width connection ID
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut res = Self {
            len: CONNECTION_ID_LEN as u8,
            bytes: [0; CONNECTION_ID_LEN],
        };
        rng.fill_bytes(&mut res.bytes);
        res
    }

    /// Whether this is the empty connection ID
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes in the ID
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub(crate) fn decode<B: Buf>(buf: &mut B) -> coding::Result<Self> {
        if buf.remaining() < CONNECTION_ID_LEN {
            return Err(UnexpectedEnd);
        }
        let mut bytes = [0; CONNECTION_ID_LEN];
        buf.copy_to_slice(&mut bytes);
        Ok(Self {
            len: CONNECTION_ID_LEN as u8,
            bytes,
        })
    }

    /// The all-zero full-width ID is reserved on the wire
    pub(crate) fn is_zero(&self) -> bool {
        self.len as usize == CONNECTION_ID_LEN && self.bytes == [0; CONNECTION_ID_LEN]
    }
}

impl ops::Deref for ConnectionId {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes[0..self.len as usize]
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.bytes[0..self.len as usize].fmt(f)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_fixed_width_hex() {
        let cid = ConnectionId::new(&[0x13, 0x37, 0, 0, 0xde, 0xca, 0xfb, 0xad]);
        assert_eq!(cid.to_string(), "13370000decafbad");
        assert_eq!(ConnectionId::EMPTY.to_string(), "");
    }

    #[test]
    fn zero_detection() {
        assert!(ConnectionId::new(&[0; 8]).is_zero());
        assert!(!ConnectionId::new(&[0; 7]).is_zero());
        assert!(!ConnectionId::EMPTY.is_zero());
        assert!(!ConnectionId::new(&[1, 2, 3, 4, 5, 6, 7, 8]).is_zero());
    }

    #[test]
    fn random_is_full_width() {
        let cid = ConnectionId::random(&mut rand::thread_rng());
        assert_eq!(cid.len(), CONNECTION_ID_LEN);
        assert!(!cid.is_empty());
    }

    #[test]
    fn decode_needs_eight_bytes() {
        let mut buf: &[u8] = &[1, 2, 3, 4, 5, 6, 7];
        assert_eq!(ConnectionId::decode(&mut buf), Err(UnexpectedEnd));
        let mut buf: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9];
        let cid = ConnectionId::decode(&mut buf).unwrap();
        assert_eq!(&cid[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.len(), 1);
    }
}

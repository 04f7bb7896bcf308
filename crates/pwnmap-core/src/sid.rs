//! Binary security identifiers.
//!
//! A SID is kept in its on-the-wire form so it can be compared directly
//! against `objectSid` attribute values and ACE principals.
//!
//! ```text
//! Offset  Size  Field
//! 0       1     Revision (always 1)
//! 1       1     SubAuthorityCount
//! 2       6     IdentifierAuthority (big-endian)
//! 8       4*N   SubAuthorities (little-endian)
//! ```

use crate::error::{DecodeError, DecodeResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Maximum number of sub-authorities a SID may carry.
pub const MAX_SUB_AUTHORITIES: usize = 15;

const SID_HEADER_LEN: usize = 8;

/// A security identifier in binary form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(Vec<u8>);

impl Sid {
    /// Builds a revision 1 SID from its authority and sub-authorities.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_SUB_AUTHORITIES`] sub-authorities are given.
    pub fn new(authority: u64, sub_authorities: &[u32]) -> Self {
        assert!(sub_authorities.len() <= MAX_SUB_AUTHORITIES);

        let mut bytes = vec![0u8; SID_HEADER_LEN + 4 * sub_authorities.len()];
        bytes[0] = 1;
        bytes[1] = sub_authorities.len() as u8;
        BigEndian::write_u48(&mut bytes[2..8], authority & 0xFFFF_FFFF_FFFF);
        for (i, sub) in sub_authorities.iter().enumerate() {
            let at = SID_HEADER_LEN + 4 * i;
            LittleEndian::write_u32(&mut bytes[at..at + 4], *sub);
        }
        Sid(bytes)
    }

    /// Decodes a SID that occupies the whole buffer (an `objectSid` value).
    pub fn from_bytes(bytes: &[u8]) -> DecodeResult<Self> {
        let sid = Self::read(bytes, 0)?;
        if sid.len() != bytes.len() {
            return Err(DecodeError::MalformedSid(format!(
                "{} trailing bytes after SID",
                bytes.len() - sid.len()
            )));
        }
        Ok(sid)
    }

    /// Decodes a SID starting at `offset`, ignoring anything after it.
    ///
    /// Use [`Sid::len`] on the result to advance past it.
    pub fn read(bytes: &[u8], offset: usize) -> DecodeResult<Self> {
        let available = bytes.len().saturating_sub(offset);
        if available < SID_HEADER_LEN {
            return Err(DecodeError::truncated("SID", offset, SID_HEADER_LEN, available));
        }

        let revision = bytes[offset];
        if revision != 1 {
            return Err(DecodeError::MalformedSid(format!("revision {}", revision)));
        }

        let count = bytes[offset + 1] as usize;
        if count > MAX_SUB_AUTHORITIES {
            return Err(DecodeError::MalformedSid(format!(
                "{} sub-authorities",
                count
            )));
        }

        let total = SID_HEADER_LEN + 4 * count;
        if available < total {
            return Err(DecodeError::truncated("SID", offset, total, available));
        }

        Ok(Sid(bytes[offset..offset + total].to_vec()))
    }

    /// Raw binary form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A SID always carries at least its 8-byte header.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The 48-bit identifier authority.
    pub fn authority(&self) -> u64 {
        BigEndian::read_u48(&self.0[2..8])
    }

    pub fn sub_authority_count(&self) -> usize {
        self.0[1] as usize
    }

    /// Iterates the sub-authorities in order.
    pub fn sub_authorities(&self) -> impl Iterator<Item = u32> + '_ {
        self.0[SID_HEADER_LEN..]
            .chunks_exact(4)
            .map(LittleEndian::read_u32)
    }

    /// The relative identifier (last sub-authority), if any.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities().last()
    }

    /// Returns true for `S-1-5-21-…` domain account SIDs.
    pub fn is_domain_account(&self) -> bool {
        self.authority() == 5
            && self.sub_authority_count() >= 5
            && self.sub_authorities().next() == Some(21)
    }

    /// The domain part of a domain account SID (everything but the RID).
    pub fn domain(&self) -> Option<Sid> {
        if !self.is_domain_account() {
            return None;
        }
        let subs: Vec<u32> = self.sub_authorities().collect();
        Some(Sid::new(self.authority(), &subs[..subs.len() - 1]))
    }

    /// Appends a RID to this SID, typically a domain SID.
    pub fn with_rid(&self, rid: u32) -> Sid {
        let mut subs: Vec<u32> = self.sub_authorities().collect();
        subs.push(rid);
        Sid::new(self.authority(), &subs)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self.authority();
        if authority >= 1 << 32 {
            write!(f, "S-{}-0x{:012X}", self.0[0], authority)?;
        } else {
            write!(f, "S-{}-{}", self.0[0], authority)?;
        }
        for sub in self.sub_authorities() {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({})", self)
    }
}

impl FromStr for Sid {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DecodeError::MalformedSid(s.to_string());

        let mut parts = s.trim().split('-');
        match parts.next() {
            Some(prefix) if prefix.eq_ignore_ascii_case("S") => {}
            _ => return Err(malformed()),
        }
        if parts.next() != Some("1") {
            return Err(malformed());
        }

        let authority = match parts.next() {
            Some(hex) if hex.starts_with("0x") || hex.starts_with("0X") => {
                u64::from_str_radix(&hex[2..], 16).map_err(|_| malformed())?
            }
            Some(dec) => dec.parse::<u64>().map_err(|_| malformed())?,
            None => return Err(malformed()),
        };
        if authority > 0xFFFF_FFFF_FFFF {
            return Err(malformed());
        }

        let subs = parts
            .map(|p| p.parse::<u32>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        if subs.len() > MAX_SUB_AUTHORITIES {
            return Err(malformed());
        }

        Ok(Sid::new(authority, &subs))
    }
}

impl Serialize for Sid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

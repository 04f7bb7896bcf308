//! Security descriptor decoding (MS-DTYP 2.4.6, self-relative form).
//!
//! ```text
//! Offset  Size  Field
//! 0       1     Revision (1)
//! 1       1     Sbz1
//! 2       2     Control flags
//! 4       4     Owner SID offset
//! 8       4     Group SID offset
//! 12      4     SACL offset
//! 16      4     DACL offset
//! ```
//!
//! Decoding is pure: SIDs are returned as-is, never resolved to names.
//! Object-type GUIDs are kept in the directory's mixed-endian byte order;
//! use [`canonical_guid`] before comparing against textual GUIDs.

use crate::error::{DecodeError, DecodeResult};
use crate::sid::Sid;
use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

const SD_HEADER_LEN: usize = 20;
const ACL_HEADER_LEN: usize = 8;
const ACE_HEADER_LEN: usize = 4;

const ACE_OBJECT_TYPE_PRESENT: u32 = 0x1;
const ACE_INHERITED_OBJECT_TYPE_PRESENT: u32 = 0x2;

/// Security descriptor control flags.
pub mod control {
    pub const SE_OWNER_DEFAULTED: u16 = 0x0001;
    pub const SE_GROUP_DEFAULTED: u16 = 0x0002;
    pub const SE_DACL_PRESENT: u16 = 0x0004;
    pub const SE_DACL_DEFAULTED: u16 = 0x0008;
    pub const SE_SACL_PRESENT: u16 = 0x0010;
    pub const SE_DACL_PROTECTED: u16 = 0x1000;
    pub const SE_SACL_PROTECTED: u16 = 0x2000;
    pub const SE_SELF_RELATIVE: u16 = 0x8000;
}

/// ACE header flags.
pub mod ace_flags {
    pub const OBJECT_INHERIT: u8 = 0x01;
    pub const CONTAINER_INHERIT: u8 = 0x02;
    pub const NO_PROPAGATE_INHERIT: u8 = 0x04;
    pub const INHERIT_ONLY: u8 = 0x08;
    pub const INHERITED: u8 = 0x10;
    pub const SUCCESSFUL_ACCESS: u8 = 0x40;
    pub const FAILED_ACCESS: u8 = 0x80;
}

/// Access mask bits, generic and directory-service specific.
pub mod rights {
    pub const DS_CREATE_CHILD: u32 = 0x0000_0001;
    pub const DS_DELETE_CHILD: u32 = 0x0000_0002;
    pub const DS_LIST_CONTENTS: u32 = 0x0000_0004;
    pub const DS_WRITE_PROPERTY_EXTENDED: u32 = 0x0000_0008;
    pub const DS_READ_PROPERTY: u32 = 0x0000_0010;
    pub const DS_WRITE_PROPERTY: u32 = 0x0000_0020;
    pub const DS_DELETE_TREE: u32 = 0x0000_0040;
    pub const DS_LIST_OBJECT: u32 = 0x0000_0080;
    pub const DS_CONTROL_ACCESS: u32 = 0x0000_0100;
    pub const DELETE: u32 = 0x0001_0000;
    pub const READ_CONTROL: u32 = 0x0002_0000;
    pub const WRITE_DAC: u32 = 0x0004_0000;
    pub const WRITE_OWNER: u32 = 0x0008_0000;
    pub const GENERIC_ALL: u32 = 0x1000_0000;
    pub const GENERIC_EXECUTE: u32 = 0x2000_0000;
    pub const GENERIC_WRITE: u32 = 0x4000_0000;
    pub const GENERIC_READ: u32 = 0x8000_0000;

    /// "Full control" as written by the directory's ACL editor.
    pub const DS_FULL_CONTROL: u32 = 0x000F_01FF;
}

/// An ACE access mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(pub u32);

impl AccessMask {
    /// True when every bit of `bits` is set.
    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// True when any bit of `bits` is set.
    pub fn intersects(self, bits: u32) -> bool {
        self.0 & bits != 0
    }
}

/// ACE type codes (MS-DTYP 2.4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
    SystemAudit,
    SystemAlarm,
    AccessAllowedCompound,
    AccessAllowedObject,
    AccessDeniedObject,
    SystemAuditObject,
    SystemAlarmObject,
    AccessAllowedCallback,
    AccessDeniedCallback,
    AccessAllowedCallbackObject,
    AccessDeniedCallbackObject,
    SystemAuditCallback,
    SystemAlarmCallback,
    SystemAuditCallbackObject,
    SystemAlarmCallbackObject,
    SystemMandatoryLabel,
    SystemResourceAttribute,
    SystemScopedPolicyId,
    Unknown(u8),
}

impl AceType {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::AccessAllowed,
            0x01 => Self::AccessDenied,
            0x02 => Self::SystemAudit,
            0x03 => Self::SystemAlarm,
            0x04 => Self::AccessAllowedCompound,
            0x05 => Self::AccessAllowedObject,
            0x06 => Self::AccessDeniedObject,
            0x07 => Self::SystemAuditObject,
            0x08 => Self::SystemAlarmObject,
            0x09 => Self::AccessAllowedCallback,
            0x0A => Self::AccessDeniedCallback,
            0x0B => Self::AccessAllowedCallbackObject,
            0x0C => Self::AccessDeniedCallbackObject,
            0x0D => Self::SystemAuditCallback,
            0x0E => Self::SystemAlarmCallback,
            0x0F => Self::SystemAuditCallbackObject,
            0x10 => Self::SystemAlarmCallbackObject,
            0x11 => Self::SystemMandatoryLabel,
            0x12 => Self::SystemResourceAttribute,
            0x13 => Self::SystemScopedPolicyId,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::AccessAllowed => 0x00,
            Self::AccessDenied => 0x01,
            Self::SystemAudit => 0x02,
            Self::SystemAlarm => 0x03,
            Self::AccessAllowedCompound => 0x04,
            Self::AccessAllowedObject => 0x05,
            Self::AccessDeniedObject => 0x06,
            Self::SystemAuditObject => 0x07,
            Self::SystemAlarmObject => 0x08,
            Self::AccessAllowedCallback => 0x09,
            Self::AccessDeniedCallback => 0x0A,
            Self::AccessAllowedCallbackObject => 0x0B,
            Self::AccessDeniedCallbackObject => 0x0C,
            Self::SystemAuditCallback => 0x0D,
            Self::SystemAlarmCallback => 0x0E,
            Self::SystemAuditCallbackObject => 0x0F,
            Self::SystemAlarmCallbackObject => 0x10,
            Self::SystemMandatoryLabel => 0x11,
            Self::SystemResourceAttribute => 0x12,
            Self::SystemScopedPolicyId => 0x13,
            Self::Unknown(code) => code,
        }
    }

    /// Object ACEs carry a flags word and optional GUIDs before the SID.
    pub fn is_object(self) -> bool {
        matches!(
            self,
            Self::AccessAllowedObject
                | Self::AccessDeniedObject
                | Self::SystemAuditObject
                | Self::SystemAlarmObject
                | Self::AccessAllowedCallbackObject
                | Self::AccessDeniedCallbackObject
                | Self::SystemAuditCallbackObject
                | Self::SystemAlarmCallbackObject
        )
    }

    pub fn is_allow(self) -> bool {
        matches!(
            self,
            Self::AccessAllowed
                | Self::AccessAllowedObject
                | Self::AccessAllowedCallback
                | Self::AccessAllowedCallbackObject
        )
    }

    pub fn is_deny(self) -> bool {
        matches!(
            self,
            Self::AccessDenied
                | Self::AccessDeniedObject
                | Self::AccessDeniedCallback
                | Self::AccessDeniedCallbackObject
        )
    }
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: u8,
    pub mask: AccessMask,
    pub sid: Sid,
    /// Attribute, property set or extended right this ACE is limited to
    /// (mixed-endian, as stored).
    pub object_type: Option<Uuid>,
    /// Object class that inherits this ACE (mixed-endian, as stored).
    pub inherited_object_type: Option<Uuid>,
}

impl Ace {
    /// A plain (non-object) ACE.
    pub fn new(ace_type: AceType, mask: u32, sid: Sid) -> Self {
        Self {
            ace_type,
            flags: 0,
            mask: AccessMask(mask),
            sid,
            object_type: None,
            inherited_object_type: None,
        }
    }

    /// An object ACE restricted to `object_type`, given in canonical form.
    pub fn with_object_type(ace_type: AceType, mask: u32, sid: Sid, object_type: Uuid) -> Self {
        Self {
            ace_type,
            flags: 0,
            mask: AccessMask(mask),
            sid,
            object_type: Some(mixed_endian_guid(object_type)),
            inherited_object_type: None,
        }
    }

    /// Inherit-only ACEs are templates for children and grant nothing here.
    pub fn applies_to_object(&self) -> bool {
        self.flags & ace_flags::INHERIT_ONLY == 0
    }

    /// Object type in canonical byte order.
    pub fn object_type_canonical(&self) -> Option<Uuid> {
        self.object_type.map(canonical_guid)
    }

    pub fn inherited_object_type_canonical(&self) -> Option<Uuid> {
        self.inherited_object_type.map(canonical_guid)
    }

    fn encoded_len(&self) -> usize {
        let mut len = ACE_HEADER_LEN + 4 + self.sid.len();
        if self.ace_type.is_object() {
            len += 4;
            len += self.object_type.map_or(0, |_| 16);
            len += self.inherited_object_type.map_or(0, |_| 16);
        }
        len
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        out.push(self.ace_type.as_u8());
        out.push(self.flags);
        LittleEndian::write_u16(&mut buf[..2], self.encoded_len() as u16);
        out.extend_from_slice(&buf[..2]);
        LittleEndian::write_u32(&mut buf, self.mask.0);
        out.extend_from_slice(&buf);

        if self.ace_type.is_object() {
            let mut object_flags = 0;
            if self.object_type.is_some() {
                object_flags |= ACE_OBJECT_TYPE_PRESENT;
            }
            if self.inherited_object_type.is_some() {
                object_flags |= ACE_INHERITED_OBJECT_TYPE_PRESENT;
            }
            LittleEndian::write_u32(&mut buf, object_flags);
            out.extend_from_slice(&buf);
            if let Some(guid) = self.object_type {
                out.extend_from_slice(guid.as_bytes());
            }
            if let Some(guid) = self.inherited_object_type {
                out.extend_from_slice(guid.as_bytes());
            }
        }
        out.extend_from_slice(self.sid.as_bytes());
    }
}

/// An ordered access-control list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub revision: u8,
    pub entries: Vec<Ace>,
}

impl Acl {
    pub fn new(entries: Vec<Ace>) -> Self {
        let revision = if entries.iter().any(|a| a.ace_type.is_object()) {
            4
        } else {
            2
        };
        Self { revision, entries }
    }

    fn encoded_len(&self) -> usize {
        ACL_HEADER_LEN + self.entries.iter().map(Ace::encoded_len).sum::<usize>()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; 2];
        out.push(self.revision);
        out.push(0);
        LittleEndian::write_u16(&mut buf, self.encoded_len() as u16);
        out.extend_from_slice(&buf);
        LittleEndian::write_u16(&mut buf, self.entries.len() as u16);
        out.extend_from_slice(&buf);
        out.extend_from_slice(&[0, 0]);
        for ace in &self.entries {
            ace.encode_into(out);
        }
    }
}

/// A decoded security descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    pub revision: u8,
    pub control: u16,
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub sacl: Option<Acl>,
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    /// Decodes a self-relative security descriptor.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let header = take(bytes, 0, SD_HEADER_LEN, "security descriptor header")?;

        let revision = header[0];
        if revision != 1 {
            return Err(DecodeError::UnsupportedRevision {
                what: "security descriptor",
                revision,
            });
        }

        let control = LittleEndian::read_u16(&header[2..4]);
        let owner_offset = LittleEndian::read_u32(&header[4..8]) as usize;
        let group_offset = LittleEndian::read_u32(&header[8..12]) as usize;
        let sacl_offset = LittleEndian::read_u32(&header[12..16]) as usize;
        let dacl_offset = LittleEndian::read_u32(&header[16..20]) as usize;

        let owner = match owner_offset {
            0 => None,
            offset => Some(Sid::read(bytes, offset)?),
        };
        let group = match group_offset {
            0 => None,
            offset => Some(Sid::read(bytes, offset)?),
        };

        // A present flag with a zero offset is a NULL ACL.
        let sacl = if control & control::SE_SACL_PRESENT != 0 && sacl_offset != 0 {
            Some(decode_acl(bytes, sacl_offset)?)
        } else {
            None
        };
        let dacl = if control & control::SE_DACL_PRESENT != 0 && dacl_offset != 0 {
            Some(decode_acl(bytes, dacl_offset)?)
        } else {
            None
        };

        Ok(Self {
            revision,
            control,
            owner,
            group,
            sacl,
            dacl,
        })
    }

    /// Encodes to the self-relative binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut control = self.control | control::SE_SELF_RELATIVE;
        control &= !(control::SE_DACL_PRESENT | control::SE_SACL_PRESENT);
        if self.dacl.is_some() {
            control |= control::SE_DACL_PRESENT;
        }
        if self.sacl.is_some() {
            control |= control::SE_SACL_PRESENT;
        }

        let mut offset = SD_HEADER_LEN;
        let mut next = |present: bool, len: usize| -> u32 {
            if !present {
                return 0;
            }
            let at = offset;
            offset += len;
            at as u32
        };
        let owner_offset = next(self.owner.is_some(), self.owner.as_ref().map_or(0, Sid::len));
        let group_offset = next(self.group.is_some(), self.group.as_ref().map_or(0, Sid::len));
        let sacl_offset = next(self.sacl.is_some(), self.sacl.as_ref().map_or(0, Acl::encoded_len));
        let dacl_offset = next(self.dacl.is_some(), self.dacl.as_ref().map_or(0, Acl::encoded_len));

        let mut out = Vec::with_capacity(offset);
        let mut buf = [0u8; 4];
        out.push(1);
        out.push(0);
        LittleEndian::write_u16(&mut buf[..2], control);
        out.extend_from_slice(&buf[..2]);
        for field in [owner_offset, group_offset, sacl_offset, dacl_offset] {
            LittleEndian::write_u32(&mut buf, field);
            out.extend_from_slice(&buf);
        }

        if let Some(owner) = &self.owner {
            out.extend_from_slice(owner.as_bytes());
        }
        if let Some(group) = &self.group {
            out.extend_from_slice(group.as_bytes());
        }
        if let Some(sacl) = &self.sacl {
            sacl.encode_into(&mut out);
        }
        if let Some(dacl) = &self.dacl {
            dacl.encode_into(&mut out);
        }
        out
    }

    /// DACL entries, or an empty slice when there is no DACL.
    pub fn dacl_entries(&self) -> &[Ace] {
        self.dacl
            .as_ref()
            .map(|acl| acl.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn sacl_entries(&self) -> &[Ace] {
        self.sacl
            .as_ref()
            .map(|acl| acl.entries.as_slice())
            .unwrap_or(&[])
    }
}

/// Converts a GUID read from the wire (first three fields little-endian)
/// into canonical byte order.
pub fn canonical_guid(raw: Uuid) -> Uuid {
    Uuid::from_bytes_le(*raw.as_bytes())
}

/// Inverse of [`canonical_guid`].
pub fn mixed_endian_guid(canonical: Uuid) -> Uuid {
    Uuid::from_bytes(canonical.to_bytes_le())
}

fn take<'a>(
    bytes: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> DecodeResult<&'a [u8]> {
    let available = bytes.len().saturating_sub(offset);
    if available < len {
        return Err(DecodeError::truncated(what, offset, len, available));
    }
    Ok(&bytes[offset..offset + len])
}

fn decode_acl(bytes: &[u8], offset: usize) -> DecodeResult<Acl> {
    let header = take(bytes, offset, ACL_HEADER_LEN, "ACL header")?;

    let revision = header[0];
    if revision != 2 && revision != 4 {
        return Err(DecodeError::UnsupportedRevision {
            what: "ACL",
            revision,
        });
    }

    let size = LittleEndian::read_u16(&header[2..4]) as usize;
    let count = LittleEndian::read_u16(&header[4..6]) as usize;
    if size < ACL_HEADER_LEN {
        return Err(DecodeError::MalformedAce {
            offset,
            reason: format!("ACL size {} smaller than its header", size),
        });
    }

    // ACEs must fit inside the declared ACL size.
    let acl = &bytes[..offset + take(bytes, offset, size, "ACL")?.len()];

    let mut entries = Vec::with_capacity(count);
    let mut pos = offset + ACL_HEADER_LEN;
    for _ in 0..count {
        let ace_header = take(acl, pos, ACE_HEADER_LEN, "ACE header")?;
        let ace_size = LittleEndian::read_u16(&ace_header[2..4]) as usize;
        if ace_size < ACE_HEADER_LEN {
            return Err(DecodeError::MalformedAce {
                offset: pos,
                reason: format!("declared size {}", ace_size),
            });
        }
        let body = take(acl, pos, ace_size, "ACE")?;
        entries.push(decode_ace(body, pos)?);
        pos += ace_size;
    }

    Ok(Acl { revision, entries })
}

fn decode_ace(body: &[u8], at: usize) -> DecodeResult<Ace> {
    let malformed = |reason: String| DecodeError::MalformedAce { offset: at, reason };

    let ace_type = AceType::from_u8(body[0]);
    let flags = body[1];
    if body.len() < ACE_HEADER_LEN + 4 {
        return Err(malformed(format!(
            "{} bytes cannot hold an access mask",
            body.len()
        )));
    }
    let mask = AccessMask(LittleEndian::read_u32(&body[4..8]));

    let mut pos = 8;
    let mut object_type = None;
    let mut inherited_object_type = None;

    if ace_type.is_object() {
        let object_flags = take(body, pos, 4, "object ACE flags")
            .map(LittleEndian::read_u32)
            .map_err(|e| malformed(e.to_string()))?;
        pos += 4;

        if object_flags & ACE_OBJECT_TYPE_PRESENT != 0 {
            object_type = Some(read_guid(body, pos).map_err(|e| malformed(e.to_string()))?);
            pos += 16;
        }
        if object_flags & ACE_INHERITED_OBJECT_TYPE_PRESENT != 0 {
            inherited_object_type =
                Some(read_guid(body, pos).map_err(|e| malformed(e.to_string()))?);
            pos += 16;
        }
    }

    let sid = Sid::read(body, pos).map_err(|e| malformed(e.to_string()))?;

    Ok(Ace {
        ace_type,
        flags,
        mask,
        sid,
        object_type,
        inherited_object_type,
    })
}

fn read_guid(bytes: &[u8], offset: usize) -> DecodeResult<Uuid> {
    let raw = take(bytes, offset, 16, "GUID")?;
    let mut guid = [0u8; 16];
    guid.copy_from_slice(raw);
    Ok(Uuid::from_bytes(guid))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBER_GUID: Uuid = Uuid::from_u128(0xbf9679c0_0de6_11d0_a285_00aa003049e2);

    fn sid(s: &str) -> Sid {
        s.parse().unwrap()
    }

    fn sample() -> SecurityDescriptor {
        SecurityDescriptor {
            revision: 1,
            control: 0,
            owner: Some(sid("S-1-5-21-1-2-3-512")),
            group: Some(sid("S-1-5-21-1-2-3-513")),
            sacl: None,
            dacl: Some(Acl::new(vec![
                Ace::new(AceType::AccessAllowed, rights::GENERIC_ALL, sid("S-1-5-18")),
                Ace::with_object_type(
                    AceType::AccessAllowedObject,
                    rights::DS_WRITE_PROPERTY,
                    sid("S-1-5-21-1-2-3-1105"),
                    MEMBER_GUID,
                ),
            ])),
        }
    }

    #[test]
    fn test_decode_encoded_descriptor() {
        let sd = sample();
        let bytes = sd.to_bytes();
        let decoded = SecurityDescriptor::decode(&bytes).unwrap();

        assert_eq!(decoded.owner, sd.owner);
        assert_eq!(decoded.group, sd.group);
        assert!(decoded.sacl.is_none());
        assert_eq!(decoded.dacl_entries(), sd.dacl_entries());
        assert_eq!(decoded.control & control::SE_DACL_PRESENT, control::SE_DACL_PRESENT);
    }

    #[test]
    fn test_object_ace_guid_is_mixed_endian() {
        let bytes = sample().to_bytes();
        let decoded = SecurityDescriptor::decode(&bytes).unwrap();
        let ace = &decoded.dacl_entries()[1];

        assert_eq!(ace.ace_type, AceType::AccessAllowedObject);
        assert_eq!(
            ace.object_type.unwrap().as_bytes(),
            &[
                0xc0, 0x79, 0x96, 0xbf, 0xe6, 0x0d, 0xd0, 0x11, 0xa2, 0x85, 0x00, 0xaa, 0x00,
                0x30, 0x49, 0xe2
            ]
        );
        assert_eq!(ace.object_type_canonical(), Some(MEMBER_GUID));
        assert!(ace.mask.contains(rights::DS_WRITE_PROPERTY));
    }

    #[test]
    fn test_truncated_descriptor() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            SecurityDescriptor::decode(&bytes[..12]),
            Err(DecodeError::Truncated { .. })
        ));
        // Cut into the last ACE.
        assert!(SecurityDescriptor::decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_unsupported_revision() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 2;
        assert!(matches!(
            SecurityDescriptor::decode(&bytes),
            Err(DecodeError::UnsupportedRevision { .. })
        ));
    }

    #[test]
    fn test_dacl_flag_cleared_means_absent() {
        let mut bytes = sample().to_bytes();
        let control = LittleEndian::read_u16(&bytes[2..4]) & !control::SE_DACL_PRESENT;
        LittleEndian::write_u16(&mut bytes[2..4], control);

        let decoded = SecurityDescriptor::decode(&bytes).unwrap();
        assert!(decoded.dacl.is_none());
        assert!(decoded.dacl_entries().is_empty());
    }

    #[test]
    fn test_sacl_and_dacl_independent() {
        let mut sd = sample();
        sd.sacl = Some(Acl::new(vec![Ace::new(
            AceType::SystemAudit,
            rights::WRITE_DAC,
            sid("S-1-1-0"),
        )]));
        sd.dacl = None;

        let decoded = SecurityDescriptor::decode(&sd.to_bytes()).unwrap();
        assert!(decoded.dacl.is_none());
        assert_eq!(decoded.sacl_entries().len(), 1);
        assert_eq!(decoded.sacl_entries()[0].ace_type, AceType::SystemAudit);
    }

    #[test]
    fn test_undersized_ace() {
        let mut bytes = sample().to_bytes();
        let dacl_offset = LittleEndian::read_u32(&bytes[16..20]) as usize;
        // First ACE size field.
        LittleEndian::write_u16(&mut bytes[dacl_offset + 10..dacl_offset + 12], 2);
        assert!(matches!(
            SecurityDescriptor::decode(&bytes),
            Err(DecodeError::MalformedAce { .. })
        ));
    }

    #[test]
    fn test_inherit_only_does_not_apply() {
        let mut ace = Ace::new(AceType::AccessAllowed, rights::GENERIC_ALL, sid("S-1-1-0"));
        assert!(ace.applies_to_object());
        ace.flags |= ace_flags::INHERIT_ONLY;
        assert!(!ace.applies_to_object());
    }

    #[test]
    fn test_ace_type_codes() {
        for code in 0u8..=0x14 {
            assert_eq!(AceType::from_u8(code).as_u8(), code);
        }
        assert!(AceType::AccessAllowedCallbackObject.is_object());
        assert!(AceType::AccessDeniedObject.is_deny());
        assert!(!AceType::SystemAudit.is_allow());
    }
}

//! Edge types for the object graph.
//!
//! Two kinds of relationship live in the store: group membership and
//! "can pwn" edges, the latter tagged with the method that grants control.
//! Every pwn edge points from attacker to victim.

use crate::error::GraphError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// How one principal gains control over another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PwnMethod {
    /// Owner of the object's security descriptor.
    Owns,
    GenericAll,
    GenericWrite,
    WriteAllProperties,
    WriteDacl,
    WriteOwner,
    AllExtendedRights,
    /// User-Force-Change-Password extended right.
    ResetPassword,
    /// Write access to a group's `member` attribute.
    AddMember,
    /// Self-membership validated write.
    AddSelf,
    WriteSpn,
    WriteKeyCredentialLink,
    WriteAllowedToActOnBehalf,
    /// Both replication extended rights on a domain head.
    DcSync,
    /// Member of a group holds the group's rights.
    MemberOfGroup,
    /// Read access to the local administrator password attribute.
    ReadLapsPassword,
    /// Registered by an external rule.
    Custom(&'static str),
}

impl PwnMethod {
    /// Methods with built-in analyzers, in registration order.
    pub const BUILTIN: [PwnMethod; 15] = [
        PwnMethod::Owns,
        PwnMethod::GenericAll,
        PwnMethod::GenericWrite,
        PwnMethod::WriteAllProperties,
        PwnMethod::WriteDacl,
        PwnMethod::WriteOwner,
        PwnMethod::AllExtendedRights,
        PwnMethod::ResetPassword,
        PwnMethod::AddMember,
        PwnMethod::AddSelf,
        PwnMethod::WriteSpn,
        PwnMethod::WriteKeyCredentialLink,
        PwnMethod::WriteAllowedToActOnBehalf,
        PwnMethod::DcSync,
        PwnMethod::MemberOfGroup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PwnMethod::Owns => "Owns",
            PwnMethod::GenericAll => "GenericAll",
            PwnMethod::GenericWrite => "GenericWrite",
            PwnMethod::WriteAllProperties => "WriteAllProperties",
            PwnMethod::WriteDacl => "WriteDACL",
            PwnMethod::WriteOwner => "WriteOwner",
            PwnMethod::AllExtendedRights => "AllExtendedRights",
            PwnMethod::ResetPassword => "ResetPassword",
            PwnMethod::AddMember => "AddMember",
            PwnMethod::AddSelf => "AddSelf",
            PwnMethod::WriteSpn => "WriteSPN",
            PwnMethod::WriteKeyCredentialLink => "WriteKeyCredentialLink",
            PwnMethod::WriteAllowedToActOnBehalf => "WriteAllowedToActOnBehalf",
            PwnMethod::DcSync => "DCsync",
            PwnMethod::MemberOfGroup => "MemberOfGroup",
            PwnMethod::ReadLapsPassword => "ReadLAPSPassword",
            PwnMethod::Custom(name) => name,
        }
    }
}

impl fmt::Display for PwnMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses built-in method names, ignoring case. Custom methods are only
/// known to the registry that holds them.
impl FromStr for PwnMethod {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PwnMethod::BUILTIN
            .iter()
            .chain(std::iter::once(&PwnMethod::ReadLapsPassword))
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| GraphError::UnknownMethod(s.to_string()))
    }
}

impl Serialize for PwnMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A relationship stored in the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Source is a member of the target group. `direct` is false for
    /// memberships inherited through nested groups.
    MemberOf { direct: bool },

    /// Source can take control of the target.
    Pwns(PwnMethod),
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::MemberOf { direct: true } => f.write_str("member_of"),
            Relation::MemberOf { direct: false } => f.write_str("member_of (nested)"),
            Relation::Pwns(method) => write!(f, "pwns ({})", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_parse() {
        for method in PwnMethod::BUILTIN {
            assert_eq!(method.as_str().parse::<PwnMethod>().unwrap(), method);
        }
        assert_eq!(
            "readlapspassword".parse::<PwnMethod>().unwrap(),
            PwnMethod::ReadLapsPassword
        );
        assert!(matches!(
            "TeleportIntoDc".parse::<PwnMethod>(),
            Err(GraphError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_custom_method() {
        let method = PwnMethod::Custom("CanRdp");
        assert_eq!(method.to_string(), "CanRdp");
        assert_eq!(serde_json::to_string(&method).unwrap(), "\"CanRdp\"");
    }
}

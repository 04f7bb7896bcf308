//! Directory objects.

use crate::attribute::{names, AttributeValue, Attributes};
use crate::error::DecodeError;
use crate::security::SecurityDescriptor;
use crate::sid::Sid;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// `userAccountControl` flags.
pub mod uac {
    pub const ACCOUNTDISABLE: i64 = 0x0000_0002;
    pub const PASSWD_NOTREQD: i64 = 0x0000_0020;
    pub const PASSWD_CANT_CHANGE: i64 = 0x0000_0040;
    pub const NORMAL_ACCOUNT: i64 = 0x0000_0200;
    pub const WORKSTATION_TRUST_ACCOUNT: i64 = 0x0000_1000;
    pub const SERVER_TRUST_ACCOUNT: i64 = 0x0000_2000;
    pub const DONT_EXPIRE_PASSWORD: i64 = 0x0001_0000;
    pub const TRUSTED_FOR_DELEGATION: i64 = 0x0008_0000;
    pub const NOT_DELEGATED: i64 = 0x0010_0000;
    pub const TRUSTED_TO_AUTH_FOR_DELEGATION: i64 = 0x0100_0000;
}

/// `sAMAccountType` values used for classification.
mod sam_account_type {
    pub const GROUP: i64 = 0x1000_0000;
    pub const NON_SECURITY_GROUP: i64 = 0x1000_0001;
    pub const ALIAS: i64 = 0x2000_0000;
    pub const NON_SECURITY_ALIAS: i64 = 0x2000_0001;
    pub const USER: i64 = 0x3000_0000;
    pub const MACHINE: i64 = 0x3000_0001;
    pub const TRUST: i64 = 0x3000_0002;
}

/// Classification of a directory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Other,
    User,
    Computer,
    Group,
    ManagedServiceAccount,
    ForeignSecurityPrincipal,
    Trust,
    DomainDns,
    DnsNode,
    AttributeSchema,
    ClassSchema,
    ControlAccessRight,
    GroupPolicyContainer,
    OrganizationalUnit,
    Container,
}

impl ObjectType {
    pub const ALL: [ObjectType; 15] = [
        ObjectType::Other,
        ObjectType::User,
        ObjectType::Computer,
        ObjectType::Group,
        ObjectType::ManagedServiceAccount,
        ObjectType::ForeignSecurityPrincipal,
        ObjectType::Trust,
        ObjectType::DomainDns,
        ObjectType::DnsNode,
        ObjectType::AttributeSchema,
        ObjectType::ClassSchema,
        ObjectType::ControlAccessRight,
        ObjectType::GroupPolicyContainer,
        ObjectType::OrganizationalUnit,
        ObjectType::Container,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Other => "Other",
            ObjectType::User => "User",
            ObjectType::Computer => "Computer",
            ObjectType::Group => "Group",
            ObjectType::ManagedServiceAccount => "ManagedServiceAccount",
            ObjectType::ForeignSecurityPrincipal => "ForeignSecurityPrincipal",
            ObjectType::Trust => "Trust",
            ObjectType::DomainDns => "DomainDNS",
            ObjectType::DnsNode => "DNSNode",
            ObjectType::AttributeSchema => "AttributeSchema",
            ObjectType::ClassSchema => "ClassSchema",
            ObjectType::ControlAccessRight => "ControlAccessRight",
            ObjectType::GroupPolicyContainer => "GroupPolicyContainer",
            ObjectType::OrganizationalUnit => "OrganizationalUnit",
            ObjectType::Container => "Container",
        }
    }

    /// Principals that can authenticate and hold group memberships.
    pub fn is_account(&self) -> bool {
        matches!(
            self,
            ObjectType::User | ObjectType::Computer | ObjectType::ManagedServiceAccount
        )
    }

    fn from_category(category: &str) -> Option<Self> {
        let rdn = category.split(',').next()?.trim();
        let name = rdn
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("CN="))
            .map_or(rdn, |_| &rdn[3..]);

        let kind = match name.to_ascii_lowercase().as_str() {
            "person" | "user" => ObjectType::User,
            "group" => ObjectType::Group,
            "computer" => ObjectType::Computer,
            "ms-ds-managed-service-account" | "ms-ds-group-managed-service-account" => {
                ObjectType::ManagedServiceAccount
            }
            "foreign-security-principal" => ObjectType::ForeignSecurityPrincipal,
            "trusted-domain" => ObjectType::Trust,
            "domain-dns" => ObjectType::DomainDns,
            "dns-node" => ObjectType::DnsNode,
            "attribute-schema" => ObjectType::AttributeSchema,
            "class-schema" => ObjectType::ClassSchema,
            "control-access-right" => ObjectType::ControlAccessRight,
            "group-policy-container" => ObjectType::GroupPolicyContainer,
            "organizational-unit" => ObjectType::OrganizationalUnit,
            "container" => ObjectType::Container,
            _ => return None,
        };
        Some(kind)
    }

    fn from_sam_account_type(value: i64) -> Option<Self> {
        match value {
            sam_account_type::GROUP
            | sam_account_type::NON_SECURITY_GROUP
            | sam_account_type::ALIAS
            | sam_account_type::NON_SECURITY_ALIAS => Some(ObjectType::Group),
            sam_account_type::USER => Some(ObjectType::User),
            sam_account_type::MACHINE => Some(ObjectType::Computer),
            sam_account_type::TRUST => Some(ObjectType::Trust),
            _ => None,
        }
    }

    fn from_class(class: &str) -> Option<Self> {
        let kind = match class.to_ascii_lowercase().as_str() {
            "user" | "person" | "inetorgperson" => ObjectType::User,
            "computer" => ObjectType::Computer,
            "group" => ObjectType::Group,
            "msds-managedserviceaccount" | "msds-groupmanagedserviceaccount" => {
                ObjectType::ManagedServiceAccount
            }
            "foreignsecurityprincipal" => ObjectType::ForeignSecurityPrincipal,
            "trusteddomain" => ObjectType::Trust,
            "domaindns" => ObjectType::DomainDns,
            "dnsnode" => ObjectType::DnsNode,
            "attributeschema" => ObjectType::AttributeSchema,
            "classschema" => ObjectType::ClassSchema,
            "controlaccessright" => ObjectType::ControlAccessRight,
            "grouppolicycontainer" => ObjectType::GroupPolicyContainer,
            "organizationalunit" => ObjectType::OrganizationalUnit,
            "container" => ObjectType::Container,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown object type '{}'", s))
    }
}

/// One directory entry.
///
/// The SID and security descriptor are decoded lazily from their
/// attributes and cached until the attribute is replaced.
#[derive(Debug, Clone)]
pub struct Object {
    distinguished_name: String,
    attributes: Attributes,
    sid: OnceCell<Option<Sid>>,
    security_descriptor: OnceCell<Option<Result<SecurityDescriptor, DecodeError>>>,
}

impl Object {
    pub fn new(distinguished_name: impl Into<String>) -> Self {
        Self::with_attributes(distinguished_name, Attributes::new())
    }

    pub fn with_attributes(distinguished_name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            attributes,
            sid: OnceCell::new(),
            security_descriptor: OnceCell::new(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.distinguished_name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Replaces an attribute's values.
    pub fn set_attribute<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        self.attributes.set(name, values);
        self.invalidate(name);
    }

    pub fn push_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.push(name, value);
        self.invalidate(name);
    }

    fn invalidate(&mut self, name: &str) {
        if name.eq_ignore_ascii_case(names::OBJECT_SID) {
            self.sid = OnceCell::new();
        } else if name.eq_ignore_ascii_case(names::NT_SECURITY_DESCRIPTOR) {
            self.security_descriptor = OnceCell::new();
        }
    }

    pub fn attribute(&self, name: &str) -> &[AttributeValue] {
        self.attributes.get(name)
    }

    pub fn one_attribute(&self, name: &str) -> Cow<'_, str> {
        self.attributes.one(name)
    }

    pub fn attribute_as_int(&self, name: &str) -> Option<i64> {
        self.attributes.as_int(name)
    }

    pub fn attribute_as_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.attributes.as_timestamp(name)
    }

    pub fn has_attribute_value(&self, name: &str, literal: &str) -> bool {
        self.attributes.has_value(name, literal)
    }

    /// The object's SID from `objectSid`, binary or `S-1-…` text.
    pub fn sid(&self) -> Option<&Sid> {
        self.sid
            .get_or_init(|| {
                let raw = self.attributes.get(names::OBJECT_SID).first()?;
                match Sid::from_bytes(raw.as_bytes()) {
                    Ok(sid) => Some(sid),
                    Err(binary_err) => match raw.as_str().parse() {
                        Ok(sid) => Some(sid),
                        Err(_) => {
                            debug!("{}: unusable objectSid: {}", self.distinguished_name, binary_err);
                            None
                        }
                    },
                }
            })
            .as_ref()
    }

    /// The decoded `nTSecurityDescriptor`, `None` when the attribute is absent.
    pub fn security_descriptor(&self) -> Result<Option<&SecurityDescriptor>, DecodeError> {
        let cached = self.security_descriptor.get_or_init(|| {
            let raw = self.attributes.get(names::NT_SECURITY_DESCRIPTOR).first()?;
            Some(SecurityDescriptor::decode(raw.as_bytes()))
        });
        match cached {
            None => Ok(None),
            Some(Ok(sd)) => Ok(Some(sd)),
            Some(Err(e)) => Err(e.clone()),
        }
    }

    /// Classification from `objectCategory`, then `sAMAccountType`, then
    /// the most specific `objectClass`.
    pub fn object_type(&self) -> ObjectType {
        if let Some(kind) = ObjectType::from_category(&self.one_attribute(names::OBJECT_CATEGORY)) {
            return kind;
        }
        if let Some(kind) = self
            .attribute_as_int(names::SAM_ACCOUNT_TYPE)
            .and_then(ObjectType::from_sam_account_type)
        {
            return kind;
        }
        self.attribute(names::OBJECT_CLASS)
            .last()
            .and_then(|class| ObjectType::from_class(&class.as_str()))
            .unwrap_or(ObjectType::Other)
    }

    /// `userAccountControl`, when present and numeric.
    pub fn account_control(&self) -> Option<i64> {
        self.attribute_as_int(names::USER_ACCOUNT_CONTROL)
    }

    /// Display name: `name`, then `sAMAccountName`, then the DN.
    pub fn label(&self) -> Cow<'_, str> {
        for attr in [names::NAME, names::SAM_ACCOUNT_NAME, names::DISPLAY_NAME] {
            let value = self.one_attribute(attr);
            if !value.is_empty() {
                return value;
            }
        }
        Cow::Borrowed(&self.distinguished_name)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.object_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{Ace, AceType, Acl};

    fn object(attrs: &[(&str, &[&str])]) -> Object {
        let mut o = Object::new("CN=Test,DC=example,DC=com");
        for (name, values) in attrs {
            o.set_attribute(name, values.iter().copied());
        }
        o
    }

    #[test]
    fn test_type_from_category() {
        let o = object(&[(
            names::OBJECT_CATEGORY,
            &["CN=Person,CN=Schema,CN=Configuration,DC=example,DC=com"],
        )]);
        assert_eq!(o.object_type(), ObjectType::User);

        let o = object(&[(
            names::OBJECT_CATEGORY,
            &["CN=ms-DS-Group-Managed-Service-Account,CN=Schema,CN=Configuration,DC=x"],
        )]);
        assert_eq!(o.object_type(), ObjectType::ManagedServiceAccount);
    }

    #[test]
    fn test_type_fallbacks() {
        let o = object(&[(names::SAM_ACCOUNT_TYPE, &["805306369"])]);
        assert_eq!(o.object_type(), ObjectType::Computer);

        let o = object(&[(names::OBJECT_CLASS, &["top", "person", "user", "computer"])]);
        assert_eq!(o.object_type(), ObjectType::Computer);

        let o = object(&[(names::OBJECT_CLASS, &["top", "somethingElse"])]);
        assert_eq!(o.object_type(), ObjectType::Other);
    }

    #[test]
    fn test_category_wins_over_class() {
        let o = object(&[
            (names::OBJECT_CATEGORY, &["Group"]),
            (names::OBJECT_CLASS, &["top", "person", "user"]),
        ]);
        assert_eq!(o.object_type(), ObjectType::Group);
    }

    #[test]
    fn test_sid_binary_and_text() {
        let sid: Sid = "S-1-5-21-1-2-3-1104".parse().unwrap();
        let mut o = Object::new("CN=a");
        o.set_attribute(names::OBJECT_SID, [sid.as_bytes()]);
        assert_eq!(o.sid(), Some(&sid));

        o.set_attribute(names::OBJECT_SID, ["S-1-5-32-544"]);
        assert_eq!(o.sid().unwrap().to_string(), "S-1-5-32-544");

        o.set_attribute(names::OBJECT_SID, ["garbage"]);
        assert_eq!(o.sid(), None);
    }

    #[test]
    fn test_security_descriptor_cached_and_invalidated() {
        let mut o = Object::new("CN=a");
        assert_eq!(o.security_descriptor(), Ok(None));

        let sd = SecurityDescriptor {
            revision: 1,
            owner: Some("S-1-5-32-544".parse().unwrap()),
            dacl: Some(Acl::new(vec![Ace::new(
                AceType::AccessAllowed,
                0x10,
                "S-1-1-0".parse().unwrap(),
            )])),
            ..Default::default()
        };
        o.set_attribute(names::NT_SECURITY_DESCRIPTOR, [sd.to_bytes()]);
        let decoded = o.security_descriptor().unwrap().unwrap();
        assert_eq!(decoded.owner, sd.owner);
        assert_eq!(decoded.dacl_entries().len(), 1);

        o.set_attribute(names::NT_SECURITY_DESCRIPTOR, [vec![1u8, 0, 4]]);
        assert!(matches!(
            o.security_descriptor(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_label() {
        assert_eq!(Object::new("CN=x,DC=y").label(), "CN=x,DC=y");
        let o = object(&[(names::SAM_ACCOUNT_NAME, &["svc_sql"])]);
        assert_eq!(o.label(), "svc_sql");
    }

    #[test]
    fn test_type_names_parse() {
        for kind in ObjectType::ALL {
            assert_eq!(kind.as_str().parse::<ObjectType>(), Ok(kind));
        }
    }
}

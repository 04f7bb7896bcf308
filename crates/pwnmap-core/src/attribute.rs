//! Multi-valued attribute storage.
//!
//! Directory attributes are case-insensitive names mapped to ordered lists
//! of byte-string values. Binary attributes (`objectSid`,
//! `nTSecurityDescriptor`) and textual ones share the same representation;
//! the typed accessors do the parsing and report failure as `None`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Well-known attribute names.
pub mod names {
    pub const OBJECT_CLASS: &str = "objectClass";
    pub const OBJECT_CATEGORY: &str = "objectCategory";
    pub const OBJECT_SID: &str = "objectSid";
    pub const OBJECT_GUID: &str = "objectGUID";
    pub const NT_SECURITY_DESCRIPTOR: &str = "nTSecurityDescriptor";
    pub const DISTINGUISHED_NAME: &str = "distinguishedName";
    pub const NAME: &str = "name";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
    pub const SAM_ACCOUNT_TYPE: &str = "sAMAccountType";
    pub const MEMBER_OF: &str = "memberOf";
    pub const MEMBER: &str = "member";
    pub const PRIMARY_GROUP_ID: &str = "primaryGroupID";
    pub const USER_ACCOUNT_CONTROL: &str = "userAccountControl";
    pub const LAST_LOGON_TIMESTAMP: &str = "lastLogonTimestamp";
    pub const PWD_LAST_SET: &str = "pwdLastSet";
    pub const WHEN_CREATED: &str = "whenCreated";
    pub const OPERATING_SYSTEM: &str = "operatingSystem";
    pub const SERVICE_PRINCIPAL_NAME: &str = "servicePrincipalName";
    pub const TRUST_DIRECTION: &str = "trustDirection";
    pub const TRUST_ATTRIBUTES: &str = "trustAttributes";
    pub const TRUST_PARTNER: &str = "trustPartner";
    pub const SCHEMA_ID_GUID: &str = "schemaIDGUID";
    pub const RIGHTS_GUID: &str = "rightsGuid";
    pub const LAPS_EXPIRATION_TIME: &str = "ms-Mcs-AdmPwdExpirationTime";

    // Meta attributes written by the classification pass.
    pub const META_TYPE: &str = "_type";
    pub const META_LAST_LOGIN_AGE: &str = "_lastloginage";
    pub const META_PASSWORD_AGE: &str = "_passwordage";
    pub const META_LINUX: &str = "_linux";
    pub const META_WINDOWS: &str = "_windows";
    pub const META_UNCONSTRAINED_DELEGATION: &str = "_unconstraineddelegation";
    pub const META_CONSTRAINED_DELEGATION: &str = "_constraineddelegation";
    pub const META_WORKSTATION: &str = "_workstation";
    pub const META_SERVER: &str = "_server";
    pub const META_ACCOUNT_DISABLED: &str = "_accountdisabled";
    pub const META_PASSWORD_CANT_CHANGE: &str = "_passwordcantchange";
    pub const META_PASSWORD_NO_EXPIRE: &str = "_passwordnoexpire";
    pub const META_PASSWORD_NOT_REQUIRED: &str = "_passwordnotrequired";
}

/// A single attribute value.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct AttributeValue(Vec<u8>);

impl AttributeValue {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view of the value.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "<{} bytes>", self.0.len()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue(s.as_bytes().to_vec())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue(s.into_bytes())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue(bytes)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(bytes: &[u8]) -> Self {
        AttributeValue(bytes.to_vec())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    /// Spelling of the name as first seen.
    name: String,
    values: Vec<AttributeValue>,
}

/// The attribute set of one directory object.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: HashMap<String, Entry>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all values of an attribute. An empty list removes it.
    pub fn set<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
        let key = fold(name);
        if values.is_empty() {
            self.entries.remove(&key);
            return;
        }
        match self.entries.get_mut(&key) {
            Some(entry) => entry.values = values,
            None => {
                self.entries.insert(
                    key,
                    Entry {
                        name: name.to_string(),
                        values,
                    },
                );
            }
        }
    }

    /// Appends a value, creating the attribute if needed.
    pub fn push(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.entries
            .entry(fold(name))
            .or_insert_with(|| Entry {
                name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Vec<AttributeValue> {
        self.entries
            .remove(&fold(name))
            .map(|e| e.values)
            .unwrap_or_default()
    }

    /// All values of an attribute; empty when absent.
    pub fn get(&self, name: &str) -> &[AttributeValue] {
        self.entries
            .get(&fold(name))
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&fold(name))
    }

    /// First value as a string, or the empty string.
    pub fn one(&self, name: &str) -> Cow<'_, str> {
        self.get(name)
            .first()
            .map(AttributeValue::as_str)
            .unwrap_or(Cow::Borrowed(""))
    }

    /// First value parsed as a signed integer.
    ///
    /// Values above `i64::MAX` (unsigned 64-bit counters) are rejected.
    pub fn as_int(&self, name: &str) -> Option<i64> {
        self.get(name).first()?.as_str().trim().parse().ok()
    }

    /// First value interpreted as a timestamp.
    ///
    /// Accepts FILETIME ticks (100ns since 1601) and generalized time
    /// (`20201008120000.0Z`). Zero, negative (relative) and `i64::MAX` tick
    /// values mean "never" and yield `None`.
    pub fn as_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        let value = self.get(name).first()?.as_str();
        let value = value.trim();

        if let Ok(ticks) = value.parse::<i64>() {
            return filetime_to_datetime(ticks);
        }
        parse_generalized_time(value)
    }

    /// Case-insensitive test for any value equal to `literal`.
    pub fn has_value(&self, name: &str, literal: &str) -> bool {
        self.get(name)
            .iter()
            .any(|v| v.as_str().eq_ignore_ascii_case(literal))
    }

    /// Iterates `(name, values)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Converts FILETIME ticks to a UTC timestamp, treating sentinels as unset.
pub fn filetime_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 || ticks == i64::MAX {
        return None;
    }
    let secs = ticks / FILETIME_TICKS_PER_SEC - FILETIME_EPOCH_OFFSET_SECS;
    let nanos = (ticks % FILETIME_TICKS_PER_SEC) as u32 * 100;
    Utc.timestamp_opt(secs, nanos).single()
}

fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let digits = value.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_absent_is_empty() {
        let attrs = Attributes::new();
        assert!(attrs.get(names::MEMBER_OF).is_empty());
        assert_eq!(attrs.one(names::NAME), "");
        assert_eq!(attrs.as_int(names::USER_ACCOUNT_CONTROL), None);
        assert!(!attrs.has_value(names::OBJECT_CLASS, "user"));
    }

    #[test]
    fn test_case_insensitive_names() {
        let mut attrs = Attributes::new();
        attrs.set("sAMAccountName", ["alice"]);
        assert_eq!(attrs.one("samaccountname"), "alice");
        assert!(attrs.contains("SAMACCOUNTNAME"));

        attrs.set("SAMACCOUNTNAME", ["bob"]);
        assert_eq!(attrs.len(), 1);
        let (name, values) = attrs.iter().next().unwrap();
        assert_eq!(name, "sAMAccountName");
        assert_eq!(values[0].as_str(), "bob");
    }

    #[test]
    fn test_set_preserves_order_and_replaces() {
        let mut attrs = Attributes::new();
        attrs.set(names::OBJECT_CLASS, ["top", "person", "user"]);
        let classes: Vec<_> = attrs
            .get(names::OBJECT_CLASS)
            .iter()
            .map(|v| v.as_str().into_owned())
            .collect();
        assert_eq!(classes, vec!["top", "person", "user"]);

        attrs.set(names::OBJECT_CLASS, Vec::<String>::new());
        assert!(!attrs.contains(names::OBJECT_CLASS));
    }

    #[test]
    fn test_has_value_ignores_case() {
        let mut attrs = Attributes::new();
        attrs.set(names::OBJECT_CLASS, ["top", "Group"]);
        assert!(attrs.has_value(names::OBJECT_CLASS, "group"));
        assert!(!attrs.has_value(names::OBJECT_CLASS, "user"));
    }

    #[test]
    fn test_as_int() {
        let mut attrs = Attributes::new();
        attrs.set(names::USER_ACCOUNT_CONTROL, ["512"]);
        attrs.set(names::NAME, ["not a number"]);
        assert_eq!(attrs.as_int(names::USER_ACCOUNT_CONTROL), Some(512));
        assert_eq!(attrs.as_int(names::NAME), None);
    }

    #[test]
    fn test_filetime_timestamp() {
        let mut attrs = Attributes::new();
        // 2020-01-01T00:00:00Z
        attrs.set(names::PWD_LAST_SET, ["132223104000000000"]);
        let ts = attrs.as_timestamp(names::PWD_LAST_SET).unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2020, 1, 1));
    }

    #[test]
    fn test_never_sentinels() {
        let mut attrs = Attributes::new();
        for never in ["0", "9223372036854775807", "-36288000000000"] {
            attrs.set(names::LAST_LOGON_TIMESTAMP, [never]);
            assert_eq!(attrs.as_timestamp(names::LAST_LOGON_TIMESTAMP), None);
        }
    }

    #[test]
    fn test_generalized_time() {
        let mut attrs = Attributes::new();
        attrs.set(names::WHEN_CREATED, ["20201008120000.0Z"]);
        let ts = attrs.as_timestamp(names::WHEN_CREATED).unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2020, 10, 8));

        attrs.set(names::WHEN_CREATED, ["garbage"]);
        assert_eq!(attrs.as_timestamp(names::WHEN_CREATED), None);
    }

    #[test]
    fn test_binary_values() {
        let mut attrs = Attributes::new();
        attrs.set(names::OBJECT_SID, [vec![1u8, 0, 0, 0, 0, 0, 0, 5]]);
        assert_eq!(attrs.get(names::OBJECT_SID)[0].as_bytes().len(), 8);
    }
}

//! Well-known principals, extended rights and schema GUIDs.
//!
//! GUIDs here are in canonical byte order; compare them against
//! [`canonical_guid`](crate::security::canonical_guid) of ACE object types.

use crate::sid::Sid;
use once_cell::sync::Lazy;

pub static EVERYONE: Lazy<Sid> = Lazy::new(|| Sid::new(1, &[0]));
pub static CREATOR_OWNER: Lazy<Sid> = Lazy::new(|| Sid::new(3, &[0]));
pub static ANONYMOUS: Lazy<Sid> = Lazy::new(|| Sid::new(5, &[7]));
pub static ENTERPRISE_DOMAIN_CONTROLLERS: Lazy<Sid> = Lazy::new(|| Sid::new(5, &[9]));
pub static SELF: Lazy<Sid> = Lazy::new(|| Sid::new(5, &[10]));
pub static AUTHENTICATED_USERS: Lazy<Sid> = Lazy::new(|| Sid::new(5, &[11]));
pub static SYSTEM: Lazy<Sid> = Lazy::new(|| Sid::new(5, &[18]));

/// Principals that never become attackers in the can-pwn graph.
pub fn is_ignored_principal(sid: &Sid) -> bool {
    *sid == *SELF || *sid == *CREATOR_OWNER || *sid == *SYSTEM
}

/// Principals injected as placeholders when a dump does not contain them.
pub const KNOWN_PRINCIPALS: &[(&str, &str)] = &[
    ("S-1-0-0", "Nobody"),
    ("S-1-1-0", "Everyone"),
    ("S-1-2-0", "Local"),
    ("S-1-3-0", "Creator Owner"),
    ("S-1-3-1", "Creator Group"),
    ("S-1-5-2", "Network"),
    ("S-1-5-4", "Interactive"),
    ("S-1-5-6", "Service"),
    ("S-1-5-7", "Anonymous Logon"),
    ("S-1-5-9", "Enterprise Domain Controllers"),
    ("S-1-5-10", "Self"),
    ("S-1-5-11", "Authenticated Users"),
    ("S-1-5-18", "Local System"),
    ("S-1-5-19", "Local Service"),
    ("S-1-5-20", "Network Service"),
    ("S-1-5-32-544", "Administrators"),
    ("S-1-5-32-545", "Users"),
    ("S-1-5-32-546", "Guests"),
    ("S-1-5-32-548", "Account Operators"),
    ("S-1-5-32-549", "Server Operators"),
    ("S-1-5-32-550", "Print Operators"),
    ("S-1-5-32-551", "Backup Operators"),
    ("S-1-5-32-552", "Replicators"),
    ("S-1-5-32-554", "Pre-Windows 2000 Compatible Access"),
    ("S-1-5-32-555", "Remote Desktop Users"),
    ("S-1-5-32-556", "Network Configuration Operators"),
    ("S-1-5-32-560", "Windows Authorization Access Group"),
    ("S-1-5-32-561", "Terminal Server License Servers"),
    ("S-1-5-32-562", "Distributed COM Users"),
    ("S-1-5-32-568", "IIS_IUSRS"),
    ("S-1-5-32-569", "Cryptographic Operators"),
    ("S-1-5-32-573", "Event Log Readers"),
    ("S-1-5-32-574", "Certificate Service DCOM Access"),
    ("S-1-5-32-575", "RDS Remote Access Servers"),
    ("S-1-5-32-576", "RDS Endpoint Servers"),
    ("S-1-5-32-577", "RDS Management Servers"),
    ("S-1-5-32-578", "Hyper-V Administrators"),
    ("S-1-5-32-579", "Access Control Assistance Operators"),
    ("S-1-5-32-580", "Remote Management Users"),
];

/// Extended rights (controlAccessRight `rightsGuid` values).
pub mod rights {
    use uuid::Uuid;

    pub const USER_FORCE_CHANGE_PASSWORD: Uuid =
        Uuid::from_u128(0x00299570_246d_11d0_a768_00aa006e0529);
    pub const DS_REPLICATION_GET_CHANGES: Uuid =
        Uuid::from_u128(0x1131f6aa_9c07_11d1_f79f_00c04fc2dcd2);
    pub const DS_REPLICATION_GET_CHANGES_ALL: Uuid =
        Uuid::from_u128(0x1131f6ad_9c07_11d1_f79f_00c04fc2dcd2);
    pub const DS_REPLICATION_GET_CHANGES_IN_FILTERED_SET: Uuid =
        Uuid::from_u128(0x89e95b76_444d_4c62_991a_0facbeda640c);
}

/// Attribute `schemaIDGUID` values.
pub mod attributes {
    use uuid::Uuid;

    pub const MEMBER: Uuid = Uuid::from_u128(0xbf9679c0_0de6_11d0_a285_00aa003049e2);
    pub const SERVICE_PRINCIPAL_NAME: Uuid =
        Uuid::from_u128(0xf3a64788_5306_11d1_a9c5_0000f80367c1);
    pub const MS_DS_KEY_CREDENTIAL_LINK: Uuid =
        Uuid::from_u128(0x5b47d60f_6090_40b2_9f37_2a4de88f3063);
    pub const MS_DS_ALLOWED_TO_ACT_ON_BEHALF_OF_OTHER_IDENTITY: Uuid =
        Uuid::from_u128(0x3f78c3e5_f79a_46bd_a0b8_9d18116ddc79);
}

/// Validated writes (`DS_WRITE_PROPERTY_EXTENDED` object types).
pub mod validated {
    use uuid::Uuid;

    /// Self-membership: add or remove yourself from a group.
    pub const SELF_MEMBERSHIP: Uuid = Uuid::from_u128(0xbf9679c0_0de6_11d0_a285_00aa003049e2);
    pub const SERVICE_PRINCIPAL_NAME: Uuid =
        Uuid::from_u128(0xf3a64788_5306_11d1_a9c5_0000f80367c1);
}

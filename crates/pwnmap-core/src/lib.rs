//! pwnmap core - directory object model
//!
//! This crate holds everything that can be said about a single directory
//! object without looking at the rest of the directory:
//!
//! - multi-valued, case-insensitive attribute storage with typed accessors
//! - binary SIDs and self-relative security descriptors
//! - object classification
//! - an LDAP-style filter language for selecting objects
//!
//! # Example
//!
//! ```
//! use pwnmap_core::{names, parse_query_strict, Object};
//!
//! let mut admin = Object::new("CN=Administrator,CN=Users,DC=corp,DC=local");
//! admin.set_attribute(names::OBJECT_CLASS, ["top", "person", "user"]);
//! admin.set_attribute(names::USER_ACCOUNT_CONTROL, ["512"]);
//!
//! let query = parse_query_strict("(&(objectClass=user)(!(userAccountControl=514)))").unwrap();
//! assert!(query.evaluate(&admin));
//! ```

pub mod attribute;
pub mod error;
pub mod object;
pub mod query;
pub mod security;
pub mod sid;
pub mod wellknown;

pub use attribute::{filetime_to_datetime, names, AttributeValue, Attributes};
pub use error::{DecodeError, DecodeResult, QueryError};
pub use object::{uac, Object, ObjectType};
pub use query::{parse_query, parse_query_strict, Pattern, Query};
pub use security::{
    canonical_guid, mixed_endian_guid, AccessMask, Ace, AceType, Acl, SecurityDescriptor,
};
pub use sid::Sid;

//! Classification pass.
//!
//! Writes meta attributes (`_type`, account ages, delegation flags, ...)
//! so queries can use them, indexes schema and extended-right objects by
//! GUID, and reports discoveries that change which analyzers run.

use crate::graph::{ObjectGraph, ObjectId};
use chrono::{DateTime, Utc};
use pwnmap_core::{canonical_guid, names, uac, Object, ObjectType};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Schema attribute holding the local administrator password.
pub const LAPS_PASSWORD_ATTRIBUTE: &str = "ms-Mcs-AdmPwd";

const TRUST_ATTRIBUTE_QUARANTINED_DOMAIN: i64 = 0x4;

/// Something found in the directory that requires an extra analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// The LAPS schema extension is installed; `attribute` is the
    /// canonical schemaIDGUID of the password attribute.
    LapsSchema { attribute: Uuid },
}

/// Schema objects and extended rights by GUID.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    rights: HashMap<Uuid, ObjectId>,
    attributes: HashMap<Uuid, ObjectId>,
    classes: HashMap<Uuid, ObjectId>,
}

impl SchemaIndex {
    /// controlAccessRight object by `rightsGuid`.
    pub fn right(&self, guid: &Uuid) -> Option<ObjectId> {
        self.rights.get(guid).copied()
    }

    /// attributeSchema object by canonical `schemaIDGUID`.
    pub fn attribute(&self, guid: &Uuid) -> Option<ObjectId> {
        self.attributes.get(guid).copied()
    }

    pub fn class(&self, guid: &Uuid) -> Option<ObjectId> {
        self.classes.get(guid).copied()
    }

    /// Any schema object or right with this GUID.
    pub fn lookup(&self, guid: &Uuid) -> Option<ObjectId> {
        self.right(guid)
            .or_else(|| self.attribute(guid))
            .or_else(|| self.class(guid))
    }

    /// Human-readable name for a GUID, if the schema defines it.
    pub fn describe(&self, graph: &ObjectGraph, guid: &Uuid) -> Option<String> {
        let object = graph.get(self.lookup(guid)?)?;
        let display = object.one_attribute(names::DISPLAY_NAME);
        if display.is_empty() {
            Some(object.one_attribute(names::NAME).into_owned())
        } else {
            Some(display.into_owned())
        }
    }

    pub fn len(&self) -> usize {
        self.rights.len() + self.attributes.len() + self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDirection {
    Disabled,
    Incoming,
    Outgoing,
    Bidirectional,
    Unknown(i64),
}

impl TrustDirection {
    pub fn from_value(value: i64) -> Self {
        match value {
            0 => TrustDirection::Disabled,
            1 => TrustDirection::Incoming,
            2 => TrustDirection::Outgoing,
            3 => TrustDirection::Bidirectional,
            other => TrustDirection::Unknown(other),
        }
    }
}

impl fmt::Display for TrustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustDirection::Disabled => f.write_str("disabled"),
            TrustDirection::Incoming => f.write_str("incoming"),
            TrustDirection::Outgoing => f.write_str("outgoing"),
            TrustDirection::Bidirectional => f.write_str("bidirectional"),
            TrustDirection::Unknown(value) => write!(f, "unknown ({})", value),
        }
    }
}

/// A trust relationship found in the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustInfo {
    pub partner: String,
    pub direction: TrustDirection,
    pub attributes: i64,
}

impl TrustInfo {
    /// Outbound trust flagged with the quarantine bit, which the audit
    /// reports as a path into the partner domain.
    pub fn flagged_sid_filtering(&self) -> bool {
        let direction = match self.direction {
            TrustDirection::Outgoing => 2,
            TrustDirection::Bidirectional => 3,
            TrustDirection::Unknown(value) => value,
            _ => 0,
        };
        direction & 2 != 0 && self.attributes & TRUST_ATTRIBUTE_QUARANTINED_DOMAIN != 0
    }
}

/// Result of the classification pass.
#[derive(Debug, Default)]
pub struct Classification {
    pub schema: SchemaIndex,
    pub discoveries: Vec<Discovery>,
    pub trusts: Vec<TrustInfo>,
}

/// Classifies every object. `now` anchors the age attributes.
pub fn classify(graph: &mut ObjectGraph, now: DateTime<Utc>, parallel: bool) -> Classification {
    let updates = graph.map_objects(parallel, |_, object| meta_attributes(object, now));
    for (id, attributes) in graph.ids().collect::<Vec<_>>().into_iter().zip(updates) {
        if let Some(object) = graph.get_mut(id) {
            for (name, value) in attributes {
                object.set_attribute(name, [value]);
            }
        }
    }

    let mut result = Classification::default();
    for (id, object) in graph.all() {
        match object.object_type() {
            ObjectType::ControlAccessRight => {
                match Uuid::parse_str(object.one_attribute(names::RIGHTS_GUID).trim()) {
                    Ok(guid) => {
                        result.schema.rights.insert(guid, id);
                    }
                    Err(_) => debug!("{}: unparsable rightsGuid", object.dn()),
                }
            }
            ObjectType::AttributeSchema => {
                let Some(guid) = schema_id_guid(object) else {
                    continue;
                };
                result.schema.attributes.insert(guid, id);
                if object
                    .one_attribute(names::NAME)
                    .eq_ignore_ascii_case(LAPS_PASSWORD_ATTRIBUTE)
                {
                    info!("Detected LAPS schema extension, adding extra analyzer");
                    result
                        .discoveries
                        .push(Discovery::LapsSchema { attribute: guid });
                }
            }
            ObjectType::ClassSchema => {
                if let Some(guid) = schema_id_guid(object) {
                    result.schema.classes.insert(guid, id);
                }
            }
            ObjectType::Trust => {
                let trust = TrustInfo {
                    partner: object.one_attribute(names::TRUST_PARTNER).into_owned(),
                    direction: TrustDirection::from_value(
                        object
                            .attribute_as_int(names::TRUST_DIRECTION)
                            .unwrap_or_default(),
                    ),
                    attributes: object
                        .attribute_as_int(names::TRUST_ATTRIBUTES)
                        .unwrap_or_default(),
                };
                info!("Domain has a {} trust with {}", trust.direction, trust.partner);
                if trust.flagged_sid_filtering() {
                    warn!(
                        "SID filtering is not enabled, so pwn {} and pwn this AD too",
                        trust.partner
                    );
                }
                result.trusts.push(trust);
            }
            _ => {}
        }
    }

    info!(
        "Classified {} objects, indexed {} schema entries",
        graph.len(),
        result.schema.len()
    );
    result
}

/// `schemaIDGUID` is binary and mixed-endian; textual GUIDs are accepted too.
fn schema_id_guid(object: &Object) -> Option<Uuid> {
    let raw = object.attribute(names::SCHEMA_ID_GUID).first()?;
    if let Ok(bytes) = <[u8; 16]>::try_from(raw.as_bytes()) {
        return Some(canonical_guid(Uuid::from_bytes(bytes)));
    }
    match Uuid::parse_str(raw.as_str().trim()) {
        Ok(guid) => Some(guid),
        Err(_) => {
            debug!("{}: unparsable schemaIDGUID", object.dn());
            None
        }
    }
}

fn flag(set: bool) -> Option<String> {
    set.then(|| "1".to_string())
}

/// Meta attributes for one object.
fn meta_attributes(object: &Object, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let mut out = vec![(names::META_TYPE, object.object_type().to_string())];

    let age_hours = |attribute: &str| {
        object
            .attribute_as_timestamp(attribute)
            .map(|ts| (now - ts).num_hours().to_string())
    };
    if let Some(age) = age_hours(names::LAST_LOGON_TIMESTAMP) {
        out.push((names::META_LAST_LOGIN_AGE, age));
    }
    if let Some(age) = age_hours(names::PWD_LAST_SET) {
        out.push((names::META_PASSWORD_AGE, age));
    }

    let os = object.one_attribute(names::OPERATING_SYSTEM).to_lowercase();
    if let Some(v) = flag(os.contains("linux")) {
        out.push((names::META_LINUX, v));
    }
    if let Some(v) = flag(os.contains("windows")) {
        out.push((names::META_WINDOWS, v));
    }

    if let Some(control) = object.account_control() {
        if control & uac::NOT_DELEGATED != 0 {
            debug!("{} cannot be used for delegation", object.dn());
        }
        let flags = [
            (uac::TRUSTED_FOR_DELEGATION, names::META_UNCONSTRAINED_DELEGATION),
            (uac::TRUSTED_TO_AUTH_FOR_DELEGATION, names::META_CONSTRAINED_DELEGATION),
            (uac::WORKSTATION_TRUST_ACCOUNT, names::META_WORKSTATION),
            (uac::SERVER_TRUST_ACCOUNT, names::META_SERVER),
            (uac::ACCOUNTDISABLE, names::META_ACCOUNT_DISABLED),
            (uac::PASSWD_CANT_CHANGE, names::META_PASSWORD_CANT_CHANGE),
            (uac::DONT_EXPIRE_PASSWORD, names::META_PASSWORD_NO_EXPIRE),
            (uac::PASSWD_NOTREQD, names::META_PASSWORD_NOT_REQUIRED),
        ];
        for (bit, attribute) in flags {
            if let Some(v) = flag(control & bit != 0) {
                out.push((attribute, v));
            }
        }
    }

    out
}

//! Built-in analyzers.
//!
//! Most rules scan the victim's DACL for allow entries carrying a given
//! right, optionally limited to one property or extended right. Entries
//! marked inherit-only are templates for child objects and are skipped.
//! Deny entries are not subtracted: the graph reports who could reach an
//! object, not an access check.

use crate::analyzer::{Counterpart, PwnAnalyzer};
use crate::edge::PwnMethod;
use crate::graph::ObjectGraph;
use pwnmap_core::security::rights;
use pwnmap_core::wellknown;
use pwnmap_core::{names, Ace, AceType, Object, ObjectType, SecurityDescriptor, Sid};
use tracing::debug;
use uuid::Uuid;

/// Every built-in analyzer, in [`PwnMethod::BUILTIN`] order.
pub fn builtin() -> Vec<PwnAnalyzer> {
    vec![
        owns(),
        dacl_rule(PwnMethod::GenericAll, any_type, |ace| {
            unrestricted(ace)
                && (ace.mask.contains(rights::GENERIC_ALL)
                    || ace.mask.contains(rights::DS_FULL_CONTROL))
        }),
        dacl_rule(PwnMethod::GenericWrite, any_type, |ace| {
            unrestricted(ace) && ace.mask.contains(rights::GENERIC_WRITE)
        }),
        dacl_rule(PwnMethod::WriteAllProperties, any_type, |ace| {
            unrestricted(ace) && ace.mask.contains(rights::DS_WRITE_PROPERTY)
        }),
        dacl_rule(PwnMethod::WriteDacl, any_type, |ace| {
            ace.mask.contains(rights::WRITE_DAC)
        }),
        dacl_rule(PwnMethod::WriteOwner, any_type, |ace| {
            ace.mask.contains(rights::WRITE_OWNER)
        }),
        dacl_rule(PwnMethod::AllExtendedRights, any_type, |ace| {
            unrestricted(ace) && ace.mask.contains(rights::DS_CONTROL_ACCESS)
        }),
        dacl_rule(PwnMethod::ResetPassword, ObjectType::is_account, |ace| {
            ace.mask.contains(rights::DS_CONTROL_ACCESS)
                && restricted_to(ace, wellknown::rights::USER_FORCE_CHANGE_PASSWORD)
        }),
        dacl_rule(PwnMethod::AddMember, is_group, |ace| {
            ace.mask.contains(rights::DS_WRITE_PROPERTY)
                && restricted_to(ace, wellknown::attributes::MEMBER)
        }),
        dacl_rule(PwnMethod::AddSelf, is_group, |ace| {
            ace.mask.contains(rights::DS_WRITE_PROPERTY_EXTENDED)
                && restricted_to(ace, wellknown::validated::SELF_MEMBERSHIP)
        }),
        dacl_rule(PwnMethod::WriteSpn, ObjectType::is_account, |ace| {
            (ace.mask.contains(rights::DS_WRITE_PROPERTY)
                && restricted_to(ace, wellknown::attributes::SERVICE_PRINCIPAL_NAME))
                || (ace.mask.contains(rights::DS_WRITE_PROPERTY_EXTENDED)
                    && restricted_to(ace, wellknown::validated::SERVICE_PRINCIPAL_NAME))
        }),
        dacl_rule(PwnMethod::WriteKeyCredentialLink, ObjectType::is_account, |ace| {
            ace.mask.contains(rights::DS_WRITE_PROPERTY)
                && restricted_to(ace, wellknown::attributes::MS_DS_KEY_CREDENTIAL_LINK)
        }),
        dacl_rule(PwnMethod::WriteAllowedToActOnBehalf, is_computer, |ace| {
            ace.mask.contains(rights::DS_WRITE_PROPERTY)
                && restricted_to(
                    ace,
                    wellknown::attributes::MS_DS_ALLOWED_TO_ACT_ON_BEHALF_OF_OTHER_IDENTITY,
                )
        }),
        dc_sync(),
        member_of_group(),
    ]
}

/// Principals able to read the LAPS password attribute of a computer.
///
/// Registered only when the schema defines the attribute; `attribute` is
/// its canonical schemaIDGUID.
pub fn read_laps_password(attribute: Uuid) -> PwnAnalyzer {
    PwnAnalyzer::new(PwnMethod::ReadLapsPassword, move |graph, id| {
        let Some(object) = graph.get(id) else {
            return Vec::new();
        };
        if object.object_type() != ObjectType::Computer
            || object.attribute(names::LAPS_EXPIRATION_TIME).is_empty()
        {
            return Vec::new();
        }
        granting_aces(object)
            .filter(|ace| {
                ace.ace_type == AceType::AccessAllowedObject
                    && ace.mask.intersects(rights::DS_READ_PROPERTY)
                    && ace.object_type_canonical() == Some(attribute)
            })
            .map(|ace| Counterpart::Sid(ace.sid.clone()))
            .collect()
    })
}

fn owns() -> PwnAnalyzer {
    PwnAnalyzer::new(PwnMethod::Owns, |graph, id| {
        graph
            .get(id)
            .and_then(descriptor)
            .and_then(|sd| sd.owner.clone())
            .map(Counterpart::Sid)
            .into_iter()
            .collect()
    })
}

/// Needs both replication rights on the domain head.
fn dc_sync() -> PwnAnalyzer {
    PwnAnalyzer::new(PwnMethod::DcSync, |graph, id| {
        let Some(object) = graph.get(id) else {
            return Vec::new();
        };
        if object.object_type() != ObjectType::DomainDns {
            return Vec::new();
        }

        let changes = holders(object, wellknown::rights::DS_REPLICATION_GET_CHANGES);
        let changes_all = holders(object, wellknown::rights::DS_REPLICATION_GET_CHANGES_ALL);

        let mut result: Vec<Counterpart> = Vec::new();
        for sid in changes {
            let counterpart = Counterpart::Sid(sid.clone());
            if changes_all.contains(&sid) && !result.contains(&counterpart) {
                result.push(counterpart);
            }
        }
        result
    })
}

fn holders(object: &Object, right: Uuid) -> Vec<&Sid> {
    granting_aces(object)
        .filter(|ace| ace.mask.contains(rights::DS_CONTROL_ACCESS) && restricted_to(ace, right))
        .map(|ace| &ace.sid)
        .collect()
}

/// Direct members of a group hold its rights.
fn member_of_group() -> PwnAnalyzer {
    PwnAnalyzer::new(PwnMethod::MemberOfGroup, |graph, id| {
        match graph.get(id) {
            Some(object) if object.object_type() == ObjectType::Group => graph
                .direct_members(id)
                .into_iter()
                .map(Counterpart::Object)
                .collect(),
            _ => Vec::new(),
        }
    })
}

/// An analyzer returning the principals of every allow ACE that `matches`,
/// on objects whose type passes `applies`.
fn dacl_rule<A, M>(method: PwnMethod, applies: A, matches: M) -> PwnAnalyzer
where
    A: Fn(&ObjectType) -> bool + Send + Sync + 'static,
    M: Fn(&Ace) -> bool + Send + Sync + 'static,
{
    PwnAnalyzer::new(method, move |graph: &ObjectGraph, id| {
        let Some(object) = graph.get(id) else {
            return Vec::new();
        };
        if !applies(&object.object_type()) {
            return Vec::new();
        }
        granting_aces(object)
            .filter(|ace| matches(ace))
            .map(|ace| Counterpart::Sid(ace.sid.clone()))
            .collect()
    })
}

/// The security descriptor, treating decode failures as absent.
fn descriptor(object: &Object) -> Option<&SecurityDescriptor> {
    match object.security_descriptor() {
        Ok(sd) => sd,
        Err(e) => {
            debug!("{}: skipping security descriptor: {}", object.dn(), e);
            None
        }
    }
}

/// Allow ACEs that apply to the object itself.
fn granting_aces(object: &Object) -> impl Iterator<Item = &Ace> + '_ {
    descriptor(object)
        .into_iter()
        .flat_map(|sd| sd.dacl_entries())
        .filter(|ace| ace.ace_type.is_allow() && ace.applies_to_object())
}

fn unrestricted(ace: &Ace) -> bool {
    ace.object_type.is_none()
}

fn restricted_to(ace: &Ace, guid: Uuid) -> bool {
    ace.object_type_canonical() == Some(guid)
}

fn any_type(_: &ObjectType) -> bool {
    true
}

fn is_group(kind: &ObjectType) -> bool {
    *kind == ObjectType::Group
}

fn is_computer(kind: &ObjectType) -> bool {
    *kind == ObjectType::Computer
}

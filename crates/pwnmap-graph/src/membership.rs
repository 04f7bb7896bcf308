//! Group membership resolution.
//!
//! Direct parents come from `memberOf` DNs and the primary group
//! (`primaryGroupID` appended to the object's domain SID). Accounts are
//! also implicit members of Everyone and Authenticated Users, which are
//! created as groups when the load did not include them. The
//! transitive closure is then computed per object and written back as
//! `MemberOf` edges, replacing whatever a previous run produced.

use crate::graph::{ObjectGraph, ObjectId};
use pwnmap_core::{names, wellknown, Object};
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Outcome of a resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipReport {
    /// Direct memberships found.
    pub direct: usize,
    /// Memberships including nested groups.
    pub transitive: usize,
    /// `memberOf` values naming objects that were not loaded.
    pub unresolved: usize,
}

/// Computes transitive group membership for every object.
pub fn resolve_memberships(graph: &mut ObjectGraph, parallel: bool) -> MembershipReport {
    let everyone = graph.find_or_add_builtin_group(&wellknown::EVERYONE, "Everyone");
    let authenticated_users =
        graph.find_or_add_builtin_group(&wellknown::AUTHENTICATED_USERS, "Authenticated Users");

    let lookups: Vec<(Vec<ObjectId>, usize)> = {
        let graph: &ObjectGraph = graph;
        graph.map_objects(parallel, |_, object| {
            let (mut parents, unresolved) = direct_parents(graph, object);
            if object.object_type().is_account() {
                parents.extend([everyone, authenticated_users]);
            }
            parents.sort();
            parents.dedup();
            (parents, unresolved)
        })
    };

    let unresolved = lookups.iter().map(|(_, missing)| missing).sum();
    let direct: Vec<Vec<ObjectId>> = lookups.into_iter().map(|(parents, _)| parents).collect();

    let closures: Vec<Vec<ObjectId>> = if parallel {
        (0..direct.len())
            .into_par_iter()
            .map(|index| ancestors(&direct, index))
            .collect()
    } else {
        (0..direct.len()).map(|index| ancestors(&direct, index)).collect()
    };

    graph.clear_memberships();

    let mut report = MembershipReport {
        unresolved,
        ..Default::default()
    };
    for (index, groups) in closures.into_iter().enumerate() {
        let member = ObjectId::new(index);
        for group in groups {
            let is_direct = direct[index].contains(&group);
            graph.add_membership(member, group, is_direct);
            report.transitive += 1;
            if is_direct {
                report.direct += 1;
            }
        }
    }

    info!(
        "Resolved {} memberships ({} direct, {} unresolved references)",
        report.transitive, report.direct, report.unresolved
    );
    report
}

fn direct_parents(graph: &ObjectGraph, object: &Object) -> (Vec<ObjectId>, usize) {
    let mut parents = Vec::new();
    let mut unresolved = 0;

    for value in object.attribute(names::MEMBER_OF) {
        match graph.find_by_dn(&value.as_str()) {
            Some(group) => parents.push(group),
            None => {
                debug!("{}: memberOf target {} not loaded", object.dn(), value.as_str());
                unresolved += 1;
            }
        }
    }

    if let Some(rid) = object.attribute_as_int(names::PRIMARY_GROUP_ID) {
        let primary = object
            .sid()
            .and_then(|sid| sid.domain())
            .zip(u32::try_from(rid).ok())
            .and_then(|(domain, rid)| graph.find_by_sid(&domain.with_rid(rid)));
        match primary {
            Some(group) => parents.push(group),
            None => debug!("{}: primary group {} not found", object.dn(), rid),
        }
    }

    (parents, unresolved)
}

/// Breadth-first walk up the parent lists. The visited set makes
/// membership cycles terminate; the object itself is never its own
/// ancestor.
fn ancestors(direct: &[Vec<ObjectId>], start: usize) -> Vec<ObjectId> {
    let origin = ObjectId::new(start);
    let mut visited: HashSet<ObjectId> = HashSet::from([origin]);
    let mut queue: VecDeque<ObjectId> = direct[start].iter().copied().collect();
    let mut result = Vec::new();

    while let Some(group) = queue.pop_front() {
        if !visited.insert(group) {
            continue;
        }
        result.push(group);
        if let Some(parents) = direct.get(group.index()) {
            queue.extend(parents.iter().copied());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwnmap_core::{ObjectType, Sid};

    fn add(graph: &mut ObjectGraph, dn: &str, attrs: &[(&str, &[&str])]) -> ObjectId {
        let mut object = Object::new(dn);
        for (name, values) in attrs {
            object.set_attribute(name, values.iter().copied());
        }
        graph.add(object).unwrap()
    }

    #[test]
    fn test_nested_groups() {
        let mut graph = ObjectGraph::new();
        let outer = add(&mut graph, "CN=Outer,DC=corp", &[]);
        let inner = add(
            &mut graph,
            "CN=Inner,DC=corp",
            &[(names::MEMBER_OF, &["CN=Outer,DC=corp"])],
        );
        let user = add(
            &mut graph,
            "CN=Alice,DC=corp",
            &[
                (names::OBJECT_CLASS, &["top", "person", "user"]),
                (names::MEMBER_OF, &["cn=inner,dc=corp", "CN=Gone,DC=corp"]),
            ],
        );

        let report = resolve_memberships(&mut graph, false);
        assert_eq!(report.unresolved, 1);

        let everyone = graph.find_by_sid(&wellknown::EVERYONE).unwrap();
        let authenticated = graph.find_by_sid(&wellknown::AUTHENTICATED_USERS).unwrap();

        let mut expected = vec![outer, inner, everyone, authenticated];
        expected.sort();
        assert_eq!(graph.member_of(user), expected);
        assert_eq!(graph.direct_members(inner), vec![user]);
        assert_eq!(graph.members(outer), vec![inner, user]);
        assert_eq!(graph.direct_members(outer), vec![inner]);
        assert_eq!(graph.member_of(inner), vec![outer]);
    }

    #[test]
    fn test_implicit_groups_are_groups() {
        let mut graph = ObjectGraph::new();
        let user = add(
            &mut graph,
            "CN=Alice,DC=corp",
            &[(names::OBJECT_CLASS, &["top", "person", "user"])],
        );

        resolve_memberships(&mut graph, false);

        for sid in [&*wellknown::EVERYONE, &*wellknown::AUTHENTICATED_USERS] {
            let group = graph.find_by_sid(sid).unwrap();
            assert_eq!(graph.get(group).unwrap().object_type(), ObjectType::Group);
            assert_eq!(graph.direct_members(group), vec![user]);
        }
    }

    #[test]
    fn test_cycles_terminate_and_idempotent() {
        let mut graph = ObjectGraph::new();
        let a = add(&mut graph, "CN=A", &[(names::MEMBER_OF, &["CN=B"])]);
        let b = add(&mut graph, "CN=B", &[(names::MEMBER_OF, &["CN=C"])]);
        let c = add(&mut graph, "CN=C", &[(names::MEMBER_OF, &["CN=A"])]);

        let first = resolve_memberships(&mut graph, true);
        let snapshot: Vec<_> = [a, b, c].iter().map(|id| graph.member_of(*id)).collect();

        let second = resolve_memberships(&mut graph, false);
        let again: Vec<_> = [a, b, c].iter().map(|id| graph.member_of(*id)).collect();

        assert_eq!(first, second);
        assert_eq!(snapshot, again);
        assert_eq!(graph.member_of(a), vec![b, c]);
        assert!(!graph.member_of(a).contains(&a));
    }

    #[test]
    fn test_primary_group() {
        let mut graph = ObjectGraph::new();
        let domain_users: Sid = "S-1-5-21-10-20-30-513".parse().unwrap();
        let user_sid: Sid = "S-1-5-21-10-20-30-1107".parse().unwrap();

        let mut group = Object::new("CN=Domain Users,DC=corp");
        group.set_attribute(names::OBJECT_SID, [domain_users.as_bytes()]);
        let group = graph.add(group).unwrap();

        let mut user = Object::new("CN=Bob,DC=corp");
        user.set_attribute(names::OBJECT_SID, [user_sid.as_bytes()]);
        user.set_attribute(names::PRIMARY_GROUP_ID, ["513"]);
        let user = graph.add(user).unwrap();

        resolve_memberships(&mut graph, false);
        assert_eq!(graph.direct_member_of(user), vec![group]);
    }
}

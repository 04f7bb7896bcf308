//! Core object store.
//!
//! ObjectGraph owns every loaded directory object as a petgraph node and
//! keeps hash indexes by DN and SID. Membership and pwn relationships are
//! petgraph edges, so every other component only holds `ObjectId`s.

use crate::config::SidCollisionPolicy;
use crate::edge::{PwnMethod, Relation};
use crate::error::{GraphError, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use pwnmap_core::{names, Object, ObjectType, Sid};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Parent container of placeholder well-known principals.
pub const BUILTIN_CONTAINER: &str = "CN=microsoft-builtin";

/// Placeholder object for a well-known principal, typed as a group.
pub fn builtin_group(sid: &Sid, name: &str) -> Object {
    let mut object = Object::new(format!("CN={},{}", name, BUILTIN_CONTAINER));
    object.set_attribute(names::NAME, [name]);
    object.set_attribute(names::OBJECT_SID, [sid.as_bytes()]);
    object.set_attribute(names::OBJECT_CLASS, ["top", "group"]);
    mark_group(&mut object);
    object
}

fn mark_group(object: &mut Object) {
    object.set_attribute(names::OBJECT_CATEGORY, ["Group"]);
    object.set_attribute(names::META_TYPE, [ObjectType::Group.as_str()]);
}

/// Handle to an object in the store.
pub type ObjectId = NodeIndex;

/// All directory objects of a load and the relationships between them.
#[derive(Debug)]
pub struct ObjectGraph {
    pub(crate) graph: DiGraph<Object, Relation>,

    /// Lowercased DN to object.
    dn_index: HashMap<String, ObjectId>,

    sid_index: HashMap<Sid, ObjectId>,

    /// Pwn edges already recorded, for deduplication.
    pwn_index: HashSet<(ObjectId, ObjectId, PwnMethod)>,

    sid_collisions: SidCollisionPolicy,
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::with_policy(SidCollisionPolicy::default())
    }

    pub fn with_policy(sid_collisions: SidCollisionPolicy) -> Self {
        Self {
            graph: DiGraph::new(),
            dn_index: HashMap::new(),
            sid_index: HashMap::new(),
            pwn_index: HashSet::new(),
            sid_collisions,
        }
    }

    /// Adds an object. Fails if its DN is already present.
    pub fn add(&mut self, object: Object) -> Result<ObjectId> {
        let key = object.dn().to_ascii_lowercase();
        if self.dn_index.contains_key(&key) {
            return Err(GraphError::DuplicateDistinguishedName(object.dn().to_string()));
        }

        let sid = object.sid().cloned();
        let id = self.graph.add_node(object);
        self.dn_index.insert(key, id);

        if let Some(sid) = sid {
            match self.sid_index.entry(sid) {
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
                Entry::Occupied(mut slot) => {
                    warn!(
                        "SID {} shared by {} and {}",
                        slot.key(),
                        self.graph[*slot.get()].dn(),
                        self.graph[id].dn()
                    );
                    if self.sid_collisions == SidCollisionPolicy::KeepLast {
                        slot.insert(id);
                    }
                }
            }
        }

        Ok(id)
    }

    pub fn find_by_dn(&self, dn: &str) -> Option<ObjectId> {
        self.dn_index.get(&dn.to_ascii_lowercase()).copied()
    }

    pub fn find_by_sid(&self, sid: &Sid) -> Option<ObjectId> {
        self.sid_index.get(sid).copied()
    }

    /// Looks up a SID, creating a placeholder object when it is unknown.
    pub fn find_or_add_by_sid(&mut self, sid: &Sid) -> ObjectId {
        if let Some(id) = self.find_by_sid(sid) {
            return id;
        }

        let mut placeholder = Object::new(format!("CN={},CN=Unresolved SIDs", sid));
        placeholder.set_attribute(names::NAME, [sid.to_string()]);
        placeholder.set_attribute(names::OBJECT_SID, [sid.as_bytes()]);

        let id = self.graph.add_node(placeholder);
        self.dn_index
            .insert(self.graph[id].dn().to_ascii_lowercase(), id);
        self.sid_index.insert(sid.clone(), id);
        id
    }

    /// Looks up a well-known group such as Everyone, creating it when
    /// missing. An existing object with that SID that is not typed as a
    /// group is retyped, since accounts get attached to it as members.
    pub fn find_or_add_builtin_group(&mut self, sid: &Sid, name: &str) -> ObjectId {
        let id = match self.find_by_sid(sid) {
            Some(id) => id,
            None => match self.add(builtin_group(sid, name)) {
                Ok(id) => return id,
                Err(e) => {
                    debug!("Falling back to a SID placeholder for {}: {}", name, e);
                    self.find_or_add_by_sid(sid)
                }
            },
        };

        let object = &mut self.graph[id];
        if object.object_type() != ObjectType::Group {
            debug!("Retyping {} as the {} group", object.dn(), name);
            mark_group(object);
        }
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.graph.node_weight(id)
    }

    /// Mutable access to an object. Its DN and `objectSid` are indexed and
    /// must not be changed through this reference.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.graph.node_weight_mut(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Iterates all objects in insertion order.
    pub fn all(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.graph
            .node_indices()
            .map(move |id| (id, &self.graph[id]))
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.graph.node_indices()
    }

    /// Objects matching a predicate, in insertion order.
    pub fn filter<F>(&self, predicate: F) -> Vec<ObjectId>
    where
        F: Fn(&Object) -> bool,
    {
        self.all()
            .filter(|(_, object)| predicate(object))
            .map(|(id, _)| id)
            .collect()
    }

    /// Runs `f` for every object, on the rayon pool when `parallel` is set.
    /// Results are in insertion order either way.
    pub(crate) fn map_objects<T, F>(&self, parallel: bool, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(ObjectId, &Object) -> T + Sync + Send,
    {
        let ids: Vec<ObjectId> = self.graph.node_indices().collect();
        if parallel {
            ids.into_par_iter()
                .map(|id| f(id, &self.graph[id]))
                .collect()
        } else {
            ids.into_iter().map(|id| f(id, &self.graph[id])).collect()
        }
    }

    /// Records that `member` belongs to `group`. Returns false if already known.
    pub fn add_membership(&mut self, member: ObjectId, group: ObjectId, direct: bool) -> bool {
        let existing = self
            .graph
            .edges_connecting(member, group)
            .find(|e| matches!(e.weight(), Relation::MemberOf { .. }))
            .map(|e| e.id());

        match existing {
            Some(edge) => {
                if direct {
                    self.graph[edge] = Relation::MemberOf { direct: true };
                }
                false
            }
            None => {
                self.graph
                    .add_edge(member, group, Relation::MemberOf { direct });
                true
            }
        }
    }

    /// Drops every membership edge, keeping pwn edges.
    pub fn clear_memberships(&mut self) {
        self.graph
            .retain_edges(|g, e| !matches!(g.edge_weight(e), Some(Relation::MemberOf { .. })));
    }

    /// Records that `attacker` can take control of `victim`.
    /// Returns false if the edge was already present.
    pub fn add_pwn(&mut self, attacker: ObjectId, victim: ObjectId, method: PwnMethod) -> bool {
        if !self.pwn_index.insert((attacker, victim, method)) {
            return false;
        }
        self.graph
            .add_edge(attacker, victim, Relation::Pwns(method));
        true
    }

    /// Groups this object belongs to, directly or through nesting.
    pub fn member_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.memberships(id, Direction::Outgoing, false)
    }

    /// Groups listing this object directly.
    pub fn direct_member_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.memberships(id, Direction::Outgoing, true)
    }

    /// Transitive members of a group.
    pub fn members(&self, id: ObjectId) -> Vec<ObjectId> {
        self.memberships(id, Direction::Incoming, false)
    }

    pub fn direct_members(&self, id: ObjectId) -> Vec<ObjectId> {
        self.memberships(id, Direction::Incoming, true)
    }

    fn memberships(&self, id: ObjectId, direction: Direction, direct_only: bool) -> Vec<ObjectId> {
        let mut result: Vec<ObjectId> = self
            .graph
            .edges_directed(id, direction)
            .filter_map(|e| match e.weight() {
                Relation::MemberOf { direct } if *direct || !direct_only => Some(match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                }),
                _ => None,
            })
            .collect();
        result.sort();
        result
    }

    /// Objects this one can take control of, with the method.
    pub fn can_pwn(&self, id: ObjectId) -> Vec<(PwnMethod, ObjectId)> {
        self.pwn_edges(id, Direction::Outgoing)
    }

    /// Principals that can take control of this object, with the method.
    pub fn pwnable_by(&self, id: ObjectId) -> Vec<(PwnMethod, ObjectId)> {
        self.pwn_edges(id, Direction::Incoming)
    }

    fn pwn_edges(&self, id: ObjectId, direction: Direction) -> Vec<(PwnMethod, ObjectId)> {
        let mut result: Vec<(PwnMethod, ObjectId)> = self
            .graph
            .edges_directed(id, direction)
            .filter_map(|e| match e.weight() {
                Relation::Pwns(method) => Some((
                    *method,
                    match direction {
                        Direction::Outgoing => e.target(),
                        Direction::Incoming => e.source(),
                    },
                )),
                _ => None,
            })
            .collect();
        result.sort();
        result
    }

    pub fn stats(&self) -> GraphStats {
        let memberships = self
            .graph
            .edge_weights()
            .filter(|r| matches!(r, Relation::MemberOf { .. }))
            .count();
        GraphStats {
            objects: self.graph.node_count(),
            memberships,
            pwn_edges: self.graph.edge_count() - memberships,
        }
    }

    pub fn count_by_type(&self) -> BTreeMap<ObjectType, usize> {
        let mut counts = BTreeMap::new();
        for object in self.graph.node_weights() {
            *counts.entry(object.object_type()).or_default() += 1;
        }
        counts
    }

    pub fn count_by_method(&self) -> BTreeMap<PwnMethod, usize> {
        let mut counts = BTreeMap::new();
        for relation in self.graph.edge_weights() {
            if let Relation::Pwns(method) = relation {
                *counts.entry(*method).or_default() += 1;
            }
        }
        counts
    }
}

/// Object and edge counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub objects: usize,
    pub memberships: usize,
    pub pwn_edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(dn: &str, sid: Option<&str>) -> Object {
        let mut o = Object::new(dn);
        if let Some(sid) = sid {
            let sid: Sid = sid.parse().unwrap();
            o.set_attribute(names::OBJECT_SID, [sid.as_bytes()]);
        }
        o
    }

    #[test]
    fn test_add_and_find() {
        let mut graph = ObjectGraph::new();
        let id = graph
            .add(object("CN=Alice,DC=corp", Some("S-1-5-21-1-2-3-1104")))
            .unwrap();

        assert_eq!(graph.find_by_dn("cn=alice,dc=CORP"), Some(id));
        assert_eq!(
            graph.find_by_sid(&"S-1-5-21-1-2-3-1104".parse().unwrap()),
            Some(id)
        );
        assert_eq!(graph.find_by_dn("CN=Bob,DC=corp"), None);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_builtin_group() {
        let mut graph = ObjectGraph::new();
        let everyone: Sid = "S-1-1-0".parse().unwrap();
        let id = graph.find_or_add_builtin_group(&everyone, "Everyone");

        let object = graph.get(id).unwrap();
        assert_eq!(object.dn(), "CN=Everyone,CN=microsoft-builtin");
        assert_eq!(object.object_type(), ObjectType::Group);
        assert_eq!(object.one_attribute(names::META_TYPE), "Group");
        assert_eq!(graph.find_or_add_builtin_group(&everyone, "Everyone"), id);
        assert_eq!(graph.len(), 1);

        // A plain SID placeholder gets retyped in place.
        let authenticated: Sid = "S-1-5-11".parse().unwrap();
        let placeholder = graph.find_or_add_by_sid(&authenticated);
        assert_eq!(graph.get(placeholder).unwrap().object_type(), ObjectType::Other);
        assert_eq!(
            graph.find_or_add_builtin_group(&authenticated, "Authenticated Users"),
            placeholder
        );
        assert_eq!(graph.get(placeholder).unwrap().object_type(), ObjectType::Group);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_duplicate_dn() {
        let mut graph = ObjectGraph::new();
        graph.add(object("CN=Alice,DC=corp", None)).unwrap();
        assert!(matches!(
            graph.add(object("cn=ALICE,dc=corp", None)),
            Err(GraphError::DuplicateDistinguishedName(_))
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_sid_collision_policy() {
        for (policy, expect_first) in [
            (SidCollisionPolicy::KeepFirst, true),
            (SidCollisionPolicy::KeepLast, false),
        ] {
            let mut graph = ObjectGraph::with_policy(policy);
            let a = graph.add(object("CN=A,DC=one", Some("S-1-5-32-544"))).unwrap();
            let b = graph.add(object("CN=A,DC=two", Some("S-1-5-32-544"))).unwrap();
            let found = graph.find_by_sid(&"S-1-5-32-544".parse().unwrap());
            assert_eq!(found, Some(if expect_first { a } else { b }));
        }
    }

    #[test]
    fn test_find_or_add_by_sid() {
        let mut graph = ObjectGraph::new();
        let sid: Sid = "S-1-5-21-9-9-9-500".parse().unwrap();

        let id = graph.find_or_add_by_sid(&sid);
        assert_eq!(graph.find_or_add_by_sid(&sid), id);
        assert_eq!(graph.len(), 1);

        let placeholder = graph.get(id).unwrap();
        assert_eq!(placeholder.sid(), Some(&sid));
        assert_eq!(graph.find_by_dn(placeholder.dn()), Some(id));
    }

    #[test]
    fn test_pwn_edges_symmetric_and_deduplicated() {
        let mut graph = ObjectGraph::new();
        let a = graph.add(object("CN=A", None)).unwrap();
        let b = graph.add(object("CN=B", None)).unwrap();

        assert!(graph.add_pwn(a, b, PwnMethod::GenericAll));
        assert!(!graph.add_pwn(a, b, PwnMethod::GenericAll));
        assert!(graph.add_pwn(a, b, PwnMethod::WriteDacl));

        assert_eq!(
            graph.can_pwn(a),
            vec![(PwnMethod::GenericAll, b), (PwnMethod::WriteDacl, b)]
        );
        assert_eq!(
            graph.pwnable_by(b),
            vec![(PwnMethod::GenericAll, a), (PwnMethod::WriteDacl, a)]
        );
        assert!(graph.can_pwn(b).is_empty());
        assert_eq!(graph.stats().pwn_edges, 2);
    }

    #[test]
    fn test_memberships() {
        let mut graph = ObjectGraph::new();
        let user = graph.add(object("CN=U", None)).unwrap();
        let inner = graph.add(object("CN=Inner", None)).unwrap();
        let outer = graph.add(object("CN=Outer", None)).unwrap();

        assert!(graph.add_membership(user, inner, true));
        assert!(graph.add_membership(user, outer, false));
        assert!(!graph.add_membership(user, inner, true));
        graph.add_pwn(user, outer, PwnMethod::Owns);

        assert_eq!(graph.member_of(user), vec![inner, outer]);
        assert_eq!(graph.direct_member_of(user), vec![inner]);
        assert_eq!(graph.members(outer), vec![user]);
        assert!(graph.direct_members(outer).is_empty());

        graph.clear_memberships();
        assert!(graph.member_of(user).is_empty());
        assert_eq!(graph.can_pwn(user), vec![(PwnMethod::Owns, outer)]);
    }

    #[test]
    fn test_filter() {
        let mut graph = ObjectGraph::new();
        let mut group = object("CN=G", None);
        group.set_attribute(names::OBJECT_CLASS, ["top", "group"]);
        let g = graph.add(group).unwrap();
        graph.add(object("CN=X", None)).unwrap();

        assert_eq!(
            graph.filter(|o| o.has_attribute_value(names::OBJECT_CLASS, "group")),
            vec![g]
        );
        assert_eq!(graph.count_by_type().get(&ObjectType::Group), Some(&1));
    }
}

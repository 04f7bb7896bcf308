//! Full analysis run.
//!
//! Stages run in a fixed order: load → well-known principals →
//! classification → membership → registry freeze → evaluation. Every stage
//! gets the store explicitly; nothing is global.

use crate::analyzer::{AnalyzerRegistry, EvaluationReport, FrozenRegistry, PwnAnalyzer};
use crate::builder::{self, Direction, MethodFilter, PwnGraph};
use crate::cache::CacheReader;
use crate::classify::{classify, Classification};
use crate::config::{AnalysisConfig, KnownSidPolicy};
use crate::error::{GraphError, Result};
use crate::export::ExportGraph;
use crate::graph::{builtin_group, ObjectGraph, ObjectId};
use crate::membership::{resolve_memberships, MembershipReport};
use chrono::{DateTime, Utc};
use pwnmap_core::{parse_query_strict, wellknown, ObjectType, Sid};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configures and runs an analysis.
#[derive(Debug)]
pub struct Pipeline {
    config: AnalysisConfig,
    registry: AnalyzerRegistry,
    now: DateTime<Utc>,
}

impl Pipeline {
    /// A pipeline with the built-in analyzers.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            registry: AnalyzerRegistry::with_builtin(),
            now: Utc::now(),
        }
    }

    /// Fixes the reference time used for age attributes.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Adds an analyzer ahead of evaluation.
    pub fn register(&mut self, analyzer: PwnAnalyzer) {
        self.registry.register(analyzer);
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Reads every cache file into a fresh store.
    ///
    /// A duplicate DN is fatal; the error names the offending object.
    pub fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ObjectGraph> {
        let mut graph = ObjectGraph::with_policy(self.config.sid_collisions);
        for path in paths {
            let path = path.as_ref();
            let before = graph.len();
            let mut reader = CacheReader::open(path)?;
            for raw in &mut reader {
                graph.add(raw?.into_object(self.config.import_all))?;
            }
            if reader.is_truncated() {
                warn!("{} is cut off, keeping the objects read before the cut", path.display());
            }
            info!("Loaded {} objects from {}", graph.len() - before, path.display());
        }
        Ok(graph)
    }

    /// Runs every stage after loading.
    ///
    /// `progress` receives the number of objects evaluated so far.
    pub fn run<P>(self, mut graph: ObjectGraph, progress: P) -> Analysis
    where
        P: Fn(usize) + Send + Sync,
    {
        let started = Instant::now();
        let parallel = self.config.parallel;

        if self.config.known_sids == KnownSidPolicy::IfMissing {
            inject_known_sids(&mut graph);
        }

        let classification = classify(&mut graph, self.now, parallel);
        let memberships = resolve_memberships(&mut graph, parallel);

        let mut registry = self.registry;
        for discovery in &classification.discoveries {
            registry.apply(discovery);
        }
        let registry = registry.freeze();

        let evaluation = registry.evaluate(&mut graph, parallel, progress);

        info!(
            "Analysis finished in {}ms: {} objects, {} pwn edges",
            started.elapsed().as_millis(),
            graph.len(),
            graph.stats().pwn_edges
        );

        Analysis {
            graph,
            classification,
            memberships,
            evaluation,
            registry,
            config: self.config,
        }
    }

    /// Loads `paths` and runs every stage.
    pub fn run_files<P, F>(self, paths: &[P], progress: F) -> Result<Analysis>
    where
        P: AsRef<Path>,
        F: Fn(usize) + Send + Sync,
    {
        let graph = self.load(paths)?;
        Ok(self.run(graph, progress))
    }
}

/// Adds placeholder objects for well-known principals missing from the
/// store. Returns how many were added.
pub fn inject_known_sids(graph: &mut ObjectGraph) -> usize {
    let mut added = 0;
    for (text, name) in wellknown::KNOWN_PRINCIPALS {
        let Ok(sid) = text.parse::<Sid>() else {
            continue;
        };
        if graph.find_by_sid(&sid).is_some() {
            continue;
        }

        match graph.add(builtin_group(&sid, name)) {
            Ok(_) => added += 1,
            Err(e) => debug!("Skipping well-known principal {}: {}", name, e),
        }
    }
    info!("Added {} well-known principals", added);
    added
}

/// A finished analysis: the populated store plus stage reports.
#[derive(Debug)]
pub struct Analysis {
    pub graph: ObjectGraph,
    pub classification: Classification,
    pub memberships: MembershipReport,
    pub evaluation: EvaluationReport,
    registry: FrozenRegistry,
    config: AnalysisConfig,
}

impl Analysis {
    pub fn registry(&self) -> &FrozenRegistry {
        &self.registry
    }

    /// Objects matching an LDAP filter.
    pub fn select(&self, query: &str) -> Result<Vec<ObjectId>> {
        let query = parse_query_strict(query)?;
        Ok(self.graph.filter(|object| query.evaluate(object)))
    }

    /// Resolves method names against the registry. An empty list means all.
    pub fn method_filter<S: AsRef<str>>(&self, names: &[S]) -> Result<MethodFilter> {
        if names.is_empty() {
            return Ok(MethodFilter::All);
        }
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.registry
                    .method_by_name(name)
                    .ok_or_else(|| GraphError::UnknownMethod(name.to_string()))
            })
            .collect::<Result<_>>()
    }

    /// Extracts the attack graph around `seeds`, bounded by the
    /// configured depth.
    pub fn build(&self, seeds: &[ObjectId], methods: &MethodFilter, direction: Direction) -> PwnGraph {
        builder::build(&self.graph, seeds, methods, direction, self.config.max_depth)
    }

    pub fn export(&self, result: &PwnGraph) -> ExportGraph {
        ExportGraph::new(&self.graph, result)
    }

    /// DNS name of the first loaded domain head, e.g. `corp.example.com`.
    pub fn domain(&self) -> Option<String> {
        let (_, head) = self
            .graph
            .all()
            .find(|(_, object)| object.object_type() == ObjectType::DomainDns)?;
        let labels: Vec<&str> = head
            .dn()
            .split(',')
            .filter_map(|rdn| {
                let (key, value) = rdn.trim().split_once('=')?;
                key.eq_ignore_ascii_case("DC").then_some(value)
            })
            .collect();
        (!labels.is_empty()).then(|| labels.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheWriter, RawObject};
    use crate::edge::PwnMethod;
    use pwnmap_core::names;
    use pwnmap_core::security::rights;
    use pwnmap_core::{Ace, AceType, Acl, Object, SecurityDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn descriptor(aces: Vec<Ace>) -> Vec<u8> {
        SecurityDescriptor {
            revision: 1,
            dacl: Some(Acl::new(aces)),
            ..Default::default()
        }
        .to_bytes()
    }

    fn write_cache(path: &Path) {
        let helpdesk: Sid = "S-1-5-21-1-2-3-1104".parse().unwrap();
        let mut writer = CacheWriter::create(path).unwrap();
        writer
            .write(
                &RawObject::new("DC=corp,DC=example")
                    .with(names::OBJECT_CLASS, ["top", "domain", "domainDNS"])
                    .with(names::OBJECT_SID, [b"S-1-5-21-1-2-3".to_vec()]),
            )
            .unwrap();
        writer
            .write(
                &RawObject::new("CN=Domain Admins,CN=Users,DC=corp,DC=example")
                    .with(names::NAME, ["Domain Admins"])
                    .with(names::OBJECT_CLASS, ["top", "group"])
                    .with(names::OBJECT_SID, [b"S-1-5-21-1-2-3-512".to_vec()])
                    .with(
                        names::NT_SECURITY_DESCRIPTOR,
                        [descriptor(vec![Ace::new(
                            AceType::AccessAllowed,
                            rights::GENERIC_ALL,
                            helpdesk.clone(),
                        )])],
                    ),
            )
            .unwrap();
        writer
            .write(
                &RawObject::new("CN=Helpdesk,CN=Users,DC=corp,DC=example")
                    .with(names::NAME, ["Helpdesk"])
                    .with(names::OBJECT_CLASS, ["top", "group"])
                    .with(names::OBJECT_SID, [helpdesk.as_bytes().to_vec()]),
            )
            .unwrap();
        writer
            .write(
                &RawObject::new("CN=Alice,CN=Users,DC=corp,DC=example")
                    .with(names::OBJECT_CLASS, ["top", "person", "user"])
                    .with(names::OBJECT_SID, [b"S-1-5-21-1-2-3-1105".to_vec()])
                    .with(names::MEMBER_OF, ["CN=Helpdesk,CN=Users,DC=corp,DC=example"]),
            )
            .unwrap();
        writer.finish().unwrap();
    }

    fn analysis() -> Analysis {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corp.pwnc");
        write_cache(&path);

        let config = AnalysisConfig {
            parallel: false,
            ..Default::default()
        };
        Pipeline::new(config).run_files(&[path], |_| {}).unwrap()
    }

    #[test]
    fn test_end_to_end() {
        let analysis = analysis();
        let graph = &analysis.graph;

        let admins = graph.find_by_dn("CN=Domain Admins,CN=Users,DC=corp,DC=example").unwrap();
        let helpdesk = graph.find_by_dn("CN=Helpdesk,CN=Users,DC=corp,DC=example").unwrap();
        let alice = graph.find_by_dn("CN=Alice,CN=Users,DC=corp,DC=example").unwrap();

        assert!(graph.pwnable_by(admins).contains(&(PwnMethod::GenericAll, helpdesk)));
        assert!(graph.can_pwn(alice).contains(&(PwnMethod::MemberOfGroup, helpdesk)));

        let seeds = analysis.select("(name=Domain Admins)").unwrap();
        assert_eq!(seeds, vec![admins]);

        let result = analysis.build(&seeds, &MethodFilter::All, Direction::Normal);
        assert!(result.contains(alice));
        assert_eq!(result.depth(alice), Some(2));
        assert_eq!(analysis.domain().as_deref(), Some("corp.example"));
    }

    #[test]
    fn test_known_sids_injected_once() {
        let analysis = analysis();
        let everyone = analysis.graph.find_by_sid(&wellknown::EVERYONE).unwrap();
        let object = analysis.graph.get(everyone).unwrap();
        assert_eq!(object.dn(), "CN=Everyone,CN=microsoft-builtin");
        assert_eq!(object.object_type(), ObjectType::Group);

        let mut graph = ObjectGraph::new();
        let first = inject_known_sids(&mut graph);
        assert_eq!(first, wellknown::KNOWN_PRINCIPALS.len());
        assert_eq!(inject_known_sids(&mut graph), 0);
    }

    #[test]
    fn test_known_sids_never() {
        let config = AnalysisConfig {
            known_sids: KnownSidPolicy::Never,
            parallel: false,
            ..Default::default()
        };
        let analysis = Pipeline::new(config).run(ObjectGraph::new(), |_| {});
        // Membership still creates the implicit groups it needs.
        assert!(analysis.graph.find_by_sid(&wellknown::EVERYONE).is_some());
        assert!(analysis.graph.find_by_sid(&wellknown::SYSTEM).is_none());
    }

    #[test]
    fn test_everyone_grants_without_known_sids() {
        let mut graph = ObjectGraph::new();
        let mut user = Object::new("CN=Bob,CN=Users,DC=corp,DC=example");
        user.set_attribute(names::OBJECT_CLASS, ["top", "person", "user"]);
        user.set_attribute(names::OBJECT_SID, [b"S-1-5-21-1-2-3-1106".to_vec()]);
        let user = graph.add(user).unwrap();

        let mut victim = Object::new("CN=Payroll,CN=Users,DC=corp,DC=example");
        victim.set_attribute(names::OBJECT_CLASS, ["top", "group"]);
        victim.set_attribute(names::OBJECT_SID, [b"S-1-5-21-1-2-3-1107".to_vec()]);
        victim.set_attribute(
            names::NT_SECURITY_DESCRIPTOR,
            [descriptor(vec![Ace::new(
                AceType::AccessAllowed,
                rights::GENERIC_ALL,
                wellknown::EVERYONE.clone(),
            )])],
        );
        let victim = graph.add(victim).unwrap();

        let config = AnalysisConfig {
            known_sids: KnownSidPolicy::Never,
            parallel: false,
            ..Default::default()
        };
        let analysis = Pipeline::new(config).run(graph, |_| {});
        let graph = &analysis.graph;

        let everyone = graph.find_by_sid(&wellknown::EVERYONE).unwrap();
        let object = graph.get(everyone).unwrap();
        assert_eq!(object.object_type(), ObjectType::Group);
        assert_eq!(object.one_attribute(names::META_TYPE), "Group");

        assert!(graph.can_pwn(user).contains(&(PwnMethod::MemberOfGroup, everyone)));
        assert!(graph.pwnable_by(victim).contains(&(PwnMethod::GenericAll, everyone)));

        let seeds = vec![victim];
        let attack = analysis.build(&seeds, &MethodFilter::All, Direction::Normal);
        assert!(attack.contains(user));
    }

    #[test]
    fn test_progress_and_methods() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corp.pwnc");
        write_cache(&path);

        let seen = AtomicUsize::new(0);
        let pipeline = Pipeline::new(AnalysisConfig::default());
        let analysis = pipeline
            .run_files(&[&path], |n| {
                seen.fetch_max(n, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), analysis.evaluation.objects);

        let filter = analysis.method_filter(&["addmember", "Owns"]).unwrap();
        assert!(filter.allows(PwnMethod::AddMember));
        assert!(!filter.allows(PwnMethod::GenericAll));
        assert!(matches!(
            analysis.method_filter(&["Teleport"]),
            Err(GraphError::UnknownMethod(_))
        ));
        assert!(matches!(
            analysis.select("(name=Domain Admins"),
            Err(GraphError::Query(_))
        ));
    }

    #[test]
    fn test_duplicate_dn_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dup.pwnc");
        let mut writer = CacheWriter::create(&path).unwrap();
        writer.write(&RawObject::new("CN=Twice")).unwrap();
        writer.write(&RawObject::new("cn=twice")).unwrap();
        writer.finish().unwrap();

        let pipeline = Pipeline::new(AnalysisConfig::default());
        assert!(matches!(
            pipeline.load(&[path]),
            Err(GraphError::DuplicateDistinguishedName(_))
        ));
    }
}

//! Rule framework for inferring pwn edges.
//!
//! Analyzers are registered on an [`AnalyzerRegistry`], which is frozen
//! into a [`FrozenRegistry`] before evaluation. The frozen registry has no
//! way to add rules, so everything discovered during classification must
//! be applied before the barrier.
//!
//! An analyzer looks at one object (the victim) and returns the principals
//! that can take control of it. Evaluation of objects can run on the rayon
//! pool; the resulting edges are applied by a single writer afterwards.

use crate::analyzers;
use crate::classify::Discovery;
use crate::edge::PwnMethod;
use crate::graph::{ObjectGraph, ObjectId};
use pwnmap_core::{wellknown, Sid};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A principal returned by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Counterpart {
    Object(ObjectId),
    /// Resolved, or created as a placeholder, when edges are applied.
    Sid(Sid),
}

type AnalyzeFn = dyn Fn(&ObjectGraph, ObjectId) -> Vec<Counterpart> + Send + Sync;

/// A method tag and the function that finds who can use it.
#[derive(Clone)]
pub struct PwnAnalyzer {
    method: PwnMethod,
    analyze: Arc<AnalyzeFn>,
}

impl PwnAnalyzer {
    pub fn new<F>(method: PwnMethod, analyze: F) -> Self
    where
        F: Fn(&ObjectGraph, ObjectId) -> Vec<Counterpart> + Send + Sync + 'static,
    {
        Self {
            method,
            analyze: Arc::new(analyze),
        }
    }

    pub fn method(&self) -> PwnMethod {
        self.method
    }

    /// Principals that can pwn `victim` with this method.
    pub fn analyze(&self, graph: &ObjectGraph, victim: ObjectId) -> Vec<Counterpart> {
        (self.analyze)(graph, victim)
    }
}

impl fmt::Debug for PwnAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PwnAnalyzer")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Analyzers collected before evaluation.
#[derive(Debug, Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<PwnAnalyzer>,
}

impl AnalyzerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in analyzer.
    pub fn with_builtin() -> Self {
        Self {
            analyzers: analyzers::builtin(),
        }
    }

    pub fn register(&mut self, analyzer: PwnAnalyzer) {
        debug!("Registered analyzer for {}", analyzer.method());
        self.analyzers.push(analyzer);
    }

    /// Registers the analyzers a classification discovery calls for.
    pub fn apply(&mut self, discovery: &Discovery) {
        match discovery {
            Discovery::LapsSchema { attribute } => {
                self.register(analyzers::read_laps_password(*attribute))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Ends registration.
    pub fn freeze(self) -> FrozenRegistry {
        info!("Analyzer registry frozen with {} analyzers", self.analyzers.len());
        FrozenRegistry {
            analyzers: self.analyzers,
        }
    }
}

/// Counts from one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub objects: usize,
    /// Counterparts returned by analyzers, before filtering.
    pub counterparts: usize,
    pub edges_added: usize,
    /// Counterparts equal to the victim or sharing its SID.
    pub skipped_self: usize,
    /// Counterparts that are Self, Creator Owner or SYSTEM.
    pub skipped_ignored: usize,
    /// Edges that were already recorded.
    pub duplicates: usize,
}

/// Analyzers ready for evaluation. Registration is closed.
#[derive(Debug)]
pub struct FrozenRegistry {
    analyzers: Vec<PwnAnalyzer>,
}

impl FrozenRegistry {
    /// Registered methods in registration order, without repeats.
    pub fn methods(&self) -> Vec<PwnMethod> {
        let mut methods = Vec::new();
        for analyzer in &self.analyzers {
            if !methods.contains(&analyzer.method) {
                methods.push(analyzer.method);
            }
        }
        methods
    }

    /// Looks up a registered method by name, ignoring case.
    pub fn method_by_name(&self, name: &str) -> Option<PwnMethod> {
        self.analyzers
            .iter()
            .map(|a| a.method)
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Runs every analyzer on every object and records the edges.
    ///
    /// `progress` receives the number of objects processed so far and may
    /// be called from worker threads.
    pub fn evaluate<P>(&self, graph: &mut ObjectGraph, parallel: bool, progress: P) -> EvaluationReport
    where
        P: Fn(usize) + Send + Sync,
    {
        let processed = AtomicUsize::new(0);
        let found: Vec<(ObjectId, Vec<(PwnMethod, Counterpart)>)> = {
            let graph: &ObjectGraph = graph;
            graph.map_objects(parallel, |victim, _| {
                let mut counterparts = Vec::new();
                for analyzer in &self.analyzers {
                    for counterpart in analyzer.analyze(graph, victim) {
                        counterparts.push((analyzer.method, counterpart));
                    }
                }
                progress(processed.fetch_add(1, Ordering::Relaxed) + 1);
                (victim, counterparts)
            })
        };

        let mut report = EvaluationReport {
            objects: found.len(),
            ..Default::default()
        };

        for (victim, counterparts) in found {
            let victim_sid = graph.get(victim).and_then(|o| o.sid()).cloned();

            for (method, counterpart) in counterparts {
                report.counterparts += 1;

                let attacker = match counterpart {
                    Counterpart::Object(id) => id,
                    Counterpart::Sid(sid) => {
                        // Checked before resolving so ignored principals
                        // never get placeholder objects.
                        if wellknown::is_ignored_principal(&sid) {
                            report.skipped_ignored += 1;
                            continue;
                        }
                        if victim_sid.as_ref() == Some(&sid) {
                            report.skipped_self += 1;
                            continue;
                        }
                        graph.find_or_add_by_sid(&sid)
                    }
                };

                let attacker_sid = graph.get(attacker).and_then(|o| o.sid());
                let same_sid = attacker_sid.is_some() && attacker_sid == victim_sid.as_ref();
                if attacker == victim || same_sid {
                    report.skipped_self += 1;
                    continue;
                }
                if attacker_sid.map_or(false, wellknown::is_ignored_principal) {
                    report.skipped_ignored += 1;
                    continue;
                }

                if graph.add_pwn(attacker, victim, method) {
                    report.edges_added += 1;
                } else {
                    report.duplicates += 1;
                }
            }
        }

        info!("Detected {} ways to pwn objects", report.edges_added);
        report
    }
}

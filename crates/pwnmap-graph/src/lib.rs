//! pwnmap graph - who can take over what
//!
//! This crate loads directory objects into a single store and derives the
//! relationships between them:
//!
//! - group membership, including nesting and primary groups
//! - "pwn" edges, where one principal can take control of another object
//!   through its security descriptor, group membership or an extended right
//! - attack graphs extracted from those edges around a set of targets
//!
//! # Architecture
//!
//! `ObjectGraph` is a petgraph `DiGraph` of objects with DN and SID indexes.
//! Analysis runs as a [`Pipeline`]: classification, membership resolution
//! and analyzer evaluation each compute per-object results in parallel and
//! apply them with a single writer.
//!
//! # Example
//!
//! ```no_run
//! use pwnmap_graph::{AnalysisConfig, Direction, MethodFilter, Pipeline};
//!
//! let pipeline = Pipeline::new(AnalysisConfig::default());
//! let analysis = pipeline.run_files(&["corp.pwnc"], |_| {}).unwrap();
//!
//! let admins = analysis.select("(name=Domain Admins)").unwrap();
//! let attack = analysis.build(&admins, &MethodFilter::All, Direction::Normal);
//! println!("{} principals can reach Domain Admins", attack.node_count() - admins.len());
//! ```

mod analyzer;
pub mod analyzers;
mod builder;
pub mod cache;
mod classify;
pub mod config;
mod edge;
mod error;
mod export;
mod graph;
mod membership;
mod pipeline;

pub use analyzer::{AnalyzerRegistry, Counterpart, EvaluationReport, FrozenRegistry, PwnAnalyzer};
pub use builder::{build, Direction, MethodFilter, PwnGraph};
pub use cache::{CacheReader, CacheWriter, RawObject};
pub use classify::{
    classify, Classification, Discovery, SchemaIndex, TrustDirection, TrustInfo,
    LAPS_PASSWORD_ATTRIBUTE,
};
pub use config::{AnalysisConfig, KnownSidPolicy, SidCollisionPolicy};
pub use edge::{PwnMethod, Relation};
pub use error::{GraphError, Result};
pub use export::{ExportEdge, ExportFormat, ExportGraph, ExportNode};
pub use graph::{builtin_group, GraphStats, ObjectGraph, ObjectId, BUILTIN_CONTAINER};
pub use membership::{resolve_memberships, MembershipReport};
pub use pipeline::{inject_known_sids, Analysis, Pipeline};

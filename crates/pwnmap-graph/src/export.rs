//! Attack graph serialization.

use crate::builder::PwnGraph;
use crate::error::{GraphError, Result};
use crate::graph::{ObjectGraph, ObjectId};
use pwnmap_core::ObjectType;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Output formats for [`ExportGraph::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Graphviz,
    #[default]
    CytoscapeJs,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Graphviz => "dot",
            ExportFormat::CytoscapeJs => "json",
        }
    }

    /// Conventional file name for a domain's export.
    pub fn default_file_name(&self, domain: &str) -> String {
        match self {
            ExportFormat::Graphviz => format!("pwnmap-{}.dot", domain),
            ExportFormat::CytoscapeJs => format!("cytoscape-js-{}.json", domain),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Graphviz => write!(f, "graphviz"),
            ExportFormat::CytoscapeJs => write!(f, "cytoscapejs"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "graphviz" | "dot" => Ok(ExportFormat::Graphviz),
            "cytoscapejs" | "cytoscape" => Ok(ExportFormat::CytoscapeJs),
            _ => Err(GraphError::UnknownFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportNode {
    pub id: usize,
    pub label: String,
    #[serde(rename = "type", serialize_with = "type_name")]
    pub object_type: ObjectType,
    pub distinguished_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEdge {
    pub source: usize,
    pub target: usize,
    pub methods: Vec<String>,
}

/// A self-contained, labelled copy of an attack graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportGraph {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

impl ExportGraph {
    /// Resolves labels and types for every node of `result` from the store.
    pub fn new(graph: &ObjectGraph, result: &PwnGraph) -> Self {
        let nodes = result
            .objects()
            .filter_map(|id| {
                let object = graph.get(id)?;
                Some(ExportNode {
                    id: id.index(),
                    label: object.label().into_owned(),
                    object_type: object.object_type(),
                    distinguished_name: object.dn().to_string(),
                })
            })
            .collect();

        let mut edges: Vec<ExportEdge> = result
            .edges()
            .map(|(attacker, victim, methods)| ExportEdge {
                source: attacker.index(),
                target: victim.index(),
                methods: methods.iter().map(|m| m.to_string()).collect(),
            })
            .collect();
        edges.sort_by_key(|e| (e.source, e.target));

        Self { nodes, edges }
    }

    pub fn node(&self, id: ObjectId) -> Option<&ExportNode> {
        self.nodes.iter().find(|n| n.id == id.index())
    }

    /// Graphviz DOT text.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pwnmap {\n");
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "  n{} [label=\"{}\" shape={} class=\"{}\" tooltip=\"{}\"];",
                node.id,
                escape_dot(&node.label),
                shape(node.object_type),
                node.object_type,
                escape_dot(&node.distinguished_name)
            );
        }
        for edge in &self.edges {
            let _ = writeln!(
                out,
                "  n{} -> n{} [label=\"{}\"];",
                edge.source,
                edge.target,
                escape_dot(&edge.methods.join(", "))
            );
        }
        out.push_str("}\n");
        out
    }

    /// Cytoscape.js elements array.
    pub fn to_cytoscape_json(&self) -> serde_json::Value {
        let nodes = self.nodes.iter().map(|node| {
            serde_json::json!({
                "group": "nodes",
                "data": {
                    "id": format!("n{}", node.id),
                    "label": node.label,
                    "type": node.object_type.as_str(),
                    "distinguishedName": node.distinguished_name,
                }
            })
        });
        let edges = self.edges.iter().map(|edge| {
            serde_json::json!({
                "group": "edges",
                "data": {
                    "id": format!("e{}-{}", edge.source, edge.target),
                    "source": format!("n{}", edge.source),
                    "target": format!("n{}", edge.target),
                    "methods": edge.methods,
                }
            })
        });
        serde_json::Value::Array(nodes.chain(edges).collect())
    }

    pub fn render(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Graphviz => Ok(self.to_dot()),
            ExportFormat::CytoscapeJs => Ok(serde_json::to_string_pretty(&self.to_cytoscape_json())?),
        }
    }

    pub fn write(&self, path: &Path, format: ExportFormat) -> Result<()> {
        fs::write(path, self.render(format)?)?;
        info!(
            "Exported {} nodes and {} edges to {}",
            self.nodes.len(),
            self.edges.len(),
            path.display()
        );
        Ok(())
    }
}

/// Both exporters name object types the way they are displayed.
fn type_name<S>(kind: &ObjectType, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(kind.as_str())
}

fn shape(kind: ObjectType) -> &'static str {
    match kind {
        ObjectType::User | ObjectType::ManagedServiceAccount => "ellipse",
        ObjectType::Group => "diamond",
        ObjectType::Computer => "box",
        ObjectType::DomainDns => "doubleoctagon",
        _ => "oval",
    }
}

fn escape_dot(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

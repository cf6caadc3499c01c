//! Serialized graph description sent to the device.
//!
//! A pure value: node ids, kinds, properties, resolved port schemas and the
//! link list, with no host addresses. Nodes are ordered by id and links by
//! (source node, source port, target node, target port), so two
//! serializations of the same pipeline are byte-identical.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::NodeKind;
use crate::pipeline::port::{PortDescription, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Pipeline-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalProperties {
    pub pipeline_name: Option<String>,
    pub pipeline_version: Option<String>,
    /// Clock of the device's main processor.
    pub leon_os_frequency_hz: f64,
}

impl Default for GlobalProperties {
    fn default() -> Self {
        Self {
            pipeline_name: None,
            pipeline_version: None,
            leon_os_frequency_hz: 700_000_000.0,
        }
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    pub out_node: NodeId,
    pub out_port: String,
    pub in_node: NodeId,
    pub in_port: String,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.out_node.0, self.out_port, self.in_node.0, self.in_port
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: NodeId,
    pub name: String,
    pub properties: NodeKind,
    pub inputs: Vec<PortDescription>,
    pub outputs: Vec<PortDescription>,
}

/// Host streams declared by a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamNames {
    /// Host to device (`XLinkIn`).
    pub inputs: BTreeSet<String>,
    /// Device to host (`XLinkOut`).
    pub outputs: BTreeSet<String>,
}

impl StreamNames {
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().chain(self.outputs.iter()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub global: GlobalProperties,
    pub nodes: Vec<NodeDescription>,
    pub links: Vec<Link>,
}

impl GraphDescription {
    /// MessagePack encoding with named fields.
    pub fn to_bytes(&self) -> PipelineResult<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    /// Human-readable form for logs and diagnostics.
    pub fn to_json_pretty(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Serialization(e.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeDescription> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn stream_names(&self) -> StreamNames {
        let mut names = StreamNames::default();
        for node in &self.nodes {
            match &node.properties {
                NodeKind::XLinkIn(n) => {
                    names.inputs.insert(n.stream_name.clone());
                }
                NodeKind::XLinkOut(n) => {
                    names.outputs.insert(n.stream_name.clone());
                }
                _ => {}
            }
        }
        names
    }

    /// `XLinkOut` streams fed directly by the `XLinkIn` node bound to `stream`.
    pub fn direct_routes(&self, stream: &str) -> Vec<String> {
        let source = self.nodes.iter().find(|n| {
            matches!(&n.properties, NodeKind::XLinkIn(x) if x.stream_name == stream)
        });
        let Some(source) = source else {
            return Vec::new();
        };
        self.links
            .iter()
            .filter(|l| l.out_node == source.id)
            .filter_map(|l| match self.node(l.in_node).map(|n| &n.properties) {
                Some(NodeKind::XLinkOut(x)) => Some(x.stream_name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Structural consistency check: every link endpoint names an existing
    /// node and a port of the right direction.
    pub fn check_structure(&self) -> Result<(), String> {
        let mut ids = BTreeSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(format!("duplicate node id {}", node.id.0));
            }
        }
        for link in &self.links {
            let endpoint = |id: NodeId, port: &str, dir: PortDirection| -> Result<(), String> {
                let node = self
                    .node(id)
                    .ok_or_else(|| format!("link {} references missing node {}", link, id.0))?;
                let ports = match dir {
                    PortDirection::Input => &node.inputs,
                    PortDirection::Output => &node.outputs,
                };
                if ports.iter().any(|p| p.name == port) {
                    Ok(())
                } else {
                    Err(format!("link {} references missing port {}", link, port))
                }
            };
            endpoint(link.out_node, &link.out_port, PortDirection::Output)?;
            endpoint(link.in_node, &link.in_port, PortDirection::Input)?;
        }
        Ok(())
    }
}

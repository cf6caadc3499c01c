//! The pipeline graph: an owned DAG of nodes and links.
//!
//! Every mutating call validates before touching the graph, so a failed call
//! leaves it unmodified. `serialize` re-validates everything wholesale because
//! node properties (e.g. an `XLinkOut` datatype filter) can change the port
//! sets after links were made.

use crate::pipeline::description::{
    GlobalProperties, GraphDescription, Link, NodeDescription, StreamNames,
};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{Node, NodeHandle, NodeKind, NodeType};
use crate::pipeline::nodes::validate_stream_name;
use crate::pipeline::port::{
    datatypes_intersect, InputQueueConfig, InputRef, OutputRef, PortDescription, PortDescriptor,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeSet<Link>,
    next_id: NodeId,
    global: GlobalProperties,
    frozen: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_mutable(&self) -> PipelineResult<()> {
        if self.frozen {
            Err(PipelineError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Mark the pipeline as submitted. All later mutations fail with `Frozen`.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn global_properties(&self) -> &GlobalProperties {
        &self.global
    }

    pub fn set_global_properties(&mut self, global: GlobalProperties) -> PipelineResult<()> {
        self.ensure_mutable()?;
        if !(global.leon_os_frequency_hz > 0.0) {
            return Err(PipelineError::InvalidProperty {
                node: "Pipeline".into(),
                message: "processor frequency must be positive".into(),
            });
        }
        self.global = global;
        Ok(())
    }

    // ─── Nodes ───────────────────────────────────────────────────────────

    /// Add a node with the given properties and return a typed handle to it.
    pub fn create<N: NodeType>(&mut self, properties: N) -> PipelineResult<NodeHandle<N>> {
        self.create_node(properties.into()).map(NodeHandle::new)
    }

    /// Untyped form of [`Pipeline::create`].
    pub fn create_node(&mut self, kind: NodeKind) -> PipelineResult<NodeId> {
        self.ensure_mutable()?;
        check_properties(&kind)?;
        self.check_stream_name(&kind, None)?;

        let id = self.next_id;
        self.next_id = id.next();
        tracing::trace!(node = id.0, kind = kind.name(), "node created");
        self.nodes.insert(id, Node::new(id, kind));
        Ok(id)
    }

    /// Remove a node and every link touching it.
    pub fn remove_node(&mut self, id: NodeId) -> PipelineResult<NodeKind> {
        self.ensure_mutable()?;
        let node = self.nodes.remove(&id).ok_or(PipelineError::UnknownNode(id))?;
        self.links.retain(|l| l.out_node != id && l.in_node != id);
        Ok(node.kind)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Typed read access to a node's properties.
    pub fn properties<N: NodeType>(&self, handle: &NodeHandle<N>) -> Option<&N> {
        self.nodes.get(&handle.id()).and_then(|n| N::from_kind(&n.kind))
    }

    /// Modify a node's properties. The change is validated on a copy and only
    /// committed if the new values are valid.
    pub fn update<N: NodeType>(
        &mut self,
        handle: &NodeHandle<N>,
        f: impl FnOnce(&mut N),
    ) -> PipelineResult<()> {
        self.update_node(handle.id(), |kind| {
            if let Some(props) = N::from_kind_mut(kind) {
                f(props);
            }
        })
    }

    /// Untyped form of [`Pipeline::update`]. The closure may not change the
    /// node's kind.
    pub fn update_node(&mut self, id: NodeId, f: impl FnOnce(&mut NodeKind)) -> PipelineResult<()> {
        self.ensure_mutable()?;
        let node = self.nodes.get(&id).ok_or(PipelineError::UnknownNode(id))?;
        let mut kind = node.kind.clone();
        f(&mut kind);
        if std::mem::discriminant(&kind) != std::mem::discriminant(&node.kind) {
            return Err(PipelineError::InvalidProperty {
                node: node.name().into(),
                message: "node kind cannot change".into(),
            });
        }
        check_properties(&kind)?;
        self.check_stream_name(&kind, Some(id))?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = kind;
        }
        Ok(())
    }

    /// Override the device-side queueing of an input port.
    pub fn set_input_queue(
        &mut self,
        input: InputRef,
        blocking: bool,
        queue_size: u32,
    ) -> PipelineResult<()> {
        self.ensure_mutable()?;
        let node = self.nodes.get(&input.node).ok_or(PipelineError::UnknownNode(input.node))?;
        lookup_input(node, input.port)?;
        if queue_size == 0 {
            return Err(PipelineError::InvalidProperty {
                node: node.name().into(),
                message: format!("queue size of {} must be non-zero", input.port),
            });
        }
        if let Some(node) = self.nodes.get_mut(&input.node) {
            node.input_queues.insert(
                input.port.to_string(),
                InputQueueConfig {
                    blocking,
                    queue_size,
                },
            );
        }
        Ok(())
    }

    fn check_stream_name(&self, kind: &NodeKind, exclude: Option<NodeId>) -> PipelineResult<()> {
        let Some(name) = kind.stream_name() else {
            return Ok(());
        };
        validate_stream_name(name)?;
        let taken = self
            .nodes
            .values()
            .filter(|n| Some(n.id) != exclude)
            .any(|n| n.kind.stream_name() == Some(name));
        if taken {
            return Err(PipelineError::DuplicateStreamName(name.to_string()));
        }
        Ok(())
    }

    // ─── Links ───────────────────────────────────────────────────────────

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Connect an output port to an input port.
    pub fn link(&mut self, out: OutputRef, inp: InputRef) -> PipelineResult<()> {
        self.ensure_mutable()?;
        let link = Link {
            out_node: out.node,
            out_port: out.port.to_string(),
            in_node: inp.node,
            in_port: inp.port.to_string(),
        };
        self.check_link(&link)?;
        if self.links.contains(&link) {
            return Err(PipelineError::DuplicateLink(link.to_string()));
        }
        self.check_capacity(&link, self.links.iter())?;
        if self.reachable(inp.node, out.node) {
            return Err(PipelineError::CycleDetected(link.to_string()));
        }
        tracing::trace!(link = %link, "link created");
        self.links.insert(link);
        Ok(())
    }

    pub fn unlink(&mut self, out: OutputRef, inp: InputRef) -> PipelineResult<()> {
        self.ensure_mutable()?;
        let link = Link {
            out_node: out.node,
            out_port: out.port.to_string(),
            in_node: inp.node,
            in_port: inp.port.to_string(),
        };
        if self.links.remove(&link) {
            Ok(())
        } else {
            Err(PipelineError::UnknownLink(link.to_string()))
        }
    }

    /// Endpoint existence, direction and datatype compatibility.
    fn check_link(&self, link: &Link) -> PipelineResult<()> {
        let src = self
            .nodes
            .get(&link.out_node)
            .ok_or(PipelineError::UnknownNode(link.out_node))?;
        let dst = self
            .nodes
            .get(&link.in_node)
            .ok_or(PipelineError::UnknownNode(link.in_node))?;
        let out_port = lookup_output(src, &link.out_port)?;
        let in_port = lookup_input(dst, &link.in_port)?;

        if !datatypes_intersect(&out_port.types, &in_port.types) {
            return Err(PipelineError::IncompatibleTypes {
                from: format!("{}[{}].{}", src.name(), src.id.0, out_port.name),
                to: format!("{}[{}].{}", dst.name(), dst.id.0, in_port.name),
                produced: out_port.types.iter().map(|t| t.datatype).collect(),
                accepted: in_port.types.iter().map(|t| t.datatype).collect(),
            });
        }
        Ok(())
    }

    /// Link multiplicity limits, counting `link` against `others`.
    fn check_capacity<'a>(
        &self,
        link: &Link,
        others: impl Iterator<Item = &'a Link> + Clone,
    ) -> PipelineResult<()> {
        let (Some(src), Some(dst)) = (self.nodes.get(&link.out_node), self.nodes.get(&link.in_node))
        else {
            return Ok(());
        };
        let out_port = lookup_output(src, &link.out_port)?;
        let in_port = lookup_input(dst, &link.in_port)?;

        let fan_in = others
            .clone()
            .filter(|l| *l != link && l.in_node == link.in_node && l.in_port == link.in_port)
            .count();
        if in_port.kind.max_links().is_some_and(|max| fan_in >= max) {
            return Err(PipelineError::CapacityExceeded {
                port: format!("{}[{}].{}", dst.name(), dst.id.0, in_port.name),
            });
        }
        let fan_out = others
            .filter(|l| *l != link && l.out_node == link.out_node && l.out_port == link.out_port)
            .count();
        if out_port.kind.max_links().is_some_and(|max| fan_out >= max) {
            return Err(PipelineError::CapacityExceeded {
                port: format!("{}[{}].{}", src.name(), src.id.0, out_port.name),
            });
        }
        Ok(())
    }

    /// True if `to` can be reached from `from` by following links.
    fn reachable(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.links.iter().filter(|l| l.out_node == id).map(|l| l.in_node));
        }
        false
    }

    // ─── Validation & serialization ─────────────────────────────────────

    /// Node ids in dependency order (Kahn's algorithm).
    ///
    /// Fails with `CycleDetected` if the links do not form a DAG.
    pub fn topological_order(&self) -> PipelineResult<Vec<NodeId>> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|&id| (id, 0)).collect();
        let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for link in &self.links {
            adj.entry(link.out_node).or_default().push(link.in_node);
            if let Some(d) = in_degree.get_mut(&link.in_node) {
                *d += 1;
            }
        }

        // BTreeMap iteration keeps the order deterministic
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in adj.get(&id).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = in_degree
                .iter()
                .filter(|&(_, &d)| d > 0)
                .map(|(id, _)| id.0)
                .min()
                .unwrap_or_default();
            return Err(PipelineError::CycleDetected(format!("through node {}", stuck)));
        }
        Ok(order)
    }

    /// Check every invariant of the graph as it stands now.
    pub fn validate(&self) -> PipelineResult<()> {
        for node in self.nodes.values() {
            check_properties(&node.kind)?;
            self.check_stream_name(&node.kind, Some(node.id))?;
        }
        for link in &self.links {
            self.check_link(link)?;
            self.check_capacity(link, self.links.iter())?;
        }
        self.topological_order()?;
        Ok(())
    }

    pub fn stream_names(&self) -> StreamNames {
        let mut names = StreamNames::default();
        for node in self.nodes.values() {
            match &node.kind {
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

    /// Validate and produce the device-consumable description.
    pub fn serialize(&self) -> PipelineResult<GraphDescription> {
        self.validate()?;
        let nodes = self
            .nodes
            .values()
            .map(|node| NodeDescription {
                id: node.id,
                name: node.name().to_string(),
                properties: node.kind.clone(),
                inputs: node
                    .kind
                    .inputs()
                    .iter()
                    .map(|p| PortDescription::from_descriptor(p, node.input_queue(p)))
                    .collect(),
                outputs: node
                    .kind
                    .outputs()
                    .iter()
                    .map(|p| PortDescription::from_descriptor(p, p.queue))
                    .collect(),
            })
            .collect();
        Ok(GraphDescription {
            global: self.global.clone(),
            nodes,
            links: self.links.iter().cloned().collect(),
        })
    }
}

fn check_properties(kind: &NodeKind) -> PipelineResult<()> {
    kind.validate()
        .map_err(|message| PipelineError::InvalidProperty {
            node: kind.name().to_string(),
            message,
        })
}

fn lookup_output(node: &Node, port: &str) -> PipelineResult<PortDescriptor> {
    if let Some(p) = node.kind.output(port) {
        return Ok(p);
    }
    if node.kind.input(port).is_some() {
        return Err(PipelineError::WrongDirection {
            node: node.id,
            port: port.to_string(),
        });
    }
    Err(PipelineError::UnknownPort {
        node: node.id,
        port: port.to_string(),
    })
}

fn lookup_input(node: &Node, port: &str) -> PipelineResult<PortDescriptor> {
    if let Some(p) = node.kind.input(port) {
        return Ok(p);
    }
    if node.kind.output(port).is_some() {
        return Err(PipelineError::WrongDirection {
            node: node.id,
            port: port.to_string(),
        });
    }
    Err(PipelineError::UnknownPort {
        node: node.id,
        port: port.to_string(),
    })
}

//! Audio graph - owns nodes and drives block processing.

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::graph::NodeIndex;

use crate::node::{AudioNode, NodeId, ProcessContext, BLOCK_LEN};

// Adapter so heterogeneous boxed nodes satisfy dasp_graph's node trait.
struct DaspAdapter {
    node: Box<dyn AudioNode>,
    ctx: ProcessContext,
}

impl dasp_graph::Node for DaspAdapter {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        self.node.process(&self.ctx, inputs, outputs);
    }
}

type InnerGraph = petgraph::graph::Graph<NodeData<DaspAdapter>, ()>;

/// An audio processing graph at a fixed sample rate.
///
/// Nodes are added, connected, and removed by [`NodeId`]; processing renders
/// one 64-sample block per [`process`](Self::process) call, pulled from the
/// terminal node.
pub struct AudioGraph {
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    terminal: Option<NodeIndex>,
}

impl AudioGraph {
    /// Create a new graph with the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: InnerGraph::with_capacity(8, 8),
            processor: Processor::with_capacity(8),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: BLOCK_LEN,
            },
            node_indices: HashMap::new(),
            next_node_id: 0,
            terminal: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add a node, returning its id for connections and removal.
    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let num_outputs = node.num_outputs();
        let adapter = DaspAdapter {
            node: Box::new(node),
            ctx: self.ctx,
        };

        let node_data = match num_outputs {
            2 => NodeData::new2(adapter),
            // 0 outputs = sink, but dasp_graph still needs a buffer for inputs
            _ => NodeData::new1(adapter),
        };

        let idx = self.graph.add_node(node_data);
        self.node_indices.insert(id, idx);
        id
    }

    /// Connect output of `from` to input of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        let from_idx = self.node_indices[&from];
        let to_idx = self.node_indices[&to];
        self.graph.add_edge(from_idx, to_idx, ());
    }

    /// Remove a node and all its edges.
    ///
    /// Returns the node itself so the caller decides on which thread it is
    /// dropped. Returns `None` if the id was already removed.
    pub fn remove(&mut self, id: NodeId) -> Option<Box<dyn AudioNode>> {
        let idx = self.node_indices.remove(&id)?;
        // petgraph swap-removes: the node holding the last index moves into `idx`
        let last = NodeIndex::new(self.graph.node_count() - 1);
        if self.terminal == Some(idx) {
            self.terminal = None;
        }
        let data = self.graph.remove_node(idx)?;
        if idx != last {
            for stored in self.node_indices.values_mut() {
                if *stored == last {
                    *stored = idx;
                }
            }
            if self.terminal == Some(last) {
                self.terminal = Some(idx);
            }
        }
        Some(data.node.node)
    }

    /// Set which node to process to (typically the sink).
    pub fn set_terminal(&mut self, id: NodeId) {
        self.terminal = Some(self.node_indices[&id]);
    }

    /// Process one block of audio through the graph.
    pub fn process(&mut self) {
        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.graph, terminal);
        }
    }
}

//! The node graph maps output time to source time.
//!
//! Each node is a point `(x, y)`: at output second `x` the renderer shows source second `y`.
//! Between nodes the mapping is linear, so a segment whose `y` grows slower than its `x`
//! plays back in slow motion.

use crate::foundation::core::TimeRange;
use crate::foundation::error::{SlowmoError, SlowmoResult};

/// One point of the time mapping curve.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Output time in seconds.
    pub x: f64,
    /// Source time in seconds.
    pub y: f64,
}

impl Node {
    /// Create a node at output time `x` showing source time `y`.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered list of nodes with strictly increasing output times.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct NodeList {
    nodes: Vec<Node>,
}

impl NodeList {
    /// Build a node list. Nodes are sorted by output time; duplicate output times, negative
    /// source times and non-finite values are rejected.
    pub fn new(mut nodes: Vec<Node>) -> SlowmoResult<Self> {
        if nodes.iter().any(|n| !n.x.is_finite() || !n.y.is_finite()) {
            return Err(SlowmoError::validation("node coordinates must be finite"));
        }
        if let Some(n) = nodes.iter().find(|n| n.y < 0.0) {
            return Err(SlowmoError::validation(format!(
                "node at output time {} has negative source time {}",
                n.x, n.y
            )));
        }
        nodes.sort_by(|a, b| a.x.total_cmp(&b.x));
        if let Some(w) = nodes.windows(2).find(|w| w[0].x == w[1].x) {
            return Err(SlowmoError::validation(format!(
                "two nodes share output time {}",
                w[0].x
            )));
        }
        Ok(Self { nodes })
    }

    /// Borrow the nodes in output-time order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Output time of the first node (0 for an empty graph).
    pub fn start_time(&self) -> f64 {
        self.nodes.first().map_or(0.0, |n| n.x)
    }

    /// Output time of the last node (0 for an empty graph).
    pub fn end_time(&self) -> f64 {
        self.nodes.last().map_or(0.0, |n| n.x)
    }

    /// The overall output time extent `[start_time, end_time]`.
    pub fn bounds(&self) -> TimeRange {
        TimeRange {
            start: self.start_time(),
            end: self.end_time(),
        }
    }

    /// Largest source time referenced by any node.
    pub fn max_source_time(&self) -> f64 {
        self.nodes.iter().map(|n| n.y).fold(0.0, f64::max)
    }

    /// Source time shown at output time `t`, clamped to the first/last node outside the graph.
    pub fn source_time(&self, t: f64) -> f64 {
        let (Some(first), Some(last)) = (self.nodes.first(), self.nodes.last()) else {
            return 0.0;
        };
        if t <= first.x {
            return first.y;
        }
        if t >= last.x {
            return last.y;
        }
        // First node strictly right of t; t > first.x guarantees idx >= 1.
        let idx = self.nodes.partition_point(|n| n.x <= t);
        let (a, b) = (self.nodes[idx - 1], self.nodes[idx]);
        let s = (t - a.x) / (b.x - a.x);
        a.y + s * (b.y - a.y)
    }
}

impl TryFrom<Vec<Node>> for NodeList {
    type Error = SlowmoError;

    fn try_from(value: Vec<Node>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeList> for Vec<Node> {
    fn from(value: NodeList) -> Self {
        value.nodes
    }
}

#[cfg(test)]
#[path = "../../tests/unit/project/nodes.rs"]
mod tests;

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use std::cmp::Ordering;

use super::node::Node;
use crate::config::NodeSelection;

/// Heap order for live nodes: the node that compares greatest pops first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeOrder(pub NodeSelection);

impl Compare<Node> for NodeOrder {
    fn compare(&self, a: &Node, b: &Node) -> Ordering {
        match self.0 {
            // most recently pushed first
            NodeSelection::DepthFirst => a.seq.cmp(&b.seq),
            // lowest bound first, then deepest, then newest
            NodeSelection::BestBound => b
                .bound
                .total_cmp(&a.bound)
                .then_with(|| a.depth.cmp(&b.depth))
                .then_with(|| a.seq.cmp(&b.seq)),
        }
    }
}

/// The set of live branch nodes.
pub(crate) struct Frontier {
    heap: BinaryHeap<Node, NodeOrder>,
    pushed: usize,
}

impl Frontier {
    pub fn new(selection: NodeSelection) -> Self {
        Self {
            heap: BinaryHeap::from_vec_cmp(vec![], NodeOrder(selection)),
            pushed: 0,
        }
    }

    pub fn push(&mut self, mut node: Node) {
        node.seq = self.pushed;
        self.pushed += 1;
        self.heap.push(node);
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.heap.pop()
    }

    /// Smallest parent bound among the live nodes.
    pub fn lowest_bound(&self) -> Option<f64> {
        self.heap.iter().map(|n| n.bound).min_by(|a, b| a.total_cmp(b))
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::{MasterProblem, NodeBounds};
    use crate::model::Item;

    fn node(bound: f64, depth: usize) -> Node {
        let master = MasterProblem::new(vec![Item::new("a", 1.0)]).unwrap();
        Node::new(master, NodeBounds::default(), bound, depth)
    }

    #[test]
    fn test_depth_first_is_lifo() {
        let mut frontier = Frontier::new(NodeSelection::DepthFirst);
        frontier.push(node(3.0, 0));
        frontier.push(node(1.0, 1));
        frontier.push(node(2.0, 1));

        assert_eq!(frontier.len(), 3);
        assert_eq!(frontier.pop().map(|n| n.bound), Some(2.0));
        assert_eq!(frontier.pop().map(|n| n.bound), Some(1.0));
        assert_eq!(frontier.pop().map(|n| n.bound), Some(3.0));
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_best_bound_pops_lowest_bound() {
        let mut frontier = Frontier::new(NodeSelection::BestBound);
        frontier.push(node(3.0, 0));
        frontier.push(node(1.0, 1));
        frontier.push(node(2.0, 1));
        frontier.push(node(1.0, 2));

        assert_eq!(frontier.lowest_bound(), Some(1.0));
        let first = frontier.pop().unwrap();
        assert_eq!((first.bound, first.depth), (1.0, 2));
        assert_eq!(frontier.pop().map(|n| n.bound), Some(1.0));
        assert_eq!(frontier.pop().map(|n| n.bound), Some(2.0));
        assert_eq!(frontier.pop().map(|n| n.bound), Some(3.0));
    }

    #[test]
    fn test_clear() {
        let mut frontier = Frontier::new(NodeSelection::BestBound);
        frontier.push(node(0.0, 0));
        frontier.clear();
        assert!(frontier.is_empty());
        assert_eq!(frontier.lowest_bound(), None);
    }
}

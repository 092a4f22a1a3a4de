//! Graph traversal into an ordered sequence of test cases. Grounded on
//! `_iterate_protocol`/`_iterate_protocol_recursive` in
//! `original_source/boofuzz/sessions.py`: walk every root-to-node path in
//! the graph, and for each path fuzz the path's terminal node one
//! mutation at a time while every earlier node on the path is sent with
//! its default (unmutated) rendering.

use crate::graph::{Graph, NodeId};

/// One test case: the path to replay (ancestor nodes sent at their
/// default render) and the mutation index the path's terminal node
/// should be left at.
#[derive(Debug, Clone)]
pub struct Case {
    pub path: Vec<NodeId>,
    pub mutant_index: u64,
}

/// Walks every path yielded by [`Graph::all_paths`] in order, advancing
/// the terminal node's mutation cursor one step per case and resetting
/// it before moving to the next path.
pub struct Traversal {
    paths: Vec<Vec<NodeId>>,
    path_idx: usize,
}

impl Traversal {
    pub fn new(graph: &Graph) -> Self {
        Self {
            paths: graph.all_paths(),
            path_idx: 0,
        }
    }

    /// Total number of cases across every path, i.e. `Session`'s
    /// `total_num_mutations`, summed over every node in the graph.
    pub fn total_num_mutations(&self, graph: &Graph) -> u64 {
        self.paths
            .iter()
            .filter_map(|p| p.last())
            .filter_map(|&node| graph.request(node))
            .map(|r| r.total_num_mutations())
            .sum()
    }

    pub fn is_done(&self) -> bool {
        self.path_idx >= self.paths.len()
    }

    /// Produce the next case, mutating the relevant request in `graph` in
    /// place. Returns `None` once every path's terminal node has been
    /// fuzzed through every mutation.
    pub fn next_case(&mut self, graph: &mut Graph) -> Option<Case> {
        loop {
            let path = self.paths.get(self.path_idx)?.clone();
            let &terminal = path.last().expect("all_paths never yields an empty path");
            let request = graph.request_mut(terminal).expect("path terminal is never the root sentinel");

            if request.mutate() {
                let mutant_index = request.mutant_index();
                return Some(Case { path, mutant_index });
            }
            // This path's terminal node is exhausted (and was just reset
            // to defaults by the failing `mutate()` call); move on.
            self.path_idx += 1;
        }
    }

    /// Skip forward `count` cases without rendering/sending them, used to
    /// honor `--skip` and the crash-threshold exhaustion shortcut.
    /// Returns the number of cases actually skipped, which is less than
    /// `count` only once the whole traversal is done.
    pub fn skip(&mut self, graph: &mut Graph, count: u64) -> u64 {
        let mut skipped = 0;
        while skipped < count {
            if self.next_case(graph).is_none() {
                break;
            }
            skipped += 1;
        }
        skipped
    }

    /// Fast-forward past the remainder of the currently-mutating
    /// descendant of the path's terminal node ("skip forward by
    /// num_mutations - mutant_index"), without walking each intermediate
    /// case individually.
    pub fn skip_current_primitive(&mut self, graph: &mut Graph) -> u64 {
        let Some(path) = self.paths.get(self.path_idx) else { return 0 };
        let &terminal = path.last().expect("all_paths never yields an empty path");
        let Some(request) = graph.request_mut(terminal) else { return 0 };
        let remaining = request.current_mutant_remaining();
        request.skip_current_to_exhaustion();
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Primitive;
    use crate::request::{ElementSpec, Request};

    fn node_with_library(name: &str, values: Vec<Vec<u8>>) -> Request {
        Request::build(
            name,
            vec![ElementSpec::Leaf(Primitive::FuzzableBytes {
                name: Some("p".into()),
                default: vec![0],
                library: values,
                index: 0,
                fuzzable: true,
            })],
        )
        .unwrap()
    }

    #[test]
    fn trivial_single_node_yields_two_cases() {
        let mut graph = Graph::new();
        let a = graph.add_request(node_with_library("a", vec![vec![0x00], vec![0xFF]]));
        graph.add_edge(graph.root(), a, None).unwrap();

        let mut traversal = Traversal::new(&graph);
        assert_eq!(traversal.total_num_mutations(&graph), 2);

        let c1 = traversal.next_case(&mut graph).unwrap();
        assert_eq!(c1.mutant_index, 1);
        let c2 = traversal.next_case(&mut graph).unwrap();
        assert_eq!(c2.mutant_index, 2);
        assert!(traversal.next_case(&mut graph).is_none());
    }

    #[test]
    fn two_node_path_fuzzes_each_node_separately() {
        let mut graph = Graph::new();
        let a = graph.add_request(node_with_library("a", vec![vec![1]]));
        let b = graph.add_request(node_with_library("b", vec![vec![2]]));
        graph.add_edge(graph.root(), a, None).unwrap();
        graph.add_edge(a, b, None).unwrap();

        let mut traversal = Traversal::new(&graph);
        let cases: Vec<_> = std::iter::from_fn(|| traversal.next_case(&mut graph)).collect();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].path, vec![a]);
        assert_eq!(cases[1].path, vec![a, b]);
    }

    #[test]
    fn skip_advances_without_stopping() {
        let mut graph = Graph::new();
        let a = graph.add_request(node_with_library("a", vec![vec![1], vec![2], vec![3]]));
        graph.add_edge(graph.root(), a, None).unwrap();

        let mut traversal = Traversal::new(&graph);
        let skipped = traversal.skip(&mut graph, 2);
        assert_eq!(skipped, 2);
        let case = traversal.next_case(&mut graph).unwrap();
        assert_eq!(case.mutant_index, 3);
    }
}

//! The dialog graph: nodes hold a [`Request`](crate::request::Request),
//! edges hold an optional transition callback. Grounded on
//! `original_source/boofuzz/sessions.py`'s `Session(pgraph.Graph)` and
//! `Connection(pgraph.Edge)`: a dense node-id space assigned on insert, a
//! single root sentinel, and DFS-by-path traversal.

use crate::error::{FuzzError, FuzzResult};
use crate::request::Request;
use ahash::AHashMap;
use std::rc::Rc;

pub type NodeId = usize;

/// Runs on the destination node's default rendering before it is
/// transmitted, and may substitute different bytes entirely. Returning
/// the input unchanged is a no-op.
pub type TransitionCallback = Rc<dyn Fn(&[u8]) -> Vec<u8>>;

/// Runs after a response is received for a node on the path, with a
/// mutable handle to the session's keyed store — the node-level
/// counterpart to `Primitive::Callback`'s per-primitive, render-time
/// hook, kept distinct so a callback can populate the store without also
/// being a per-primitive render-time hook.
pub type ResponseCallback = Rc<dyn Fn(&[u8], &mut crate::keyed_store::KeyedStore)>;

pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    pub callback: Option<TransitionCallback>,
}

/// A directed multigraph of requests, with one implicit root sentinel
/// (id 0) that every top-level request hangs off of, traversed depth-
/// first from that root.
pub struct Graph {
    requests: Vec<Request>,
    names: AHashMap<String, NodeId>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>, // node -> edge indices, in insertion order
    response_callbacks: AHashMap<NodeId, ResponseCallback>,
    root: NodeId,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            names: AHashMap::new(),
            edges: Vec::new(),
            adjacency: vec![Vec::new()],
            response_callbacks: AHashMap::new(),
            root: 0,
        }
    }

    /// Register a response callback for `node`, replacing any previous
    /// one.
    pub fn set_response_callback(&mut self, node: NodeId, callback: ResponseCallback) {
        self.response_callbacks.insert(node, callback);
    }

    pub fn response_callback(&self, node: NodeId) -> Option<&ResponseCallback> {
        self.response_callbacks.get(&node)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Insert a request as a graph node and assign it a dense id.
    pub fn add_request(&mut self, mut request: Request) -> NodeId {
        let id = self.requests.len() + 1; // id 0 is the root sentinel
        request.id = Some(id as u64);
        self.names.insert(request.name.clone(), id);
        self.requests.push(request);
        self.adjacency.push(Vec::new());
        id
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn request(&self, id: NodeId) -> Option<&Request> {
        if id == self.root {
            None
        } else {
            self.requests.get(id - 1)
        }
    }

    pub fn request_mut(&mut self, id: NodeId) -> Option<&mut Request> {
        if id == self.root {
            None
        } else {
            self.requests.get_mut(id - 1)
        }
    }

    /// Add a directed edge. Rejects an edge that would complete a cycle
    /// back to an ancestor of `src` reachable from the root — a dialog is
    /// a DAG so traversal always terminates.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, callback: Option<TransitionCallback>) -> FuzzResult<()> {
        if self.would_cycle(src, dst) {
            return Err(FuzzError::Configuration(format!(
                "edge {src} -> {dst} would introduce a cycle in the dialog graph"
            )));
        }
        let edge_idx = self.edges.len();
        self.edges.push(Edge { src, dst, callback });
        self.adjacency[src].push(edge_idx);
        Ok(())
    }

    fn would_cycle(&self, src: NodeId, dst: NodeId) -> bool {
        if src == dst {
            return true;
        }
        // dst can already reach src => adding src->dst closes a cycle
        let mut stack = vec![dst];
        let mut seen = vec![false; self.adjacency.len()];
        while let Some(node) = stack.pop() {
            if node == src {
                return true;
            }
            if seen[node] {
                continue;
            }
            seen[node] = true;
            for &edge_idx in &self.adjacency[node] {
                stack.push(self.edges[edge_idx].dst);
            }
        }
        false
    }

    pub fn edges_from(&self, node: NodeId) -> impl Iterator<Item = &Edge> {
        self.adjacency[node].iter().map(move |&i| &self.edges[i])
    }

    /// Every root-to-leaf path as a sequence of node ids, depth-first, in
    /// edge insertion order — the traversal order `fuzz()`'s default
    /// all-graph run uses.
    pub fn all_paths(&self) -> Vec<Vec<NodeId>> {
        let mut paths = Vec::new();
        let mut current = Vec::new();
        self.dfs_collect(self.root, &mut current, &mut paths);
        paths
    }

    fn dfs_collect(&self, node: NodeId, current: &mut Vec<NodeId>, paths: &mut Vec<Vec<NodeId>>) {
        current.push(node);
        // Every node is itself fuzzed when first reached, not just leaves
        // (a two-node dialog fuzzes node A's request and then B's).
        if node != self.root {
            paths.push(current.clone());
        }
        let edge_indices = self.adjacency[node].clone();
        for edge_idx in edge_indices {
            self.dfs_collect(self.edges[edge_idx].dst, current, paths);
        }
        current.pop();
    }

    /// Resolve a `"a->b->c"` path string (names joined by `->`) to node
    /// ids, validating each hop is a real edge.
    pub fn path_names_to_ids(&self, path: &str) -> FuzzResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        let mut current = self.root;
        for name in path.split("->") {
            let name = name.trim();
            let next = self
                .node_id(name)
                .ok_or_else(|| FuzzError::Configuration(format!("unknown request name '{name}' in path")))?;
            if !self.adjacency[current].iter().any(|&e| self.edges[e].dst == next) {
                return Err(FuzzError::Configuration(format!(
                    "no edge from current path position to '{name}'"
                )));
            }
            ids.push(next);
            current = next;
        }
        Ok(ids)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{Endian, Primitive};
    use crate::request::{ElementSpec, Request};

    fn trivial_request(name: &str) -> Request {
        Request::build(
            name,
            vec![ElementSpec::Leaf(Primitive::Static {
                name: None,
                value: vec![0],
            })],
        )
        .unwrap()
    }

    #[test]
    fn two_node_path_traverses_in_order() {
        let mut g = Graph::new();
        let a = g.add_request(trivial_request("a"));
        let b = g.add_request(trivial_request("b"));
        g.add_edge(g.root(), a, None).unwrap();
        g.add_edge(a, b, None).unwrap();

        let paths = g.all_paths();
        assert_eq!(paths, vec![vec![0, a], vec![0, a, b]]);
    }

    #[test]
    fn self_loop_is_rejected_as_cycle() {
        let mut g = Graph::new();
        let a = g.add_request(trivial_request("a"));
        assert!(g.add_edge(a, a, None).is_err());
    }

    #[test]
    fn back_edge_is_rejected_as_cycle() {
        let mut g = Graph::new();
        let a = g.add_request(trivial_request("a"));
        let b = g.add_request(trivial_request("b"));
        g.add_edge(g.root(), a, None).unwrap();
        g.add_edge(a, b, None).unwrap();
        assert!(g.add_edge(b, a, None).is_err());
    }

    #[test]
    fn path_names_to_ids_rejects_unknown_hop() {
        let mut g = Graph::new();
        let a = g.add_request(trivial_request("a"));
        g.add_edge(g.root(), a, None).unwrap();
        assert!(g.path_names_to_ids("a->ghost").is_err());
        assert_eq!(g.path_names_to_ids("a").unwrap(), vec![a]);
    }
}

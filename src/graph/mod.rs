//! The shared conversation graph: a deduplicated, concurrently-writable
//! store of discovered agent utterances and the user responses that link
//! them.

mod identifier;

pub use identifier::find_match;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{ConversationEdge, ConversationNode, EdgeView, GraphSnapshot, NodeId, NodeView};
use crate::text::normalize;

#[derive(Debug, Default)]
struct GraphInner {
    nodes: HashMap<NodeId, ConversationNode>,
    edges: Vec<ConversationEdge>,
    /// `(from_id, normalized_response) -> edge index`, kept alongside `edges`
    /// to uphold the no-duplicate-outgoing-edge invariant in O(1).
    edge_index: HashMap<(NodeId, String), usize>,
    /// `to_id -> (from_id, user_response)` for the most recently observed
    /// incoming edge, used by `path_to` to reconstruct root-to-node paths.
    parent: HashMap<NodeId, (NodeId, String)>,
    root: Option<NodeId>,
    next_id: u64,
}

impl GraphInner {
    fn candidate_nodes(&self) -> impl Iterator<Item = &ConversationNode> {
        self.nodes.values()
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Thread-safe, append-mostly store of the conversation graph under
/// discovery. All mutations serialize through a single writer lock;
/// `snapshot` gives callers a consistent read without blocking writers
/// for longer than a single clone.
pub struct ConversationGraph {
    inner: RwLock<GraphInner>,
    similarity_threshold: f64,
}

impl ConversationGraph {
    pub fn new(similarity_threshold: f64) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(GraphInner::default()),
            similarity_threshold,
        })
    }

    /// Atomically find a matching existing node or insert a new one.
    /// Returns `(id, created)`.
    pub async fn get_or_create_node(&self, utterance: &str) -> (NodeId, bool) {
        let normalized = normalize(utterance);
        let mut inner = self.inner.write().await;

        if let Some(existing) = find_match(inner.candidate_nodes(), &normalized, self.similarity_threshold) {
            if let Some(node) = inner.nodes.get_mut(&existing) {
                node.visit_count += 1;
            }
            return (existing, false);
        }

        let id = inner.allocate_id();
        let is_root = inner.root.is_none();
        if is_root {
            inner.root = Some(id);
        }
        inner.nodes.insert(
            id,
            ConversationNode {
                id,
                utterance: utterance.to_string(),
                normalized_utterance: normalized,
                is_terminal: false,
                depth_min: if is_root { 0 } else { u32::MAX },
                visit_count: 1,
                dropped_errors: 0,
            },
        );
        (id, true)
    }

    /// Record that a task rooted at `node_id` was dropped after a
    /// non-retryable or retry-exhausted failure. No-op for the seed task
    /// (`node_id == None`), which has no owning node yet.
    pub async fn record_dropped_error(&self, node_id: Option<NodeId>) {
        let Some(node_id) = node_id else { return };
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.get_mut(&node_id) {
            node.dropped_errors += 1;
        }
    }

    /// Add an edge unless an equivalent one already exists; otherwise bump
    /// its observation count. Returns `true` if a new edge was created.
    pub async fn add_edge(&self, from_id: NodeId, user_response: &str, to_id: NodeId) -> bool {
        let key = (from_id, normalize(user_response));
        let mut inner = self.inner.write().await;

        if let Some(&idx) = inner.edge_index.get(&key) {
            inner.edges[idx].observation_count += 1;
            return false;
        }

        let idx = inner.edges.len();
        inner.edges.push(ConversationEdge {
            from_id,
            to_id,
            user_response: user_response.to_string(),
            observation_count: 1,
        });
        inner.edge_index.insert(key, idx);
        inner.parent.insert(to_id, (from_id, user_response.to_string()));

        if let Some(from_depth) = inner.nodes.get(&from_id).map(|n| n.depth_min) {
            let candidate_depth = from_depth.saturating_add(1);
            if let Some(to_node) = inner.nodes.get_mut(&to_id) {
                if candidate_depth < to_node.depth_min {
                    to_node.depth_min = candidate_depth;
                }
            }
        }

        true
    }

    pub async fn mark_terminal(&self, node_id: NodeId) {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.get_mut(&node_id) {
            node.is_terminal = true;
        }
    }

    pub async fn root(&self) -> Option<NodeId> {
        self.inner.read().await.root
    }

    /// A consistent snapshot for the HTTP API and for logging, built while
    /// holding only a read lock.
    pub async fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read().await;
        GraphSnapshot {
            nodes: inner.nodes.values().map(NodeView::from).collect(),
            edges: inner.edges.iter().map(EdgeView::from).collect(),
        }
    }

    /// Nodes eligible for further expansion: not terminal and under the
    /// configured outgoing-edge breadth cap.
    pub async fn frontier_candidates(&self, breadth_cap: usize, limit: usize) -> Vec<NodeId> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for node in inner.nodes.values() {
            if node.is_terminal {
                continue;
            }
            let outgoing = inner.edges.iter().filter(|e| e.from_id == node.id).count();
            if outgoing < breadth_cap {
                out.push(node.id);
            }
            if out.len() >= limit {
                break;
            }
        }
        out
    }

    /// The outgoing responses already explored for a node, used to dedupe
    /// newly proposed LM candidates.
    pub async fn existing_responses(&self, node_id: NodeId) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .edges
            .iter()
            .filter(|e| e.from_id == node_id)
            .map(|e| normalize(&e.user_response))
            .collect()
    }

    /// The root-to-node path of `(agent_utterance, user_response)` pairs,
    /// walked backwards via the most-recently-observed parent edge: each pair
    /// is the utterance that PROMPTED `response`, i.e. `from_id`'s line, not
    /// the node it led to. The node at `node_id` itself is left for the
    /// caller to append as the trailing, unpaired agent line. Stops at the
    /// root or if a cycle is encountered, rather than looping forever.
    pub async fn path_to(&self, node_id: NodeId) -> Vec<(String, String)> {
        let inner = self.inner.read().await;
        let mut path = Vec::new();
        let mut current = node_id;
        let mut visited = std::collections::HashSet::new();

        while Some(current) != inner.root {
            if !visited.insert(current) {
                break;
            }
            let Some((parent_id, response)) = inner.parent.get(&current) else {
                break;
            };
            let parent_utterance = inner
                .nodes
                .get(parent_id)
                .map(|n| n.utterance.clone())
                .unwrap_or_default();
            path.push((parent_utterance, response.clone()));
            current = *parent_id;
        }

        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_deduplicates_near_identical_utterances() {
        let graph = ConversationGraph::new(0.85);
        let (a, created_a) = graph.get_or_create_node("Please say your account number.").await;
        let (b, created_b) = graph.get_or_create_node("please say your account number").await;
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn add_edge_is_idempotent_by_normalized_response() {
        let graph = ConversationGraph::new(0.85);
        let (root, _) = graph.get_or_create_node("Welcome, press 1 for sales.").await;
        let (sales, _) = graph.get_or_create_node("Sales hours are nine to five.").await;

        assert!(graph.add_edge(root, "1", sales).await);
        assert!(!graph.add_edge(root, "1", sales).await);

        let snapshot = graph.snapshot().await;
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].observation_count, 2);
    }

    #[tokio::test]
    async fn depth_min_tracks_shortest_known_path() {
        let graph = ConversationGraph::new(0.85);
        let (root, _) = graph.get_or_create_node("Welcome.").await;
        let (menu, _) = graph.get_or_create_node("Press 1 for sales, 2 for support.").await;
        graph.add_edge(root, "continue", menu).await;

        let snapshot = graph.snapshot().await;
        let menu_view = snapshot.nodes.iter().find(|n| n.id == menu.0).unwrap();
        assert_eq!(menu_view.depth_min, 1);
    }

    #[tokio::test]
    async fn record_dropped_error_increments_the_owning_node() {
        let graph = ConversationGraph::new(0.85);
        let (root, _) = graph.get_or_create_node("Welcome.").await;

        graph.record_dropped_error(Some(root)).await;
        graph.record_dropped_error(None).await; // seed task: no-op

        let snapshot = graph.snapshot().await;
        let root_view = snapshot.nodes.iter().find(|n| n.id == root.0).unwrap();
        assert_eq!(root_view.dropped_errors, 1);
    }

    #[tokio::test]
    async fn path_to_pairs_each_response_with_the_line_that_prompted_it() {
        let graph = ConversationGraph::new(0.85);
        let (root, _) = graph.get_or_create_node("Welcome.").await;
        let (n1, _) = graph.get_or_create_node("Press 1 for sales, 2 for support.").await;
        let (n2, _) = graph.get_or_create_node("Sales hours are nine to five.").await;
        graph.add_edge(root, "a", n1).await;
        graph.add_edge(n1, "b", n2).await;

        let path = graph.path_to(n2).await;
        assert_eq!(
            path,
            vec![
                ("Welcome.".to_string(), "a".to_string()),
                ("Press 1 for sales, 2 for support.".to_string(), "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn frontier_candidates_excludes_terminal_nodes() {
        let graph = ConversationGraph::new(0.85);
        let (root, _) = graph.get_or_create_node("Goodbye.").await;
        graph.mark_terminal(root).await;

        let candidates = graph.frontier_candidates(10, 10).await;
        assert!(!candidates.contains(&root));
    }
}

//! Arena storage for a loaded slice of a task tree.
//!
//! Tasks are addressed by `NodeRef` (position in the arena), not by `TaskId`,
//! because a freshly produced task has no identity until it is saved.
//! A node is always inserted after its parent, so parent indices are strictly
//! smaller than child indices and parent links can never form a cycle.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{Task, TaskTree, TaskView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

#[derive(Debug, Clone)]
struct Node {
    task: Task,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<Node>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `task` under `parent` (or as a top-level node of this graph).
    ///
    /// When a parent link is given the task's `parent_id` follows the
    /// parent's identity, which may still be unassigned.
    pub(crate) fn insert(&mut self, mut task: Task, parent: Option<NodeRef>) -> NodeRef {
        let node = NodeRef(self.nodes.len());
        if let Some(parent) = parent {
            task.set_parent_id(self.task(parent).id().cloned());
            self.nodes[parent.0].children.push(node);
        }
        self.nodes.push(Node {
            task,
            parent,
            children: Vec::new(),
        });
        node
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order (parents before children)
    pub fn node_refs(&self) -> impl Iterator<Item = NodeRef> {
        (0..self.nodes.len()).map(NodeRef)
    }

    pub fn task(&self, node: NodeRef) -> &Task {
        &self.nodes[node.0].task
    }

    pub fn task_mut(&mut self, node: NodeRef) -> &mut Task {
        &mut self.nodes[node.0].task
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        &self.nodes[node.0].children
    }

    /// A task is a root when it has neither a loaded parent nor a persisted one.
    pub fn is_root(&self, node: NodeRef) -> bool {
        self.parent(node).is_none() && self.task(node).parent_id().is_none()
    }

    pub fn is_done(&self, node: NodeRef) -> bool {
        self.task(node).is_done()
    }

    /// Distance from the root, root = 1. Needs the whole ancestor chain loaded.
    pub fn depth(&self, node: NodeRef) -> Result<u32> {
        let mut depth = 1;
        let mut current = node;
        loop {
            if let Some(parent) = self.parent(current) {
                depth += 1;
                current = parent;
                continue;
            }
            return match self.task(current).parent_id() {
                Some(missing) => Err(TaskError::MissingAncestor(missing.clone())),
                None => Ok(depth),
            };
        }
    }

    /// Every node below `node`, breadth-first, excluding `node` itself.
    pub fn descendants(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut found = Vec::new();
        let mut queue: VecDeque<NodeRef> = self.children(node).iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            found.push(current);
            queue.extend(self.children(current).iter().copied());
        }
        found
    }

    pub fn collect_descendant_ids(&self, node: NodeRef) -> HashSet<TaskId> {
        self.descendants(node)
            .into_iter()
            .filter_map(|d| self.task(d).id().cloned())
            .collect()
    }

    /// Strict completion: only succeeds when every descendant is already done.
    /// Descendants are left untouched. Completion is terminal, so a task that
    /// is already done keeps its original stamp.
    pub fn complete(&mut self, node: NodeRef, now: DateTime<Utc>) -> Result<()> {
        if self.is_done(node) {
            return Ok(());
        }
        let unfinished = self
            .descendants(node)
            .into_iter()
            .filter(|d| !self.is_done(*d))
            .count();
        if unfinished > 0 {
            return Err(TaskError::UnfinishedDescendant { count: unfinished });
        }
        self.task_mut(node).mark_completed(now);
        tracing::debug!(task = ?self.task(node).id(), "task completed");
        Ok(())
    }

    /// Forced completion: stamps `node` and its whole subtree with `now`,
    /// whatever their previous state.
    pub fn force_complete(&mut self, node: NodeRef, now: DateTime<Utc>) {
        let descendants = self.descendants(node);
        self.task_mut(node).mark_completed(now);
        for d in &descendants {
            self.task_mut(*d).mark_completed(now);
        }
        tracing::debug!(
            task = ?self.task(node).id(),
            cascaded = descendants.len(),
            "task force-completed"
        );
    }

    /// Snapshot of `node` and its loaded subtree. Depth is omitted when the
    /// ancestor chain is not loaded.
    pub fn to_tree(&self, node: NodeRef) -> TaskTree {
        TaskTree {
            task: self.view(node),
            children: self
                .children(node)
                .iter()
                .map(|child| self.to_tree(*child))
                .collect(),
        }
    }

    pub fn view(&self, node: NodeRef) -> TaskView {
        TaskView::new(self.task(node), self.depth(node).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UserId;
    use crate::types::TaskRecord;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
    }

    fn task(title: &str, days: i64) -> Task {
        Task::new(
            title.to_string(),
            String::new(),
            t0() + Duration::days(days),
            UserId::new(7),
            t0(),
        )
    }

    /// R (+3d) -> C (+2d) -> G (+1d)
    fn chain() -> (TaskGraph, NodeRef, NodeRef, NodeRef) {
        let mut graph = TaskGraph::new();
        let r = graph.insert(task("R", 3), None);
        let c = graph.insert(task("C", 2), Some(r));
        let g = graph.insert(task("G", 1), Some(c));
        (graph, r, c, g)
    }

    #[test]
    fn depth_follows_parent_links() {
        let (graph, r, c, g) = chain();
        assert_eq!(graph.depth(r).unwrap(), 1);
        assert_eq!(graph.depth(c).unwrap(), 2);
        assert_eq!(graph.depth(g).unwrap(), 3);
        assert!(graph.is_root(r));
        assert!(!graph.is_root(g));
    }

    #[test]
    fn depth_fails_on_unloaded_ancestor() {
        let parent_id = TaskId::new();
        let orphan = Task::from_record(TaskRecord {
            id: TaskId::new(),
            parent_id: Some(parent_id.clone()),
            user_id: UserId::new(7),
            title: "Orphan".to_string(),
            description: String::new(),
            deadline: t0() + Duration::days(1),
            created_at: t0(),
            completed_at: None,
        });
        let mut graph = TaskGraph::new();
        let node = graph.insert(orphan, None);

        assert!(!graph.is_root(node));
        match graph.depth(node) {
            Err(TaskError::MissingAncestor(id)) => assert_eq!(id, parent_id),
            other => panic!("expected MissingAncestor, got {other:?}"),
        }
    }

    #[test]
    fn descendants_are_breadth_first() {
        let mut graph = TaskGraph::new();
        let r = graph.insert(task("R", 5), None);
        let a = graph.insert(task("A", 4), Some(r));
        let b = graph.insert(task("B", 4), Some(r));
        let a1 = graph.insert(task("A1", 3), Some(a));
        let b1 = graph.insert(task("B1", 3), Some(b));

        assert_eq!(graph.descendants(r), vec![a, b, a1, b1]);
        assert_eq!(graph.descendants(a), vec![a1]);
        assert!(graph.descendants(b1).is_empty());
    }

    #[test]
    fn force_complete_stamps_whole_subtree() {
        let (mut graph, r, c, g) = chain();
        graph.force_complete(r, t0());

        for node in [r, c, g] {
            assert_eq!(graph.task(node).completed_at(), Some(t0()));
        }
    }

    #[test]
    fn force_complete_overwrites_earlier_stamps() {
        let (mut graph, r, c, g) = chain();
        graph.force_complete(g, t0());
        let later = t0() + Duration::hours(1);
        graph.force_complete(r, later);

        for node in [r, c, g] {
            assert_eq!(graph.task(node).completed_at(), Some(later));
        }
    }

    #[test]
    fn complete_succeeds_when_subtree_done() {
        let (mut graph, r, c, g) = chain();
        graph.force_complete(g, t0());
        graph.complete(c, t0() + Duration::minutes(5)).unwrap();

        let t1 = t0() + Duration::hours(2);
        graph.complete(r, t1).unwrap();

        assert_eq!(graph.task(r).completed_at(), Some(t1));
        assert_eq!(graph.task(c).completed_at(), Some(t0() + Duration::minutes(5)));
        assert_eq!(graph.task(g).completed_at(), Some(t0()));
    }

    #[test]
    fn complete_rejects_unfinished_grandchild() {
        let (mut graph, r, c, g) = chain();
        graph.task_mut(c).mark_completed(t0());

        let err = graph.complete(r, t0()).unwrap_err();
        assert!(matches!(err, TaskError::UnfinishedDescendant { count: 1 }));
        assert!(graph.task(r).completed_at().is_none());
        assert!(graph.task(g).completed_at().is_none());
    }

    #[test]
    fn complete_twice_keeps_first_stamp() {
        let (mut graph, _, _, g) = chain();
        graph.complete(g, t0()).unwrap();
        graph.complete(g, t0() + Duration::hours(3)).unwrap();
        assert_eq!(graph.task(g).completed_at(), Some(t0()));
    }

    #[test]
    fn complete_leaf_has_no_gate() {
        let (mut graph, _, _, g) = chain();
        graph.complete(g, t0()).unwrap();
        assert!(graph.is_done(g));
    }

    #[test]
    fn collect_descendant_ids_skips_self_and_unsaved() {
        let (mut graph, r, c, g) = chain();
        let c_id = TaskId::new();
        graph.task_mut(c).assign_id(c_id.clone());
        graph.task_mut(r).assign_id(TaskId::new());

        let ids = graph.collect_descendant_ids(r);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&c_id));
        assert!(graph.task(g).id().is_none());
    }

    #[test]
    fn to_tree_mirrors_links() {
        let (graph, r, _, _) = chain();
        let tree = graph.to_tree(r);
        assert_eq!(tree.count(), 3);
        assert_eq!(tree.task.depth, Some(1));
        assert_eq!(tree.children[0].children[0].task.title, "G");
        assert_eq!(tree.children[0].children[0].task.depth, Some(3));
    }
}

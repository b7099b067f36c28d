//! Parent-linked node storage for search trees.
//!
//! Work items often need to reconstruct the path that produced them. Rather
//! than linking items to their parents through shared pointers, callers store
//! node payloads here and keep a small copyable [`NodeId`] in the item. A
//! [`reset`](Arena::reset) frees every node at once and invalidates all
//! handles issued before it.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ProcessError, Result};

/// Handle to a node, tagged with the arena generation it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    parent: Option<u32>,
    depth: u32,
}

#[derive(Debug)]
struct Inner<T> {
    nodes: Vec<Node<T>>,
    generation: u32,
}

impl<T> Inner<T> {
    fn resolve(&self, id: NodeId) -> Option<&Node<T>> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.index as usize)
    }
}

/// Thread-safe, append-only arena of parent-linked nodes.
#[derive(Debug)]
pub struct Arena<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: Vec::new(),
                generation: 0,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a node. Fails if `parent` was issued before the last reset.
    pub fn insert(&self, value: T, parent: Option<NodeId>) -> Result<NodeId> {
        let mut inner = self.write();
        let depth = match parent {
            Some(parent_id) => match inner.resolve(parent_id) {
                Some(parent_node) => parent_node.depth + 1,
                None => return Err(ProcessError::StaleNode(parent_id)),
            },
            None => 0,
        };
        let index = u32::try_from(inner.nodes.len())
            .map_err(|_| ProcessError::invalid_config("arena", "node capacity exhausted"))?;
        inner.nodes.push(Node {
            value,
            parent: parent.map(|p| p.index),
            depth,
        });
        Ok(NodeId {
            index,
            generation: inner.generation,
        })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.read().resolve(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        let inner = self.read();
        let node = inner.resolve(id)?;
        node.parent.map(|index| NodeId {
            index,
            generation: inner.generation,
        })
    }

    /// Distance from the root (roots have depth 0).
    pub fn depth(&self, id: NodeId) -> Option<u32> {
        self.read().resolve(id).map(|node| node.depth)
    }

    /// Handles from `id` up to its root, leaf first.
    pub fn path(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let inner = self.read();
        let mut node = inner.resolve(id).ok_or(ProcessError::StaleNode(id))?;
        let mut path = vec![id];
        while let Some(index) = node.parent {
            path.push(NodeId {
                index,
                generation: inner.generation,
            });
            // Parents always precede their children, so this cannot fail.
            match inner.nodes.get(index as usize) {
                Some(parent) => node = parent,
                None => break,
            }
        }
        Ok(path)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    /// Free every node and invalidate all outstanding handles.
    pub fn reset(&self) {
        let mut inner = self.write();
        inner.nodes.clear();
        inner.generation = inner.generation.wrapping_add(1);
    }
}

impl<T: Clone> Arena<T> {
    pub fn get(&self, id: NodeId) -> Option<T> {
        self.read().resolve(id).map(|node| node.value.clone())
    }

    /// Node values from the root down to `id`.
    pub fn lineage(&self, id: NodeId) -> Result<Vec<T>> {
        let path = self.path(id)?;
        let inner = self.read();
        let mut values: Vec<T> = path
            .iter()
            .filter_map(|step| inner.resolve(*step).map(|node| node.value.clone()))
            .collect();
        if values.len() != path.len() {
            // A reset raced with the walk.
            return Err(ProcessError::StaleNode(id));
        }
        values.reverse();
        Ok(values)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

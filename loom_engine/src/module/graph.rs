//! Declared module dependencies and the execution order derived from them.

use std::collections::BTreeSet;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};

/// Directed graph of "runs after" relations between module names
#[derive(Debug, Default, Clone)]
pub struct ExecutionGraph {
    nodes: Vec<String>,
    index: FxHashMap<String, usize>,
    edges: Vec<(usize, usize)>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning its index (existing nodes keep theirs)
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&index) = self.index.get(name) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), index);
        index
    }

    /// Declare that `node` runs after `dependency`
    ///
    /// # Errors
    ///
    /// `ConfigError` if either name is unknown.
    pub fn add_dependency(&mut self, node: &str, dependency: &str) -> Result<()> {
        let child = *self
            .index
            .get(node)
            .ok_or_else(|| Error::ConfigError(format!("unknown module '{}'", node)))?;
        let parent = *self.index.get(dependency).ok_or_else(|| {
            Error::ConfigError(format!("'{}' depends on unknown module '{}'", node, dependency))
        })?;
        if !self.edges.contains(&(parent, child)) {
            self.edges.push((parent, child));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm; among ready nodes the earliest declared runs first
    ///
    /// # Errors
    ///
    /// `CycleDetected` naming every node left on a cycle.
    pub fn resolve(&self) -> Result<Vec<String>> {
        let count = self.nodes.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        for &(parent, child) in &self.edges {
            children[parent].push(child);
            in_degree[child] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&node| in_degree[node] == 0).collect();
        let mut sorted = Vec::with_capacity(count);
        while let Some(node) = ready.pop_first() {
            sorted.push(node);
            for &child in &children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if sorted.len() != count {
            let stuck = (0..count)
                .filter(|&node| in_degree[node] > 0)
                .map(|node| self.nodes[node].clone())
                .collect();
            return Err(Error::CycleDetected(stuck));
        }
        Ok(sorted.into_iter().map(|node| self.nodes[node].clone()).collect())
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;

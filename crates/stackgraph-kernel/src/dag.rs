//! Dependency DAG over declared resources
//!
//! Nodes are declaration ordinals; an edge `a -> b` means `b` depends on `a`.
//! The builder only accepts dependencies on earlier declarations, so the
//! graph is acyclic by construction.

use crate::types::{Resource, ResourceId};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

#[derive(Debug, Clone)]
pub struct DependencyDag<'a> {
    inner: DiGraphMap<usize, ()>,
    ids: Vec<&'a ResourceId>,
}

impl<'a> DependencyDag<'a> {
    pub fn new(resources: &'a IndexMap<ResourceId, Resource>) -> Self {
        let mut inner = DiGraphMap::new();
        let mut ids = Vec::with_capacity(resources.len());

        for (ordinal, resource) in resources.values().enumerate() {
            inner.add_node(ordinal);
            ids.push(resource.id());
        }
        for (ordinal, resource) in resources.values().enumerate() {
            for dependency in resource.depends_on() {
                if let Some(from) = resources.get_index_of(dependency) {
                    inner.add_edge(from, ordinal, ());
                }
            }
        }

        Self { inner, ids }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Creation order honouring every dependency
    #[must_use]
    pub fn topological_order(&self) -> Vec<&'a ResourceId> {
        // declaration order is itself topological if toposort ever disagrees
        let order = toposort(&self.inner, None).unwrap_or_else(|_| self.inner.nodes().collect());
        order.into_iter().map(|ordinal| self.ids[ordinal]).collect()
    }

    /// Resources grouped by depth; members of one wave share no dependency
    #[must_use]
    pub fn deployment_waves(&self) -> Vec<Vec<&'a ResourceId>> {
        let mut depth = vec![0usize; self.ids.len()];
        // ordinals ascend along every edge, so one forward pass settles depths
        for ordinal in 0..self.ids.len() {
            depth[ordinal] = self
                .inner
                .neighbors_directed(ordinal, Direction::Incoming)
                .map(|dependency| depth[dependency] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut waves: Vec<Vec<&'a ResourceId>> = Vec::new();
        for (ordinal, wave) in depth.into_iter().enumerate() {
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(self.ids[ordinal]);
        }
        waves
    }
}

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::models::Package;

/// Directed dependency graph rooted at the analysed project.
///
/// Edges are deduplicated; cycles are tolerated and every traversal visits
/// a package at most once.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: Package,
    edges: BTreeMap<Package, BTreeSet<Package>>,
}

impl DependencyGraph {
    pub fn new(root: Package) -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(root.clone(), BTreeSet::new());
        Self { root, edges }
    }

    pub fn root(&self) -> &Package {
        &self.root
    }

    /// Record that `parent` depends on `child`.
    pub fn add(&mut self, parent: &Package, child: Package) {
        self.edges.entry(child.clone()).or_default();
        self.edges.entry(parent.clone()).or_default().insert(child);
    }

    /// Record a dependency of the root.
    pub fn add_direct(&mut self, child: Package) {
        let root = self.root.clone();
        self.add(&root, child);
    }

    pub fn direct(&self) -> impl Iterator<Item = &Package> {
        self.dependencies_of(&self.root)
    }

    pub fn dependencies_of(&self, package: &Package) -> impl Iterator<Item = &Package> {
        self.edges.get(package).into_iter().flatten()
    }

    /// Every package reachable from the root, excluding the root itself.
    pub fn packages(&self) -> BTreeSet<&Package> {
        let mut seen: BTreeSet<&Package> = BTreeSet::new();
        let mut queue: VecDeque<&Package> = self.direct().collect();

        while let Some(pkg) = queue.pop_front() {
            if pkg == &self.root || !seen.insert(pkg) {
                continue;
            }
            queue.extend(self.dependencies_of(pkg));
        }

        seen
    }

    /// Copy holding only the root and its direct dependencies.
    pub fn direct_only(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new(self.root.clone());
        for pkg in self.direct() {
            graph.add_direct(pkg.clone());
        }
        graph
    }

    /// Reachable packages with their outgoing edges, root first.
    pub(crate) fn reachable_edges(&self) -> Vec<(&Package, Vec<&Package>)> {
        let reachable = self.packages();
        std::iter::once(&self.root)
            .chain(reachable)
            .map(|pkg| (pkg, self.dependencies_of(pkg).collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ecosystem;

    fn pkg(name: &str) -> Package {
        Package::new(Ecosystem::Cargo, name, "1.0.0")
    }

    #[test]
    fn test_direct_and_transitive() {
        let mut g = DependencyGraph::new(pkg("app"));
        g.add_direct(pkg("a"));
        g.add_direct(pkg("b"));
        g.add(&pkg("b"), pkg("c"));

        let direct: Vec<_> = g.direct().map(|p| p.name.as_str()).collect();
        assert_eq!(direct, vec!["a", "b"]);

        let all: Vec<_> = g.packages().into_iter().map(|p| p.name.as_str()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let flat = g.direct_only();
        assert_eq!(flat.packages().len(), 2);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut g = DependencyGraph::new(pkg("app"));
        g.add_direct(pkg("a"));
        g.add(&pkg("a"), pkg("b"));
        g.add(&pkg("b"), pkg("a"));
        g.add(&pkg("b"), pkg("app"));

        assert_eq!(g.packages().len(), 2);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut g = DependencyGraph::new(pkg("app"));
        g.add_direct(pkg("a"));
        g.add_direct(pkg("a"));
        assert_eq!(g.direct().count(), 1);
    }

    #[test]
    fn test_unreachable_nodes_are_excluded() {
        let mut g = DependencyGraph::new(pkg("app"));
        g.add_direct(pkg("a"));
        g.add(&pkg("orphan"), pkg("z"));
        let edges = g.reachable_edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].0.name, "app");
    }
}

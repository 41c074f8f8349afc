//! Package dependency graph
//!
//! The graph is an append-only list of package records. A package reached
//! along several branches is recorded once per branch; queries by package
//! path see the first record, and ordering merges every record's edges.

use crate::descriptor::PackageDescriptor;
use std::collections::HashMap;

/// Dependency graph built by the resolver
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    records: Vec<PackageDescriptor>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record (duplicates are kept)
    pub fn record(&mut self, package: PackageDescriptor) {
        self.records.push(package);
    }

    /// Every record, in the order they were appended
    pub fn records(&self) -> &[PackageDescriptor] {
        &self.records
    }

    /// Number of records, duplicates included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check if a package was recorded at least once
    pub fn contains(&self, package_path: &str) -> bool {
        self.records.iter().any(|r| r.package_path == package_path)
    }

    /// First record of a package
    pub fn get(&self, package_path: &str) -> Option<&PackageDescriptor> {
        self.records.iter().find(|r| r.package_path == package_path)
    }

    /// How many times a package was recorded
    pub fn occurrences(&self, package_path: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.package_path == package_path)
            .count()
    }

    /// Distinct package paths in first-discovery order
    pub fn package_paths(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.package_path.as_str()) {
                seen.push(record.package_path.as_str());
            }
        }
        seen
    }

    /// Dependencies of a package, merged across all of its records
    pub fn edges(&self, package_path: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for record in self.records.iter().filter(|r| r.package_path == package_path) {
            for dep in &record.dependencies {
                if !deps.contains(&dep.as_str()) {
                    deps.push(dep.as_str());
                }
            }
        }
        deps
    }

    /// Linear order of all distinct packages, dependencies first
    ///
    /// Independent packages keep their first-discovery order. A cycle that
    /// survived resolution is broken by ignoring the edge that closes it.
    /// Edges to packages that were never recorded are ignored.
    pub fn topological_order(&self) -> Vec<String> {
        let nodes = self.package_paths();
        let edges: HashMap<&str, Vec<&str>> =
            nodes.iter().map(|&n| (n, self.edges(n))).collect();

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(nodes.len());

        for &node in &nodes {
            Self::visit(node, &edges, &mut marks, &mut order);
        }

        order
    }

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) {
        if marks.contains_key(node) {
            return;
        }
        marks.insert(node, Mark::Active);

        if let Some(deps) = edges.get(node) {
            for &dep in deps {
                match marks.get(dep).copied() {
                    // Back-edge: dropped
                    Some(Mark::Active) => continue,
                    Some(Mark::Done) => continue,
                    None if edges.contains_key(dep) => Self::visit(dep, edges, marks, order),
                    None => continue,
                }
            }
        }

        marks.insert(node, Mark::Done);
        order.push(node.to_string());
    }
}

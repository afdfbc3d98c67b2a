use std::collections::{BTreeSet, HashMap, VecDeque};

use super::{
    references::{any_node, Edge},
    Kind, ObjectRef,
};

/// Reverse references between stored objects, maintained incrementally per contributing object.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    contributed: HashMap<ObjectRef, Vec<Edge>>,
    dependents: HashMap<ObjectRef, HashMap<ObjectRef, usize>>,
}

impl ReferenceIndex {
    pub fn replace(&mut self, origin: &ObjectRef, edges: Vec<Edge>) {
        self.remove(origin);
        for edge in &edges {
            *self.dependents.entry(edge.dependency.clone()).or_default().entry(edge.dependent.clone()).or_default() += 1;
        }
        if !edges.is_empty() {
            self.contributed.insert(origin.clone(), edges);
        }
    }

    pub fn remove(&mut self, origin: &ObjectRef) {
        let Some(edges) = self.contributed.remove(origin) else {
            return;
        };
        for edge in edges {
            if let Some(dependents) = self.dependents.get_mut(&edge.dependency) {
                if let Some(count) = dependents.get_mut(&edge.dependent) {
                    *count -= 1;
                    if *count == 0 {
                        dependents.remove(&edge.dependent);
                    }
                }
                if dependents.is_empty() {
                    self.dependents.remove(&edge.dependency);
                }
            }
        }
    }

    /// Every Gateway and GatewayClass transitively depending on `origin`, `origin` included.
    pub fn impacted(&self, origin: &ObjectRef) -> BTreeSet<ObjectRef> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([origin.clone()]);
        if origin.kind == Kind::Node {
            queue.push_back(any_node());
        }
        let mut impacted = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if matches!(current.kind, Kind::Gateway | Kind::GatewayClass) {
                impacted.insert(current.clone());
            }
            if let Some(dependents) = self.dependents.get(&current) {
                queue.extend(dependents.keys().filter(|dependent| !visited.contains(*dependent)).cloned());
            }
        }
        impacted
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.contributed.is_empty() && self.dependents.is_empty()
    }
}

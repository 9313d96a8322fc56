use std::collections::{BTreeSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use crate::graph::GraphModel;
use crate::ir::{Direction, GraphDefinition, NodeDefinition};

use super::Layout;

/// Fingerprint of everything a layout depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutKey(u64);

impl LayoutKey {
    pub fn new(model: &GraphModel, direction: Direction, expanded: &BTreeSet<String>) -> Self {
        let mut hasher = DefaultHasher::new();
        direction.hash(&mut hasher);
        model.nodes.len().hash(&mut hasher);
        for node in model.nodes.values() {
            node.id.hash(&mut hasher);
            node.group_id.hash(&mut hasher);
            let kind: u8 = match node.definition {
                NodeDefinition::Asset(_) => 0,
                NodeDefinition::Op(_) => 1,
            };
            kind.hash(&mut hasher);
            node.definition.label().hash(&mut hasher);
            if let Some(hint) = node.definition.size_hint() {
                hint.width.to_bits().hash(&mut hasher);
                hint.height.to_bits().hash(&mut hasher);
            }
        }
        for (from, targets) in &model.downstream {
            from.hash(&mut hasher);
            targets.hash(&mut hasher);
        }
        expanded.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Bounded most-recently-used store of computed layouts.
#[derive(Debug)]
pub struct LayoutCache {
    capacity: usize,
    entries: VecDeque<(LayoutKey, Arc<Layout>)>,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(16)
    }
}

impl LayoutCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: LayoutKey) -> Option<Arc<Layout>> {
        let idx = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(idx)?;
        let layout = Arc::clone(&entry.1);
        self.entries.push_front(entry);
        Some(layout)
    }

    pub fn insert(&mut self, key: LayoutKey, layout: Arc<Layout>) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push_front((key, layout));
        self.entries.truncate(self.capacity);
    }

    pub fn get_or_compute<F>(&mut self, key: LayoutKey, compute: F) -> Arc<Layout>
    where
        F: FnOnce() -> Layout,
    {
        if let Some(layout) = self.get(key) {
            return layout;
        }
        let layout = Arc::new(compute());
        self.insert(key, Arc::clone(&layout));
        layout
    }

    /// Drops every entry, e.g. when the sizer or config changes.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RawNode;

    fn model(edge: bool) -> GraphModel {
        let a = RawNode::asset(&["a"]);
        let a = if edge { a.with_downstream(&["b"]) } else { a };
        GraphModel::build(&[a, RawNode::asset(&["b"])]).unwrap()
    }

    #[test]
    fn key_tracks_every_input() {
        let none = BTreeSet::new();
        let base = LayoutKey::new(&model(true), Direction::Down, &none);
        assert_eq!(base, LayoutKey::new(&model(true), Direction::Down, &none));
        assert_ne!(base, LayoutKey::new(&model(false), Direction::Down, &none));
        assert_ne!(base, LayoutKey::new(&model(true), Direction::Up, &none));
        let expanded = BTreeSet::from(["g@r@l".to_string()]);
        assert_ne!(base, LayoutKey::new(&model(true), Direction::Down, &expanded));
    }

    #[test]
    fn cache_evicts_least_recent() {
        let mut cache = LayoutCache::new(2);
        let keys: Vec<LayoutKey> = (0..3).map(LayoutKey).collect();
        cache.insert(keys[0], Arc::new(Layout::default()));
        cache.insert(keys[1], Arc::new(Layout::default()));
        assert!(cache.get(keys[0]).is_some());
        cache.insert(keys[2], Arc::new(Layout::default()));
        assert!(cache.get(keys[1]).is_none());
        assert!(cache.get(keys[0]).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn compute_runs_once_until_invalidated() {
        let mut cache = LayoutCache::default();
        let key = LayoutKey(7);
        let mut calls = 0;
        cache.get_or_compute(key, || {
            calls += 1;
            Layout::default()
        });
        cache.get_or_compute(key, || {
            calls += 1;
            Layout::default()
        });
        assert_eq!(calls, 1);
        cache.invalidate();
        assert!(cache.is_empty());
    }
}

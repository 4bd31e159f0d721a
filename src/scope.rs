use std::collections::HashMap;
use std::rc::Rc;

/// Handle to a scope record. A handle whose record has been freed and
/// reused carries an old generation and resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct ScopeRecord<E> {
    owner: String,
    parent: Option<ScopeId>,
    storage: HashMap<String, E>,
    generation: u32,
    /// One strong count per outstanding [`Capture`] plus the record's own.
    anchor: Rc<()>,
    live: bool,
}

/// Keeps a scope chain from being released while a closure needs it.
/// Dropping the last capture of a cleaned record lets the arena reuse it.
#[derive(Debug, Clone, Default)]
pub struct Capture(Vec<Rc<()>>);

/// Arena of chained symbol tables.
///
/// Lookups walk the parent chain. Entries are only ever inserted when
/// absent, values change through the entities themselves.
#[derive(Debug)]
pub struct ScopeArena<E> {
    records: Vec<ScopeRecord<E>>,
    free: Vec<usize>,
    /// Cleaned records still held by a capture.
    retained: Vec<usize>,
}

impl<E: Clone> ScopeArena<E> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            free: Vec::new(),
            retained: Vec::new(),
        }
    }

    pub fn alloc(&mut self, owner: impl Into<String>, parent: Option<ScopeId>) -> ScopeId {
        let owner = owner.into();
        if let Some(index) = self.free.pop() {
            let record = &mut self.records[index];
            record.owner = owner;
            record.parent = parent;
            record.live = true;
            return ScopeId {
                index,
                generation: record.generation,
            };
        }

        self.records.push(ScopeRecord {
            owner,
            parent,
            storage: HashMap::new(),
            generation: 0,
            anchor: Rc::new(()),
            live: true,
        });
        ScopeId {
            index: self.records.len() - 1,
            generation: 0,
        }
    }

    fn record(&self, id: ScopeId) -> Option<&ScopeRecord<E>> {
        self.records
            .get(id.index)
            .filter(|record| record.live && record.generation == id.generation)
    }

    fn record_mut(&mut self, id: ScopeId) -> Option<&mut ScopeRecord<E>> {
        self.records
            .get_mut(id.index)
            .filter(|record| record.live && record.generation == id.generation)
    }

    pub fn is_live(&self, id: ScopeId) -> bool {
        self.record(id).is_some()
    }

    /// Inserts `entity` unless `name` is already bound in this very scope.
    pub fn set(&mut self, id: ScopeId, name: impl Into<String>, entity: E) -> bool {
        let Some(record) = self.record_mut(id) else {
            return false;
        };
        let name = name.into();
        if record.storage.contains_key(&name) {
            return false;
        }
        record.storage.insert(name, entity);
        true
    }

    pub fn get(&self, id: ScopeId, name: &str) -> Option<E> {
        let mut next = Some(id);
        while let Some(current) = next {
            let record = self.record(current)?;
            if let Some(entity) = record.storage.get(name) {
                return Some(entity.clone());
            }
            next = record.parent;
        }
        None
    }

    /// Lookup restricted to the scope itself, parents are not consulted.
    pub fn get_local(&self, id: ScopeId, name: &str) -> Option<E> {
        self.record(id)?.storage.get(name).cloned()
    }

    pub fn has(&self, id: ScopeId, name: &str) -> bool {
        self.get(id, name).is_some()
    }

    pub fn owner(&self, id: ScopeId) -> &str {
        self.record(id).map_or("<released>", |record| record.owner.as_str())
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.record(id)?.parent
    }

    /// Names bound directly in the scope, sorted.
    pub fn names(&self, id: ScopeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .record(id)
            .map(|record| record.storage.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Pins the scope and all its ancestors for as long as the returned
    /// capture lives.
    pub fn capture(&self, id: ScopeId) -> Capture {
        let mut anchors = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let Some(record) = self.record(current) else {
                break;
            };
            anchors.push(Rc::clone(&record.anchor));
            next = record.parent;
        }
        Capture(anchors)
    }

    /// Drops every local entry. Records no capture pins go back to the
    /// free list and their handles become stale. Pinned records stay
    /// empty until their last capture is gone.
    pub fn clean(&mut self, id: ScopeId) {
        let Some(record) = self.record_mut(id) else {
            return;
        };
        let storage = std::mem::take(&mut record.storage);
        // Entries may hold the only captures of this very record.
        drop(storage);
        if Rc::strong_count(&self.records[id.index].anchor) > 1 {
            if !self.retained.contains(&id.index) {
                self.retained.push(id.index);
            }
        } else {
            self.release(id.index);
        }
        self.sweep();
    }

    /// Releases retained records whose captures have all been dropped.
    pub fn sweep(&mut self) {
        let mut index = 0;
        while index < self.retained.len() {
            let slot = self.retained[index];
            if Rc::strong_count(&self.records[slot].anchor) == 1 {
                self.retained.swap_remove(index);
                self.release(slot);
            } else {
                index += 1;
            }
        }
    }

    fn release(&mut self, index: usize) {
        let record = &mut self.records[index];
        record.storage.clear();
        record.live = false;
        record.parent = None;
        record.generation = record.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.iter().filter(|record| record.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> Default for ScopeArena<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_sees_parent_entries() {
        let mut scopes = ScopeArena::new();
        let parent = scopes.alloc("parent", None);
        let child = scopes.alloc("child", Some(parent));
        assert!(scopes.set(parent, "x", 1));
        assert_eq!(scopes.get(child, "x"), Some(1));
        assert!(scopes.has(child, "x"));
        assert_eq!(scopes.get_local(child, "x"), None);
    }

    #[test]
    fn set_never_overwrites() {
        let mut scopes = ScopeArena::new();
        let scope = scopes.alloc("main", None);
        assert!(scopes.set(scope, "x", 1));
        assert!(!scopes.set(scope, "x", 2));
        assert_eq!(scopes.get(scope, "x"), Some(1));
    }

    #[test]
    fn child_binding_shadows_without_touching_parent() {
        let mut scopes = ScopeArena::new();
        let parent = scopes.alloc("parent", None);
        let child = scopes.alloc("child", Some(parent));
        scopes.set(parent, "x", 1);
        assert!(scopes.set(child, "x", 2));
        assert_eq!(scopes.get(child, "x"), Some(2));
        assert_eq!(scopes.get(parent, "x"), Some(1));
    }

    #[test]
    fn clean_frees_and_invalidates_handles() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc("root", None);
        let call = scopes.alloc("f", Some(root));
        scopes.set(call, "n", 5);
        scopes.clean(call);
        assert!(!scopes.is_live(call));
        assert_eq!(scopes.get(call, "n"), None);

        let reused = scopes.alloc("g", Some(root));
        assert_ne!(reused, call);
        assert!(!scopes.set(call, "n", 6));
        assert_eq!(scopes.get(reused, "n"), None);
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn captured_scopes_survive_clean_empty() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc("root", None);
        let call = scopes.alloc("f", Some(root));
        scopes.set(root, "g", 1);
        scopes.set(call, "n", 5);
        let capture = scopes.capture(call);
        scopes.clean(call);
        assert!(scopes.is_live(call));
        assert_eq!(scopes.get(call, "n"), None);
        assert_eq!(scopes.get(call, "g"), Some(1));
        assert_eq!(scopes.owner(call), "f");
        drop(capture);
    }

    #[test]
    fn dropped_capture_releases_on_sweep() {
        let mut scopes: ScopeArena<i32> = ScopeArena::new();
        let root = scopes.alloc("root", None);
        let call = scopes.alloc("f", Some(root));
        let capture = scopes.capture(call);
        scopes.clean(call);
        assert_eq!(scopes.len(), 2);

        drop(capture);
        scopes.sweep();
        assert!(!scopes.is_live(call));
        assert!(scopes.is_live(root));
        assert_eq!(scopes.len(), 1);
    }

    #[test]
    fn capture_stored_in_the_scope_does_not_pin_it() {
        let mut scopes: ScopeArena<Option<Capture>> = ScopeArena::new();
        let root = scopes.alloc("root", None);
        for _ in 0..10 {
            let call = scopes.alloc("f", Some(root));
            let capture = scopes.capture(call);
            scopes.set(call, "inner", Some(capture));
            scopes.clean(call);
            assert!(!scopes.is_live(call));
        }
        assert_eq!(scopes.len(), 1);
    }

    #[test]
    fn nested_captures_release_together() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc("root", None);
        let outer = scopes.alloc("outer", Some(root));
        let inner = scopes.alloc("inner", Some(outer));
        scopes.set(root, "x", 1);
        let capture = scopes.capture(inner);
        scopes.clean(inner);
        scopes.clean(outer);
        assert_eq!(scopes.get(inner, "x"), Some(1));

        drop(capture);
        let next = scopes.alloc("g", Some(root));
        scopes.clean(next);
        assert_eq!(scopes.len(), 1);
    }
}

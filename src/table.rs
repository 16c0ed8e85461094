// Open-addressed, linear-probed hash table with tombstone deletion,
// per spec.md §4.2. The same structure underlies the intern table
// (`VM::strings`), globals, per-class methods, and per-instance fields —
// all of them keyed by canonical (interned) string `ObjRef`s, compared by
// identity, exactly as spec.md's invariant 2 permits.
//
// Generalizes the teacher's `Env<T>` scope-chain map (`env.rs`), which
// was a `Vec<HashMap<String, T>>` stack with no tombstones or load-factor
// control, into the single-map, open-addressed contract the spec requires.

use crate::heap::{Heap, ObjRef};
use crate::object::Obj;
use crate::value::Value;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Clone, Copy)]
enum Entry {
    Empty,
    Tombstone,
    Occupied { key: ObjRef, hash: u32, value: Value },
}

pub struct Table {
    entries: Vec<Entry>,
    count: usize, // occupied + tombstones, used for the load-factor check
}

impl Table {
    pub fn new() -> Table {
        Table {
            entries: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Occupied { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys are always already-interned strings, whose hash is precomputed
    /// and stored on the `ObjString` itself.
    pub fn hash_of(heap: &Heap, key: ObjRef) -> u32 {
        match heap.get(key) {
            Obj::String(s) => s.hash,
            other => panic!("table keys must be interned strings, got {:?}", other.type_name()),
        }
    }

    /// Finds the slot a key of the given hash should occupy: the first
    /// empty slot or an exact key match, remembering the first tombstone
    /// seen so insertion can reuse it.
    fn find_slot(entries: &[Entry], key: ObjRef, hash: u32) -> usize {
        let cap = entries.len();
        let mut index = (hash as usize) & (cap - 1);
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Entry::Empty => return tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Entry::Occupied { key: k, .. } if *k == key => return index,
                Entry::Occupied { .. } => {}
            }
            index = (index + 1) & (cap - 1);
        }
    }

    fn grow(&mut self) {
        let new_cap = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };
        let mut new_entries = vec![Entry::Empty; new_cap];
        let mut new_count = 0;
        for entry in &self.entries {
            if let Entry::Occupied { key, hash, value } = entry {
                let index = Self::find_slot(&new_entries, *key, *hash);
                new_entries[index] = Entry::Occupied {
                    key: *key,
                    hash: *hash,
                    value: *value,
                };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Returns `true` if `key` was newly inserted (matches clox's
    /// `tableSet` return value). Takes the key's hash directly so a table
    /// nested inside a heap object (a class's methods, an instance's
    /// fields) can be mutated without an overlapping immutable borrow of
    /// the same heap to compute it.
    pub fn set_with_hash(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        if self.entries.is_empty()
            || (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD
        {
            self.grow();
        }
        let index = Self::find_slot(&self.entries, key, hash);
        let is_new = !matches!(self.entries[index], Entry::Occupied { .. });
        if is_new && !matches!(self.entries[index], Entry::Tombstone) {
            self.count += 1;
        }
        self.entries[index] = Entry::Occupied { key, hash, value };
        is_new
    }

    pub fn set(&mut self, heap: &Heap, key: ObjRef, value: Value) -> bool {
        let hash = Self::hash_of(heap, key);
        self.set_with_hash(key, hash, value)
    }

    pub fn get_with_hash(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let index = Self::find_slot(&self.entries, key, hash);
        match self.entries[index] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get(&self, heap: &Heap, key: ObjRef) -> Option<Value> {
        let hash = Self::hash_of(heap, key);
        self.get_with_hash(key, hash)
    }

    /// Leaves a tombstone so later probe chains through this bucket are
    /// not broken.
    pub fn delete_with_hash(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let index = Self::find_slot(&self.entries, key, hash);
        if matches!(self.entries[index], Entry::Occupied { .. }) {
            self.entries[index] = Entry::Tombstone;
            true
        } else {
            false
        }
    }

    pub fn delete(&mut self, heap: &Heap, key: ObjRef) -> bool {
        let hash = Self::hash_of(heap, key);
        self.delete_with_hash(key, hash)
    }

    /// Copies every entry of `self` into `dst`. Needs no heap access:
    /// each entry already carries its key's hash, which is how `OP_INHERIT`
    /// can copy a superclass's methods into a subclass's table while both
    /// tables live inside heap objects.
    pub fn add_all(&self, dst: &mut Table) {
        for (key, hash, value) in self.iter_with_hash() {
            dst.set_with_hash(key, hash, value);
        }
    }

    /// Bytewise lookup used only by string interning: `chars`/`hash` are
    /// the bytes of a not-yet-canonical string, so there is no `ObjRef`
    /// to compare by identity yet.
    pub fn find_string(&self, heap: &Heap, chars: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let cap = self.entries.len();
        let mut index = (hash as usize) & (cap - 1);
        loop {
            match &self.entries[index] {
                Entry::Empty => return None,
                Entry::Occupied { key, hash: h, .. } => {
                    if *h == hash {
                        if let Obj::String(s) = heap.get(*key) {
                            if s.chars.as_str() == chars {
                                return Some(*key);
                            }
                        }
                    }
                }
                Entry::Tombstone => {}
            }
            index = (index + 1) & (cap - 1);
        }
    }

    /// Iterates `(key, value)` pairs, used by the GC to mark a table's
    /// contents and by the intern-table sweep to find dead keys.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Occupied { key, value, .. } => Some((*key, *value)),
            _ => None,
        })
    }

    /// Like `iter`, but also yields each entry's precomputed hash.
    pub fn iter_with_hash(&self) -> impl Iterator<Item = (ObjRef, u32, Value)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Occupied { key, hash, value } => Some((*key, *hash, *value)),
            _ => None,
        })
    }

    /// Removes every entry whose key is not marked (leaving tombstones),
    /// per spec.md §4.7 step 3 — the intern table holds weak references.
    pub fn remove_unmarked(&mut self, heap: &Heap) {
        for entry in &mut self.entries {
            if let Entry::Occupied { key, .. } = entry {
                if !heap.is_marked(*key) {
                    *entry = Entry::Tombstone;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjString;

    fn intern(heap: &mut Heap, s: &str) -> ObjRef {
        let hash = crate::object::fnv1a(s.as_bytes());
        heap.alloc(Obj::String(ObjString {
            chars: s.to_string(),
            hash,
        }))
    }

    #[test]
    fn set_get_roundtrip() {
        let mut heap = Heap::new();
        let key = intern(&mut heap, "answer");
        let mut table = Table::new();
        assert!(table.set(&heap, key, Value::Number(42.0)));
        assert_eq!(table.get(&heap, key).unwrap().as_number(), Some(42.0));
    }

    #[test]
    fn set_returns_false_on_overwrite() {
        let mut heap = Heap::new();
        let key = intern(&mut heap, "x");
        let mut table = Table::new();
        assert!(table.set(&heap, key, Value::Number(1.0)));
        assert!(!table.set(&heap, key, Value::Number(2.0)));
        assert_eq!(table.get(&heap, key).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn delete_leaves_probe_chain_intact() {
        let mut heap = Heap::new();
        let a = intern(&mut heap, "a");
        let b = intern(&mut heap, "b");
        let mut table = Table::new();
        table.set(&heap, a, Value::Number(1.0));
        table.set(&heap, b, Value::Number(2.0));
        assert!(table.delete(&heap, a));
        // `b` must still be reachable even though deleting `a` left a
        // tombstone somewhere in its probe chain.
        assert_eq!(table.get(&heap, b).unwrap().as_number(), Some(2.0));
        assert!(table.get(&heap, a).is_none());
    }

    #[test]
    fn add_all_copies_every_entry() {
        let mut heap = Heap::new();
        let a = intern(&mut heap, "a");
        let b = intern(&mut heap, "b");
        let mut src = Table::new();
        src.set(&heap, a, Value::Number(1.0));
        src.set(&heap, b, Value::Number(2.0));

        let mut dst = Table::new();
        src.add_all(&mut dst);
        assert_eq!(dst.get(&heap, a).unwrap().as_number(), Some(1.0));
        assert_eq!(dst.get(&heap, b).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn find_string_matches_by_content_not_identity() {
        let mut heap = Heap::new();
        let hash = crate::object::fnv1a(b"hello");
        let key = intern(&mut heap, "hello");
        let mut table = Table::new();
        table.set(&heap, key, Value::Nil);
        assert_eq!(table.find_string(&heap, "hello", hash), Some(key));
        assert_eq!(table.find_string(&heap, "goodbye", hash), None);
    }
}

//! Memoized split results per (OID, tile mesh).
//!
//! Entries reference the shared vertex buffers of their source mesh, so the
//! whole cache is dropped whenever tile content loads. There is no per-entry
//! expiry.

use crate::scene::{MeshId, TileMesh};
use std::collections::HashMap;
use std::rc::Rc;
use tilemesh::Oid;

#[derive(Debug, Default)]
pub struct SplitMeshCache {
    entries: HashMap<(Oid, MeshId), Vec<Rc<TileMesh>>>,
    hits: u64,
    misses: u64,
}

impl SplitMeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached meshes for the pair, computing and storing them on a miss.
    /// Empty results are cached too.
    pub fn get_or_insert_with(
        &mut self,
        oid: Oid,
        mesh: MeshId,
        compute: impl FnOnce() -> Vec<Rc<TileMesh>>,
    ) -> &[Rc<TileMesh>] {
        let entry = self.entries.entry((oid, mesh));
        match entry {
            std::collections::hash_map::Entry::Occupied(e) => {
                self.hits += 1;
                e.into_mut()
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                self.misses += 1;
                e.insert(compute())
            }
        }
    }

    pub fn get(&self, oid: Oid, mesh: MeshId) -> Option<&[Rc<TileMesh>]> {
        self.entries.get(&(oid, mesh)).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("dropping {} cached split entries", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

//! Subscribable per-OID mesh sets, refreshed after tile loads.

use crate::error::{FilterError, Result};
use crate::scene::TileMesh;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tilemesh::Oid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectorId(u64);

impl fmt::Display for CollectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collector#{}", self.0)
    }
}

/// Called with the new mesh set whenever it changes.
pub type MeshListener = Box<dyn FnMut(&[Rc<TileMesh>])>;

struct Collector {
    oid: Oid,
    meshes: Vec<Rc<TileMesh>>,
    listeners: Vec<MeshListener>,
}

#[derive(Default)]
pub struct CollectorRegistry {
    next: u64,
    collectors: BTreeMap<CollectorId, Collector>,
}

impl fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.collectors.iter().map(|(id, c)| (id, (c.oid, c.meshes.len()))))
            .finish()
    }
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, oid: Oid, meshes: Vec<Rc<TileMesh>>) -> CollectorId {
        self.next += 1;
        let id = CollectorId(self.next);
        self.collectors.insert(
            id,
            Collector {
                oid,
                meshes,
                listeners: Vec::new(),
            },
        );
        id
    }

    pub fn subscribe(
        &mut self,
        id: CollectorId,
        listener: impl FnMut(&[Rc<TileMesh>]) + 'static,
    ) -> Result<()> {
        self.get_mut(id)?.listeners.push(Box::new(listener));
        Ok(())
    }

    pub fn meshes(&self, id: CollectorId) -> Result<&[Rc<TileMesh>]> {
        self.collectors
            .get(&id)
            .map(|c| c.meshes.as_slice())
            .ok_or(FilterError::UnknownCollector(id))
    }

    pub fn release(&mut self, id: CollectorId) -> Result<()> {
        self.collectors
            .remove(&id)
            .map(|_| ())
            .ok_or(FilterError::UnknownCollector(id))
    }

    /// Every live collector and the oid it tracks.
    pub fn entries(&self) -> Vec<(CollectorId, Oid)> {
        self.collectors.iter().map(|(id, c)| (*id, c.oid)).collect()
    }

    /// Replaces a collector's meshes and notifies its listeners if the set
    /// differs by identity. Returns whether listeners were notified.
    pub fn update(&mut self, id: CollectorId, meshes: Vec<Rc<TileMesh>>) -> Result<bool> {
        let collector = self.get_mut(id)?;
        if same_meshes(&collector.meshes, &meshes) {
            return Ok(false);
        }

        collector.meshes = meshes;
        for listener in &mut collector.listeners {
            listener(&collector.meshes);
        }
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.collectors.clear();
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    fn get_mut(&mut self, id: CollectorId) -> Result<&mut Collector> {
        self.collectors
            .get_mut(&id)
            .ok_or(FilterError::UnknownCollector(id))
    }
}

fn same_meshes(a: &[Rc<TileMesh>], b: &[Rc<TileMesh>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
}

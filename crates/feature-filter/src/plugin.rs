//! Host-facing facade: hidden-OID state plus the per-tile bookkeeping behind it.
//!
//! The host drives the plugin from its tile loop. Each call that loads,
//! replaces or disposes tile content has a matching `on_*` hook here, and
//! `prepare_frame` runs once per frame before materials are compiled.

use crate::cache::SplitMeshCache;
use crate::collector::{CollectorId, CollectorRegistry};
use crate::config::FilterConfig;
use crate::error::Result;
use crate::filter::VisibilityFilter;
use crate::material::MaterialId;
use crate::resolver::OidResolver;
use crate::scene::{MeshId, TileId, TileMesh, TileScene};
use crate::splitter::split_mesh_by_oid;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::rc::Rc;
use tilemesh::{feature_id_from_f32, Oid, Properties};

/// What a picked triangle belongs to.
#[derive(Debug, Clone)]
pub struct FeatureInfo {
    pub mesh: MeshId,
    pub feature_id: u32,
    pub oid: Option<Oid>,
    pub properties: Properties,
    /// The oid is currently in the hidden set.
    pub hidden: bool,
}

#[derive(Debug)]
pub struct TilesFilterPlugin {
    config: FilterConfig,
    hidden: Vec<Oid>,
    resolver: OidResolver,
    filter: VisibilityFilter,
    cache: SplitMeshCache,
    collectors: CollectorRegistry,
}

impl TilesFilterPlugin {
    /// `device_uniform_limit` is the number of uniform vectors the device can
    /// bind; `config.uniform_limit` overrides it.
    pub fn new(config: FilterConfig, device_uniform_limit: usize) -> Result<Self> {
        config.validate()?;
        let limit = config.effective_uniform_limit(device_uniform_limit);
        let filter = VisibilityFilter::new(&config, limit);
        info!(
            "feature filter: capacity {}, uniform limit {}",
            filter.capacity(),
            limit
        );

        Ok(Self {
            resolver: OidResolver::new(config.duplicate_oids),
            filter,
            config,
            hidden: Vec::new(),
            cache: SplitMeshCache::new(),
            collectors: CollectorRegistry::new(),
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Processes every tile already resident in `scene`.
    pub fn init(&mut self, scene: &TileScene) {
        for tile in scene.tile_ids() {
            self.on_load_model(scene, tile);
        }
    }

    /// A tile's content became resident (or was replaced).
    pub fn on_load_model(&mut self, scene: &TileScene, tile: TileId) {
        self.cache.clear();
        self.resolver.forget_tile(tile);

        let Some(content) = scene.tile(tile) else {
            warn!("{}: load event for a tile that is not resident", tile);
            return;
        };

        let indexed = self.resolver.index_tile(content);

        let mut configured = 0;
        for mesh in content.meshes.iter().filter(|m| !m.is_split()) {
            if self.filter.setup_material(&mut mesh.material.borrow_mut()) {
                configured += 1;
            }
        }
        debug!(
            "{}: {} meshes, {} indexed, {} materials configured",
            tile,
            content.meshes.len(),
            indexed,
            configured
        );
    }

    /// A batch of tile loads finished; collectors re-query and notify on change.
    pub fn on_tiles_load_end(&mut self, scene: &TileScene) {
        for (id, oid) in self.collectors.entries() {
            let meshes = self.query_by_oid(scene, oid);
            match self.collectors.update(id, meshes) {
                Ok(true) => debug!("{} ({}) changed", id, oid),
                Ok(false) => {}
                Err(e) => warn!("{}", e),
            }
        }
    }

    /// A tile's content was evicted.
    pub fn on_tile_disposed(&mut self, tile: TileId) {
        self.resolver.forget_tile(tile);
        self.cache.clear();
    }

    /// Replaces the hidden set. On overflow nothing changes.
    pub fn hide_by_oids(&mut self, oids: &[Oid]) -> Result<()> {
        let capacity = self.filter.compute_capacity(oids.len())?;
        self.hidden = oids.to_vec();
        self.filter.set_capacity(capacity);
        Ok(())
    }

    pub fn unhide_by_oids(&mut self, oids: &[Oid]) -> Result<()> {
        let remove: HashSet<Oid> = oids.iter().copied().collect();
        let kept: Vec<Oid> = self
            .hidden
            .iter()
            .copied()
            .filter(|oid| !remove.contains(oid))
            .collect();

        let capacity = self.filter.compute_capacity(kept.len())?;
        self.hidden = kept;
        self.filter.set_capacity(capacity);
        Ok(())
    }

    pub fn unhide(&mut self) {
        self.hidden.clear();
        match self.filter.compute_capacity(0) {
            Ok(capacity) => {
                self.filter.set_capacity(capacity);
            }
            Err(e) => warn!("{}", e),
        }
    }

    /// Current compiled length of the hidden-feature array.
    pub fn feature_id_count(&self) -> usize {
        self.filter.capacity()
    }

    pub fn hidden_oids(&self) -> &[Oid] {
        &self.hidden
    }

    pub fn is_hidden(&self, oid: Oid) -> bool {
        self.hidden.contains(&oid)
    }

    pub fn filter(&self) -> &VisibilityFilter {
        &self.filter
    }

    pub fn resolver(&self) -> &OidResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &SplitMeshCache {
        &self.cache
    }

    /// Tile meshes whose id map contains `oid`. Split meshes are never included.
    pub fn tile_meshes_by_oid(&self, scene: &TileScene, oid: Oid) -> Vec<Rc<TileMesh>> {
        scene
            .meshes()
            .filter(|m| !m.is_split() && self.resolver.contains_oid(m.id, oid))
            .cloned()
            .collect()
    }

    /// Renderable single-feature meshes for `oid`, served from the split cache.
    pub fn query_by_oid(&mut self, scene: &TileScene, oid: Oid) -> Vec<Rc<TileMesh>> {
        let mut out = Vec::new();
        for mesh in self.tile_meshes_by_oid(scene, oid) {
            let split = self
                .cache
                .get_or_insert_with(oid, mesh.id, || split_mesh_by_oid(&mesh, oid));
            out.extend(split.iter().cloned());
        }
        out
    }

    /// Maps a picked triangle to its feature.
    pub fn query_feature(&self, scene: &TileScene, mesh: MeshId, triangle: usize) -> Option<FeatureInfo> {
        let mesh = scene.mesh(mesh)?;

        if let Some(origin) = &mesh.split {
            return Some(FeatureInfo {
                mesh: mesh.id,
                feature_id: origin.feature_id,
                oid: Some(origin.oid),
                properties: origin.properties.clone(),
                hidden: self.is_hidden(origin.oid),
            });
        }

        let set = mesh.features.as_ref()?.primary()?;
        let metadata = mesh.metadata.as_ref()?;
        let [a, _, _] = mesh.geometry.triangle(triangle)?;
        let fid = feature_id_from_f32(mesh.geometry.feature_ids(set.attribute)?.get_x(a as usize)?)?;

        let properties = match metadata.property_table_data(set.property_table, fid) {
            Ok(p) => p.clone(),
            Err(e) => {
                warn!("{} '{}': feature {}: {}", mesh.id, mesh.name, fid, e);
                return None;
            }
        };
        let oid = metadata.oid_of(set.property_table, fid).ok().flatten();

        Some(FeatureInfo {
            mesh: mesh.id,
            feature_id: fid,
            oid,
            hidden: oid.is_some_and(|o| self.is_hidden(o)),
            properties,
        })
    }

    /// Syncs every configured material with the current capacity. Returns how
    /// many were flagged for recompile.
    pub fn prepare_frame(&self, scene: &TileScene) -> usize {
        let mut seen: HashSet<MaterialId> = HashSet::new();
        let mut flagged = 0;
        for mesh in scene.meshes() {
            let mut material = mesh.material.borrow_mut();
            if !seen.insert(material.id()) {
                continue;
            }
            if self.filter.sync_material(&mut material) {
                flagged += 1;
            }
        }
        if flagged > 0 {
            debug!("{} materials need recompiling", flagged);
        }
        flagged
    }

    /// Hidden-feature uniform contents for one mesh's next draw.
    pub fn uniform_values(&self, mesh: MeshId) -> Vec<f32> {
        self.filter.hidden_feature_values(mesh, &self.hidden, &self.resolver)
    }

    /// Starts tracking the split meshes of `oid`.
    pub fn collect(&mut self, scene: &TileScene, oid: Oid) -> CollectorId {
        let meshes = self.query_by_oid(scene, oid);
        self.collectors.register(oid, meshes)
    }

    pub fn subscribe(
        &mut self,
        id: CollectorId,
        listener: impl FnMut(&[Rc<TileMesh>]) + 'static,
    ) -> Result<()> {
        self.collectors.subscribe(id, listener)
    }

    pub fn collector_meshes(&self, id: CollectorId) -> Result<&[Rc<TileMesh>]> {
        self.collectors.meshes(id)
    }

    pub fn release_collector(&mut self, id: CollectorId) -> Result<()> {
        self.collectors.release(id)
    }

    /// Drops collectors, cached splits and id maps. Configured materials keep
    /// their filter.
    pub fn dispose(&mut self) {
        self.collectors.clear();
        self.cache.clear();
        self.resolver.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::material::Material;
    use crate::test_support::{feature_mesh, feature_mesh_with};
    use glam::{Mat4, Vec3};
    use std::cell::RefCell;

    /// Tile 1: features 0,1 -> oids 100,101. Tile 2: feature 0 -> oid 101.
    fn scene() -> TileScene {
        let mut scene = TileScene::new();
        scene.insert_tile(
            TileId(1),
            vec![feature_mesh(TileId(1), &[0, 0, 0, 1, 1, 1], &[Some(100), Some(101)])],
        );
        scene.insert_tile(
            TileId(2),
            vec![feature_mesh(TileId(2), &[0, 0, 0], &[Some(101)])],
        );
        scene
    }

    fn plugin(scene: &TileScene) -> TilesFilterPlugin {
        let mut p = TilesFilterPlugin::new(FilterConfig::default(), 1024).unwrap();
        p.init(scene);
        p
    }

    fn oids(v: &[u64]) -> Vec<Oid> {
        v.iter().copied().map(Oid).collect()
    }

    #[test]
    fn hide_is_idempotent() {
        let scene = scene();
        let mut p = plugin(&scene);
        let mesh = scene.tile(TileId(1)).unwrap().meshes[0].id;

        p.hide_by_oids(&oids(&[100])).unwrap();
        let once = p.uniform_values(mesh);
        p.hide_by_oids(&oids(&[100])).unwrap();

        assert_eq!(p.uniform_values(mesh), once);
        assert_eq!(p.feature_id_count(), 32);
        assert_eq!(p.hidden_oids(), &oids(&[100])[..]);
    }

    #[test]
    fn unhide_restores_previous_state() {
        let scene = scene();
        let mut p = plugin(&scene);
        let mesh = scene.tile(TileId(1)).unwrap().meshes[0].id;

        p.hide_by_oids(&oids(&[100])).unwrap();
        let before = p.uniform_values(mesh);

        let mut more = oids(&[100]);
        more.extend(oids(&(200..240).collect::<Vec<_>>()));
        p.hide_by_oids(&more).unwrap();
        assert_eq!(p.feature_id_count(), 64);

        p.unhide_by_oids(&oids(&(200..240).collect::<Vec<_>>())).unwrap();
        assert_eq!(p.feature_id_count(), 32);
        assert_eq!(p.uniform_values(mesh), before);

        p.unhide();
        assert!(p.hidden_oids().is_empty());
        assert!(p.uniform_values(mesh).iter().all(|&v| v == -1.0));

        p.hide_by_oids(&oids(&[1, 2, 3])).unwrap();
        p.unhide_by_oids(&oids(&[2])).unwrap();
        assert_eq!(p.hidden_oids(), oids(&[1, 3]).as_slice());
    }

    #[test]
    fn overflow_leaves_state_unchanged() {
        let scene = scene();
        let config = FilterConfig {
            uniform_limit: Some(64),
            ..Default::default()
        };
        let mut p = TilesFilterPlugin::new(config, 4096).unwrap();
        p.init(&scene);
        p.hide_by_oids(&oids(&[100])).unwrap();

        let too_many = oids(&(0..65).collect::<Vec<_>>());
        let err = p.hide_by_oids(&too_many).unwrap_err();
        assert!(matches!(err, FilterError::CapacityOverflow { requested: 65, limit: 64 }));
        assert_eq!(p.hidden_oids(), &oids(&[100])[..]);
        assert_eq!(p.feature_id_count(), 32);
    }

    #[test]
    fn recompiles_only_at_power_of_two_crossings() {
        let scene = scene();
        let mut p = plugin(&scene);
        for mesh in scene.meshes() {
            mesh.material.borrow_mut().mark_compiled();
        }

        p.hide_by_oids(&oids(&(0..20).collect::<Vec<_>>())).unwrap();
        assert_eq!(p.prepare_frame(&scene), 0);

        p.hide_by_oids(&oids(&(0..33).collect::<Vec<_>>())).unwrap();
        assert_eq!(p.prepare_frame(&scene), 2);
        assert!(scene.meshes().all(|m| m.material.borrow().needs_update()));
        // Already synced.
        assert_eq!(p.prepare_frame(&scene), 0);

        p.hide_by_oids(&oids(&(0..60).collect::<Vec<_>>())).unwrap();
        assert_eq!(p.prepare_frame(&scene), 0);
    }

    #[test]
    fn shared_materials_are_configured_once() {
        let material = Material::new("shared").into_shared();
        let mut scene = TileScene::new();
        scene.insert_tile(
            TileId(1),
            vec![
                feature_mesh_with(TileId(1), &[0, 0, 0], &[Some(1)], material.clone()),
                feature_mesh_with(TileId(1), &[0, 0, 0], &[Some(2)], material.clone()),
            ],
        );
        let mut p = plugin(&scene);
        material.borrow_mut().mark_compiled();

        p.hide_by_oids(&oids(&(0..40).collect::<Vec<_>>())).unwrap();
        assert_eq!(p.prepare_frame(&scene), 1);
        let src = material.borrow().compile().unwrap();
        assert_eq!(src.matches("fn should_hide_feature(").count(), 1);
    }

    #[test]
    fn uniform_values_are_per_mesh() {
        let scene = scene();
        let mut p = plugin(&scene);
        let a = scene.tile(TileId(1)).unwrap().meshes[0].id;
        let b = scene.tile(TileId(2)).unwrap().meshes[0].id;

        p.hide_by_oids(&oids(&[100, 101])).unwrap();
        assert_eq!(&p.uniform_values(a)[..2], &[0.0, 1.0]);
        assert_eq!(&p.uniform_values(b)[..2], &[-1.0, 0.0]);
    }

    #[test]
    fn query_spans_tiles_and_is_cached() {
        let scene = scene();
        let mut p = plugin(&scene);

        let first = p.query_by_oid(&scene, Oid(101));
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|m| m.is_split()));

        let second = p.query_by_oid(&scene, Oid(101));
        assert!(first.iter().zip(&second).all(|(a, b)| Rc::ptr_eq(a, b)));

        assert!(p.query_by_oid(&scene, Oid(999)).is_empty());
    }

    #[test]
    fn reload_invalidates_cached_splits() {
        let mut scene = scene();
        let mut p = plugin(&scene);
        let before = p.query_by_oid(&scene, Oid(100));

        scene.insert_tile(
            TileId(1),
            vec![feature_mesh(TileId(1), &[0, 0, 0, 1, 1, 1], &[Some(100), Some(101)])],
        );
        p.on_load_model(&scene, TileId(1));

        let after = p.query_by_oid(&scene, Oid(100));
        assert_eq!(after.len(), 1);
        assert!(!Rc::ptr_eq(&before[0], &after[0]));
    }

    #[test]
    fn split_meshes_are_not_scanned() {
        let mut scene = scene();
        let mut p = plugin(&scene);
        let split = p.query_by_oid(&scene, Oid(100));

        // Put the split mesh into the scene, as a host would when rendering it.
        let split_mesh = (*split[0]).clone();
        scene.insert_tile(TileId(9), vec![split_mesh]);
        p.on_load_model(&scene, TileId(9));

        let tiles = p.tile_meshes_by_oid(&scene, Oid(100));
        assert_eq!(tiles.len(), 1);
        assert!(!tiles[0].is_split());
        assert!(!scene.tile(TileId(9)).unwrap().meshes[0].material.borrow().is_filtered());
    }

    #[test]
    fn cloned_meshes_keep_their_own_identity() {
        let a = feature_mesh(TileId(1), &[0, 0, 0], &[Some(7)]);
        let mut b = a
            .clone()
            .with_transform(Mat4::from_translation(Vec3::new(100.0, 0.0, 0.0)));
        b.tile = TileId(2);
        assert_ne!(a.id, b.id);

        let mut scene = TileScene::new();
        scene.insert_tile(TileId(1), vec![a]);
        scene.insert_tile(TileId(2), vec![b]);
        let mut p = plugin(&scene);
        assert_eq!(p.resolver().len(), 2);

        let splits = p.query_by_oid(&scene, Oid(7));
        assert_eq!(splits.len(), 2);
        assert!(!Rc::ptr_eq(&splits[0], &splits[1]));
        let xs: Vec<f32> = splits.iter().map(|m| m.transform.w_axis.x).collect();
        assert_eq!(xs, vec![0.0, 100.0]);
    }

    #[test]
    fn query_feature_resolves_picked_triangles() {
        let scene = scene();
        let mut p = plugin(&scene);
        p.hide_by_oids(&oids(&[101])).unwrap();
        let mesh = scene.tile(TileId(1)).unwrap().meshes[0].id;

        let info = p.query_feature(&scene, mesh, 1).unwrap();
        assert_eq!(info.feature_id, 1);
        assert_eq!(info.oid, Some(Oid(101)));
        assert!(info.hidden);

        let info = p.query_feature(&scene, mesh, 0).unwrap();
        assert_eq!(info.oid, Some(Oid(100)));
        assert!(!info.hidden);

        assert!(p.query_feature(&scene, mesh, 2).is_none());
    }

    #[test]
    fn collectors_follow_tile_loads() {
        let mut scene = scene();
        let mut p = plugin(&scene);

        let id = p.collect(&scene, Oid(101));
        assert_eq!(p.collector_meshes(id).unwrap().len(), 2);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        p.subscribe(id, move |m: &[Rc<TileMesh>]| sink.borrow_mut().push(m.len()))
            .unwrap();

        // Nothing reloaded: cached splits, same identities, no event.
        p.on_tiles_load_end(&scene);
        assert!(events.borrow().is_empty());

        scene.remove_tile(TileId(2));
        p.on_tile_disposed(TileId(2));
        p.on_tiles_load_end(&scene);
        assert_eq!(*events.borrow(), vec![1]);

        p.release_collector(id).unwrap();
        assert!(matches!(
            p.collector_meshes(id),
            Err(FilterError::UnknownCollector(_))
        ));
    }

    #[test]
    fn dispose_drops_bookkeeping() {
        let scene = scene();
        let mut p = plugin(&scene);
        let id = p.collect(&scene, Oid(100));

        p.dispose();
        assert!(p.resolver().is_empty());
        assert!(p.cache().is_empty());
        assert!(p.collector_meshes(id).is_err());
        assert!(p.tile_meshes_by_oid(&scene, Oid(100)).is_empty());
    }
}

//! Entry point for `featurectl`.

mod config;
mod report;
mod scene_file;

use anyhow::{Context, Result};
use clap::Parser;
use config::Args;
use feature_filter::gpu::{coverage, GpuContext, SceneRenderer};
use feature_filter::{FilterConfig, TileId, TileMesh, TileScene, TilesFilterPlugin, DEFAULT_UNIFORM_LIMIT};
use glam::{Mat4, Vec3};
use log::{info, warn};
use report::{CollectorReport, GpuReport, MeshHidden, PickReport, QueryReport, Report, SplitReport};
use scene_file::SceneFile;
use std::cell::Cell;
use std::rc::Rc;
use tilemesh::{Oid, POSITION};

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let file = SceneFile::load(&args.scene)?;

    let mut config = file.filter.clone().unwrap_or_default();
    apply_overrides(&mut config, &args);

    // The device decides the uniform budget when a GPU pass is requested.
    let gpu = if args.gpu {
        Some(pollster::block_on(GpuContext::headless()).context("creating headless GPU context")?)
    } else {
        None
    };
    let device_limit = gpu.as_ref().map_or(DEFAULT_UNIFORM_LIMIT, GpuContext::uniform_vector_limit);

    let (mut scene, mut materials) = file.build()?;
    let mut plugin = TilesFilterPlugin::new(config, device_limit).context("invalid filter configuration")?;
    plugin.init(&scene);
    info!(
        "loaded {} tiles, {} meshes from {}",
        scene.len(),
        scene.meshes().count(),
        args.scene.display()
    );

    let mut report = Report::default();

    if !args.hide.is_empty() {
        let oids = to_oids(&args.hide);
        plugin
            .hide_by_oids(&oids)
            .with_context(|| format!("hiding {} oids", oids.len()))?;
    }
    if !args.unhide.is_empty() {
        plugin.unhide_by_oids(&to_oids(&args.unhide))?;
    }
    report.hidden = plugin.hidden_oids().iter().map(|o| o.0).collect();
    report.feature_id_count = plugin.feature_id_count();
    report.recompiled_materials = plugin.prepare_frame(&scene);
    report.meshes = hidden_per_mesh(&plugin, &scene);

    // Collectors count their notifications until the end of the run.
    let mut collectors = Vec::new();
    for oid in to_oids(&args.query) {
        let id = plugin.collect(&scene, oid);
        let changes = Rc::new(Cell::new(0usize));
        let seen = changes.clone();
        plugin.subscribe(id, move |meshes: &[Rc<TileMesh>]| {
            info!("collector for oid {}: {} meshes", oid, meshes.len());
            seen.set(seen.get() + 1);
        })?;
        collectors.push((oid, id, changes));

        report.queries.push(query_report(&mut plugin, &scene, oid));
    }

    for pick in &args.pick {
        let mesh = scene
            .tile(TileId(pick.tile))
            .and_then(|t| t.meshes.get(pick.mesh))
            .with_context(|| format!("no mesh {} in tile {}", pick.mesh, pick.tile))?;
        let info = plugin.query_feature(&scene, mesh.id, pick.triangle);
        if info.is_none() {
            warn!("pick {}/{}/{} hit no feature", pick.tile, pick.mesh, pick.triangle);
        }
        report.picks.push(PickReport::new(*pick, info));
    }

    if !args.reload.is_empty() {
        for tile in args.reload.iter().copied().map(TileId) {
            let meshes = file.build_tile(tile, &mut materials)?;
            scene.insert_tile(tile, meshes);
            plugin.on_load_model(&scene, tile);
        }
        plugin.on_tiles_load_end(&scene);
        report.recompiled_materials += plugin.prepare_frame(&scene);
    }

    for (oid, id, changes) in &collectors {
        report.collectors.push(CollectorReport {
            oid: oid.0,
            meshes: plugin.collector_meshes(*id)?.len(),
            changes: changes.get(),
        });
    }

    if let Some(path) = &args.wgsl_out {
        let material = materials
            .iter()
            .map(|(_, m)| m.clone())
            .chain(scene.meshes().map(|m| m.material.clone()))
            .find(|m| m.borrow().is_filtered())
            .context("no filtered material in the scene")?;
        let source = material.borrow().compile()?;
        std::fs::write(path, source).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    if let Some(ctx) = &gpu {
        report.gpu = Some(run_gpu(ctx, &mut plugin, &scene, args.size)?);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    plugin.dispose();
    Ok(())
}

fn apply_overrides(config: &mut FilterConfig, args: &Args) {
    if let Some(limit) = args.uniform_limit {
        config.uniform_limit = Some(limit);
    }
    if let Some(min) = args.min_capacity {
        config.min_capacity = min;
    }
    if let Some(policy) = args.duplicate_oids {
        config.duplicate_oids = policy.into();
    }
}

fn to_oids(v: &[u64]) -> Vec<Oid> {
    v.iter().copied().map(Oid).collect()
}

fn hidden_per_mesh(plugin: &TilesFilterPlugin, scene: &TileScene) -> Vec<MeshHidden> {
    let sentinel = plugin.filter().sentinel();
    scene
        .meshes()
        .filter(|m| plugin.resolver().id_map(m.id).is_some())
        .map(|m| MeshHidden {
            tile: m.tile.0,
            mesh: m.name.clone(),
            hidden_feature_ids: plugin
                .uniform_values(m.id)
                .into_iter()
                .filter(|&v| v != sentinel)
                .map(|v| v as u32)
                .collect(),
        })
        .filter(|m| !m.hidden_feature_ids.is_empty())
        .collect()
}

fn query_report(plugin: &mut TilesFilterPlugin, scene: &TileScene, oid: Oid) -> QueryReport {
    let tile_meshes = plugin.tile_meshes_by_oid(scene, oid).len();
    let splits = plugin
        .query_by_oid(scene, oid)
        .iter()
        .filter_map(|m| {
            let origin = m.split.as_ref()?;
            Some(SplitReport {
                name: m.name.clone(),
                tile: m.tile.0,
                feature_id: origin.feature_id,
                triangles: m.geometry.triangle_count(),
                properties: origin.properties.clone(),
            })
        })
        .collect();

    QueryReport {
        oid: oid.0,
        tile_meshes,
        splits,
    }
}

/// Renders the scene, hides nothing, then the requested set, and compares coverage.
fn run_gpu(ctx: &GpuContext, plugin: &mut TilesFilterPlugin, scene: &TileScene, size: u32) -> Result<GpuReport> {
    let meshes: Vec<Rc<TileMesh>> = scene.meshes().cloned().collect();
    let view_proj = fit_view(&meshes);
    let mut renderer = SceneRenderer::new(ctx, size, size);
    let hidden = plugin.hidden_oids().to_vec();

    let coverage_with = |plugin: &mut TilesFilterPlugin, renderer: &mut SceneRenderer, oids: &[Oid]| {
        pollster::block_on(ctx.validated(|| {
            plugin.hide_by_oids(oids)?;
            renderer.render(ctx, plugin, &meshes, view_proj)?;
            Ok(coverage(&renderer.read_pixels(ctx)?))
        }))
    };

    let visible = coverage_with(plugin, &mut renderer, &[])?;
    let filtered = coverage_with(plugin, &mut renderer, &hidden)?;

    Ok(GpuReport {
        adapter: ctx.adapter_info.name.clone(),
        uniform_vector_limit: ctx.uniform_vector_limit(),
        pipelines: renderer.pipelines().len(),
        pipeline_builds: renderer.pipelines().builds(),
        vertex_buffers: renderer.vertex_buffers().len(),
        covered_pixels: visible,
        covered_pixels_filtered: filtered,
    })
}

/// Perspective view looking at the bounding sphere of every mesh.
fn fit_view(meshes: &[Rc<TileMesh>]) -> Mat4 {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for mesh in meshes {
        let Some(pos) = mesh.geometry.attribute(POSITION) else {
            continue;
        };
        for p in pos.data().chunks_exact(3) {
            let w = mesh.transform.transform_point3(Vec3::new(p[0], p[1], p[2]));
            min = min.min(w);
            max = max.max(w);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        return Mat4::IDENTITY;
    }

    let center = (min + max) * 0.5;
    let radius = ((max - min).length() * 0.5).max(1e-3);
    let fov = 45f32.to_radians();
    let distance = radius / (fov * 0.5).sin();
    let eye = center + Vec3::new(0.0, -0.6, 0.8).normalize() * distance;

    let view = Mat4::look_at_rh(eye, center, Vec3::Z);
    let proj = Mat4::perspective_rh(fov, 1.0, distance * 0.01, distance + radius * 2.0);
    proj * view
}

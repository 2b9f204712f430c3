use glam::{Mat4, Vec3};
use rtbridge_headless_app::{init_env, spawn_headless_bridge, triangle};

fn main() -> anyhow::Result<()> {
    let settings = init_env()?;
    let (bridge, stats) = spawn_headless_bridge(settings)?;

    let (positions, normals, uvs, indices) = triangle();
    let geometry = bridge.upload_geometry(7, &positions, &normals, &uvs, &indices)?;
    log::info!("uploaded geometry #7 as index {:#x}", geometry);

    let first = bridge.add_instance(geometry, &Mat4::IDENTITY.to_cols_array())?;
    bridge.build_top_level_structure()?;
    bridge.flush()?;
    log::info!("after first build: {:?} instances", bridge.tlas_instance_count());

    let translated = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
    let second = bridge.add_instance(geometry, &translated.to_cols_array())?;
    bridge.build_top_level_structure()?;
    bridge.flush()?;
    log::info!("after second build: {:?} instances", bridge.tlas_instance_count());

    bridge.remove_instance(first)?;
    bridge.build_top_level_structure()?;
    bridge.flush()?;
    {
        let scene = bridge.scene().lock();
        if let Some(tlas) = scene.tlas() {
            for instance in tlas.instances() {
                log::info!("{} -> blas {:#x}, {:?}", instance.instance, instance.blas_address, instance.transform.w_axis);
            }
        }
    }

    if let Err(e) = bridge.remove_instance(first) {
        log::warn!("second removal rejected: {}", e);
    }
    log::info!(
        "{} blas built, {} tlas built, {} still live",
        stats.blas_built(),
        stats.tlas_built(),
        second
    );
    Ok(())
}

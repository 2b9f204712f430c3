use glam::{Mat4, Quat, Vec3};
use rtbridge_headless_app::{init_env, spawn_headless_bridge, triangle};
use rtbridge_render_interface::camera::CameraState;

const FRAME_COUNT: u32 = 120;
const MAIN_CAMERA: i32 = 0;
/// 俯视的小地图相机，渲染到另一个目标
const MAP_CAMERA: i32 = 1;

fn main() -> anyhow::Result<()> {
    let settings = init_env()?;
    let (bridge, stats) = spawn_headless_bridge(settings)?;

    let (positions, normals, uvs, indices) = triangle();
    let geometry = bridge.upload_geometry(1, &positions, &normals, &uvs, &indices)?;
    let spinning = bridge.add_host_instance(100, geometry, &Mat4::IDENTITY.to_cols_array())?;
    for i in 0..8 {
        let offset = Mat4::from_translation(Vec3::new(i as f32 * 2.0, 0.0, 4.0));
        bridge.add_host_instance(200 + i, geometry, &offset.to_cols_array())?;
    }

    bridge.prepare()?;
    bridge.set_render_target(MAIN_CAMERA, 4, 640, 360, 0x1)?;
    bridge.set_render_target(MAP_CAMERA, 4, 128, 128, 0x2)?;
    bridge.update_camera(
        MAP_CAMERA,
        [0.0, 20.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0],
        [0.1, 100.0, std::f32::consts::FRAC_PI_4],
    );

    let mut reported_failures = 0;
    for frame in 0..FRAME_COUNT {
        let t = frame as f32 / FRAME_COUNT as f32;

        let rotation = Mat4::from_quat(Quat::from_rotation_y(t * std::f32::consts::TAU));
        bridge.update_transform(spinning, &rotation.to_cols_array())?;
        bridge.build_top_level_structure()?;

        let position = Vec3::new(0.0, 1.0, -8.0 + t * 4.0);
        let forward = (Vec3::ZERO - position).normalize();
        let side = forward.cross(Vec3::Y).normalize();
        bridge.update_camera_state(MAIN_CAMERA, &CameraState {
            position,
            forward,
            up: side.cross(forward),
            side,
            near: 0.1,
            far: 100.0,
            fov: 60f32.to_radians(),
        });
        bridge.update_scene_parameters([t, 0.2, 1.0 - t, 1.0]);

        let token = bridge.frame_event_token()?;
        if !bridge.wait_for_frame(token) {
            log::warn!("frame {} timed out", token.frame_id());
        }

        // 构建失败不会打断帧循环，只在这里上报
        let failures = bridge.status().build_failures();
        if failures > reported_failures {
            if let Some(Err(e)) = bridge.last_build() {
                log::error!("frame {}: {}", token.frame_id(), e);
            }
            reported_failures = failures;
        }
    }

    log::info!(
        "{} frames ({} views) traced, last color {:?}, {} bytes of acceleration structures",
        bridge.status().traced_frames(),
        stats.frames_traced(),
        stats.last_clear_color(),
        stats.used_bytes()
    );
    Ok(())
}

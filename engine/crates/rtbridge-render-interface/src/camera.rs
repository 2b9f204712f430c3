use glam::{Vec3, Vec4};

/// 每帧由宿主写入的相机状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub side: Vec3,
    pub near: f32,
    pub far: f32,
    /// 垂直视场角，单位为弧度
    pub fov: f32,
}
impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
            up: Vec3::Y,
            side: Vec3::X,
            near: 0.1,
            far: 1000.0,
            fov: std::f32::consts::FRAC_PI_3,
        }
    }
}
// new & init
impl CameraState {
    /// `near_far_fov` 依次为 near、far、fov（弧度）
    pub fn from_host(position: [f32; 3], direction: [f32; 3], up: [f32; 3], side: [f32; 3], near_far_fov: [f32; 3]) -> Self {
        Self {
            position: Vec3::from(position),
            forward: Vec3::from(direction),
            up: Vec3::from(up),
            side: Vec3::from(side),
            near: near_far_fov[0],
            far: near_far_fov[1],
            fov: near_far_fov[2],
        }
    }
}
// tools
impl CameraState {
    /// 原地写入固定大小的参数块，不产生任何分配
    #[inline]
    pub fn write_block(&self, block: &mut CameraParamsBlock) {
        block.cam_pos = self.position.extend(1.0).to_array();
        block.cam_dir = self.forward.extend(0.0).to_array();
        block.cam_up = self.up.extend(0.0).to_array();
        block.cam_side = self.side.extend(0.0).to_array();
        block.cam_near_far_fov = [self.near, self.far, self.fov, 0.0];
    }

    #[inline]
    pub fn to_block(&self) -> CameraParamsBlock {
        let mut block = CameraParamsBlock::default();
        self.write_block(&mut block);
        block
    }
}

/// 相机参数在 uniform buffer 中的布局，每个字段按 vec4 对齐
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraParamsBlock {
    pub cam_pos: [f32; 4],
    pub cam_dir: [f32; 4],
    pub cam_up: [f32; 4],
    pub cam_side: [f32; 4],
    pub cam_near_far_fov: [f32; 4],
}

/// 全局场景参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    /// 未命中任何几何时使用的环境色（RGBA）
    pub ambient: Vec4,
}
impl Default for SceneParams {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}
impl SceneParams {
    #[inline]
    pub fn from_rgba(rgba: [f32; 4]) -> Self {
        Self {
            ambient: Vec4::from(rgba),
        }
    }

    #[inline]
    pub fn write_block(&self, block: &mut SceneParamsBlock) {
        block.ambient = self.ambient.to_array();
    }

    #[inline]
    pub fn to_block(&self) -> SceneParamsBlock {
        let mut block = SceneParamsBlock::default();
        self.write_block(&mut block);
        block
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneParamsBlock {
    pub ambient: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_block_layout() {
        assert_eq!(size_of::<CameraParamsBlock>(), 80);
        assert_eq!(size_of::<SceneParamsBlock>(), 16);
    }

    #[test]
    fn test_camera_from_host() {
        let camera = CameraState::from_host(
            [1.0, 2.0, 3.0],
            [0.0, 0.0, -1.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.3, 500.0, 0.75],
        );
        let block = camera.to_block();
        assert_eq!(block.cam_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(block.cam_dir, [0.0, 0.0, -1.0, 0.0]);
        assert_eq!(block.cam_near_far_fov, [0.3, 500.0, 0.75, 0.0]);

        let bytes: &[u8] = bytemuck::bytes_of(&block);
        assert_eq!(bytes.len(), 80);
    }

    #[test]
    fn test_default_fov_is_radians() {
        let camera = CameraState::default();
        assert!((camera.fov - 60f32.to_radians()).abs() < 1e-6);
        assert!(camera.fov < std::f32::consts::PI);
    }

    #[test]
    fn test_scene_params_from_rgba() {
        let params = SceneParams::from_rgba([0.2, 0.3, 0.4, 1.0]);
        assert_eq!(params.to_block().ambient, [0.2, 0.3, 0.4, 1.0]);
    }
}

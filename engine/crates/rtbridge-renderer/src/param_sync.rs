use bytemuck::Pod;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rtbridge_render_interface::camera::{CameraParamsBlock, CameraState, SceneParams, SceneParamsBlock};
use rtbridge_render_interface::handles::CameraId;

struct SlotState<T> {
    value: T,
    /// 每次写入加一，0 表示从未写入
    version: u64,
}

/// 固定大小的参数寄存器
///
/// 宿主每帧覆盖写入，渲染上下文在帧事件时读取最新值；没有队列也没有历史，
/// 写入只是在原地复制，不会分配内存。
pub struct ParamSlot<T: Pod> {
    state: Mutex<SlotState<T>>,
}
impl<T: Pod> Default for ParamSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<T: Pod> ParamSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: T::zeroed(),
                version: 0,
            }),
        }
    }
}
// update
impl<T: Pod> ParamSlot<T> {
    #[inline]
    pub fn write(&self, value: &T) {
        self.write_with(|slot| *slot = *value);
    }

    /// 直接在寄存器内部修改
    #[inline]
    pub fn write_with(&self, f: impl FnOnce(&mut T)) {
        let mut state = self.state.lock();
        f(&mut state.value);
        state.version += 1;
    }
}
// getter
impl<T: Pod> ParamSlot<T> {
    #[inline]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// 从未写入时返回 None
    #[inline]
    pub fn read(&self) -> Option<T> {
        let state = self.state.lock();
        (state.version > 0).then_some(state.value)
    }

    /// 只有在 `seen_version` 之后有新的写入时才返回
    #[inline]
    pub fn read_if_newer(&self, seen_version: u64) -> Option<(T, u64)> {
        let state = self.state.lock();
        (state.version > seen_version).then_some((state.value, state.version))
    }
}

/// 每帧同步的相机与场景参数
///
/// 每个宿主相机有自己的寄存器，第一次写入时创建，之后原地覆盖；场景参数所有相机共用。
#[derive(Default)]
pub struct FrameParams {
    cameras: RwLock<IndexMap<CameraId, ParamSlot<CameraParamsBlock>>>,
    scene: ParamSlot<SceneParamsBlock>,
}
// getter
impl FrameParams {
    #[inline]
    pub fn scene(&self) -> &ParamSlot<SceneParamsBlock> {
        &self.scene
    }

    /// 相机最新的参数，从未写入时返回 None
    #[inline]
    pub fn camera(&self, camera: CameraId) -> Option<CameraParamsBlock> {
        self.cameras.read().get(&camera).and_then(|slot| slot.read())
    }

    #[inline]
    pub fn camera_version(&self, camera: CameraId) -> u64 {
        self.cameras.read().get(&camera).map_or(0, |slot| slot.version())
    }

    #[inline]
    pub fn camera_if_newer(&self, camera: CameraId, seen_version: u64) -> Option<(CameraParamsBlock, u64)> {
        self.cameras.read().get(&camera).and_then(|slot| slot.read_if_newer(seen_version))
    }

    /// 写入过参数的相机，按照第一次写入的顺序
    pub fn cameras(&self) -> Vec<CameraId> {
        self.cameras.read().keys().copied().collect()
    }
}
// update
impl FrameParams {
    /// 只覆盖指定相机的参数
    pub fn update_camera(&self, camera: CameraId, state: &CameraState) {
        if let Some(slot) = self.cameras.read().get(&camera) {
            slot.write_with(|block| state.write_block(block));
            return;
        }
        self.cameras
            .write()
            .entry(camera)
            .or_default()
            .write_with(|block| state.write_block(block));
    }

    #[inline]
    pub fn update_scene_params(&self, params: &SceneParams) {
        self.scene.write_with(|block| params.write_block(block));
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use ash::vk;
use rtbridge_render_interface::acceleration::{BlasInfo, TlasInfo};
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::camera::{CameraParamsBlock, SceneParamsBlock};
use rtbridge_render_interface::debug_bridge::{DebugSeverity, RawDebugCallback};
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::geometry::GeometryRecord;
use rtbridge_render_interface::handles::{CameraId, GeometryHandle};
use rtbridge_render_interface::render_target::RenderTargetDesc;

use crate::settings::HeadlessSettings;

/// 加速结构按照 256 字节对齐分配
const AS_ALIGNMENT: u64 = 256;
/// 每个图元在 BVH 节点上的额外开销估算
const BYTES_PER_PRIMITIVE: u64 = 64;

#[inline]
fn align_up(size: u64) -> u64 {
    size.div_ceil(AS_ALIGNMENT) * AS_ALIGNMENT
}

/// 无 GPU 渲染器的运行统计，可以在渲染线程之外读取
#[derive(Default)]
pub struct HeadlessStats {
    prepared: AtomicBool,
    pipeline_resets: AtomicU64,
    blas_built: AtomicU64,
    blas_released: AtomicU64,
    tlas_built: AtomicU64,
    last_tlas_instance_count: AtomicU64,
    frames_traced: AtomicU64,
    /// 最近一帧写入渲染目标的颜色，RGBA8 打包
    last_clear_color: AtomicU32,
    used_bytes: AtomicU64,
    /// 接下来需要失败的 TLAS 构建次数，用于模拟显存不足
    pending_tlas_failures: AtomicU32,
}
// getter
impl HeadlessStats {
    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }
    #[inline]
    pub fn pipeline_resets(&self) -> u64 {
        self.pipeline_resets.load(Ordering::Acquire)
    }
    #[inline]
    pub fn blas_built(&self) -> u64 {
        self.blas_built.load(Ordering::Acquire)
    }
    #[inline]
    pub fn blas_released(&self) -> u64 {
        self.blas_released.load(Ordering::Acquire)
    }
    #[inline]
    pub fn tlas_built(&self) -> u64 {
        self.tlas_built.load(Ordering::Acquire)
    }
    #[inline]
    pub fn last_tlas_instance_count(&self) -> u64 {
        self.last_tlas_instance_count.load(Ordering::Acquire)
    }
    #[inline]
    pub fn frames_traced(&self) -> u64 {
        self.frames_traced.load(Ordering::Acquire)
    }
    #[inline]
    pub fn last_clear_color(&self) -> [u8; 4] {
        self.last_clear_color.load(Ordering::Acquire).to_le_bytes()
    }
    #[inline]
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }
}
// tools
impl HeadlessStats {
    /// 让接下来的 `count` 次 TLAS 构建失败
    pub fn inject_tlas_failures(&self, count: u32) {
        self.pending_tlas_failures.store(count, Ordering::Release);
    }

    fn take_tlas_failure(&self) -> bool {
        self.pending_tlas_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// 一个相机绑定的渲染目标以及对应的 CPU 帧缓冲
struct HeadlessView {
    target: RenderTargetDesc,
    framebuffer: Vec<[u8; 4]>,
}

/// 在 CPU 上模拟外部光追渲染器
///
/// - 加速结构只记录包围盒与大小，地址按 256 字节对齐递增分配
/// - 加速结构的内存超出预算时构建失败，旧的 TLAS 保持不变
/// - 每个相机有自己的渲染目标，追踪光线时把环境色写入该相机的 CPU 帧缓冲
/// - 诊断信息通过注册的回调发出，文本缓冲区在回调返回后立即复用
pub struct HeadlessBackend {
    settings: HeadlessSettings,
    stats: Arc<HeadlessStats>,

    debug_callback: Option<RawDebugCallback>,
    message_buffer: Vec<u8>,

    pipeline_ready: bool,
    next_address: vk::DeviceAddress,
    /// BLAS 地址 -> 大小
    blas_allocations: HashMap<vk::DeviceAddress, u64>,
    tlas: Option<TlasInfo>,

    cameras: HashMap<CameraId, CameraParamsBlock>,
    scene_params: SceneParamsBlock,
    views: HashMap<CameraId, HeadlessView>,
}
// new & init
impl HeadlessBackend {
    pub fn new(settings: HeadlessSettings) -> Self {
        Self {
            settings,
            stats: Arc::new(HeadlessStats::default()),
            debug_callback: None,
            message_buffer: Vec::with_capacity(256),
            pipeline_ready: false,
            next_address: 0,
            blas_allocations: HashMap::new(),
            tlas: None,
            cameras: HashMap::new(),
            scene_params: SceneParamsBlock::default(),
            views: HashMap::new(),
        }
    }
}
impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(HeadlessSettings::default())
    }
}
// getter
impl HeadlessBackend {
    #[inline]
    pub fn stats(&self) -> Arc<HeadlessStats> {
        self.stats.clone()
    }
    #[inline]
    pub fn framebuffer(&self, camera: CameraId) -> Option<&[[u8; 4]]> {
        self.views.get(&camera).map(|view| view.framebuffer.as_slice())
    }
    #[inline]
    pub fn render_target(&self, camera: CameraId) -> Option<&RenderTargetDesc> {
        self.views.get(&camera).map(|view| &view.target)
    }
    #[inline]
    pub fn camera(&self, camera: CameraId) -> Option<&CameraParamsBlock> {
        self.cameras.get(&camera)
    }
    #[inline]
    pub fn tlas(&self) -> Option<&TlasInfo> {
        self.tlas.as_ref()
    }
}
// tools
impl HeadlessBackend {
    fn used_bytes(&self) -> u64 {
        self.blas_allocations.values().sum::<u64>() + self.tlas.map_or(0, |t| t.size_bytes)
    }

    fn alloc_address(&mut self, size: u64) -> vk::DeviceAddress {
        self.next_address += AS_ALIGNMENT;
        let address = self.next_address;
        self.next_address += size;
        address
    }

    fn sync_used_bytes(&self) {
        self.stats.used_bytes.store(self.used_bytes(), Ordering::Release);
    }

    /// 通过注册的回调发出诊断信息，没有回调时写入本地日志
    fn emit(&mut self, severity: DebugSeverity, message: &str) {
        let Some(callback) = self.debug_callback else {
            log::log!(severity.log_level(), "[headless] {}", message);
            return;
        };

        self.message_buffer.clear();
        self.message_buffer.extend_from_slice(message.as_bytes());
        unsafe {
            callback(self.message_buffer.as_ptr().cast(), severity.as_raw(), self.message_buffer.len() as i32);
        }
        // 回调返回后缓冲区立即作废
        self.message_buffer.fill(0);
    }

    fn out_of_memory(&mut self, what: &str, requested: u64) -> BridgeError {
        let message = format!(
            "out of device memory while building {}: requested {} bytes, {} of {} in use",
            what,
            requested,
            self.used_bytes(),
            self.settings.memory_budget_bytes
        );
        self.emit(DebugSeverity::Error, &message);
        BridgeError::BuildFailed(message)
    }
}
impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn prepare(&mut self) -> BridgeResult<()> {
        if self.pipeline_ready {
            return Ok(());
        }
        self.pipeline_ready = true;
        self.stats.prepared.store(true, Ordering::Release);
        self.emit(DebugSeverity::Info, "Prepared ray tracing pipeline");
        Ok(())
    }

    fn reset_pipeline(&mut self) -> BridgeResult<()> {
        self.pipeline_ready = false;
        self.stats.pipeline_resets.fetch_add(1, Ordering::AcqRel);
        self.emit(DebugSeverity::Info, "Destroyed ray tracing pipeline");
        self.prepare()
    }

    fn register_debug_callback(&mut self, callback: Option<RawDebugCallback>) {
        self.debug_callback = callback;
    }

    fn build_blas(&mut self, geometry: GeometryHandle, record: &GeometryRecord) -> BridgeResult<BlasInfo> {
        let size = align_up(record.byte_size() as u64 + record.triangle_count() as u64 * BYTES_PER_PRIMITIVE);
        if self.used_bytes() + size > self.settings.memory_budget_bytes {
            return Err(self.out_of_memory("blas", size));
        }

        let device_address = self.alloc_address(size);
        self.blas_allocations.insert(device_address, size);
        self.stats.blas_built.fetch_add(1, Ordering::AcqRel);
        self.sync_used_bytes();

        let message = format!("Built blas for geometry {} ({:?})", record.id(), geometry);
        self.emit(DebugSeverity::Info, &message);
        Ok(BlasInfo {
            device_address,
            primitive_count: record.triangle_count() as u32,
            size_bytes: size,
            bounds: record.bounds(),
        })
    }

    fn release_blas(&mut self, geometry: GeometryHandle, blas: &BlasInfo) {
        if self.blas_allocations.remove(&blas.device_address).is_none() {
            let message = format!("Releasing unknown blas {:#x} for {:?}", blas.device_address, geometry);
            self.emit(DebugSeverity::Warning, &message);
            return;
        }
        self.stats.blas_released.fetch_add(1, Ordering::AcqRel);
        self.sync_used_bytes();
    }

    fn release_tlas(&mut self, tlas: &TlasInfo) {
        if self.tlas.is_none_or(|current| current.device_address != tlas.device_address) {
            let message = format!("Releasing unknown tlas {:#x}", tlas.device_address);
            self.emit(DebugSeverity::Warning, &message);
            return;
        }
        self.tlas = None;
        self.sync_used_bytes();
    }

    fn build_tlas(&mut self, instances: &[vk::AccelerationStructureInstanceKHR]) -> BridgeResult<TlasInfo> {
        if instances.len() > self.settings.max_tlas_instances as usize {
            let message = format!(
                "tlas instance count {} exceeds the limit {}",
                instances.len(),
                self.settings.max_tlas_instances
            );
            self.emit(DebugSeverity::Error, &message);
            return Err(BridgeError::BuildFailed(message));
        }

        let size = align_up((instances.len() * size_of::<vk::AccelerationStructureInstanceKHR>()) as u64 + AS_ALIGNMENT);
        // 新的 TLAS 构建完成之前，旧的仍然占用内存
        if self.stats.take_tlas_failure() || self.used_bytes() + size > self.settings.memory_budget_bytes {
            return Err(self.out_of_memory("tlas", size));
        }

        let tlas = TlasInfo {
            device_address: self.alloc_address(size),
            instance_count: instances.len() as u32,
            size_bytes: size,
        };
        self.tlas = Some(tlas);
        self.stats.tlas_built.fetch_add(1, Ordering::AcqRel);
        self.stats.last_tlas_instance_count.store(instances.len() as u64, Ordering::Release);
        self.sync_used_bytes();

        let message = format!("Successfully built tlas with {} instances", instances.len());
        self.emit(DebugSeverity::Info, &message);
        Ok(tlas)
    }

    fn bind_render_target(&mut self, camera: CameraId, target: &RenderTargetDesc) -> BridgeResult<()> {
        let view = HeadlessView {
            target: *target,
            framebuffer: vec![[0; 4]; target.pixel_count()],
        };
        if let Some(previous) = self.views.insert(camera, view) {
            let message = format!(
                "Replacing render target {:?} with {:?} for {}",
                previous.target.handle, target.handle, camera
            );
            self.emit(DebugSeverity::Info, &message);
        }
        Ok(())
    }

    fn write_camera(&mut self, camera: CameraId, block: &CameraParamsBlock) {
        self.cameras.insert(camera, *block);
    }

    fn write_scene_params(&mut self, block: &SceneParamsBlock) {
        self.scene_params = *block;
    }

    fn trace_rays(&mut self, frame_id: u64, camera: CameraId, tlas: &TlasInfo) -> BridgeResult<()> {
        if !self.pipeline_ready {
            self.emit(DebugSeverity::Warning, "Pipeline is not prepared, cannot trace rays");
            return Ok(());
        }
        if !self.cameras.contains_key(&camera) {
            let message = format!("No camera data for {}, cannot trace rays", camera);
            self.emit(DebugSeverity::Warning, &message);
            return Ok(());
        }
        let Some(view) = self.views.get_mut(&camera) else {
            let message = format!("No render target bound for {}, cannot trace rays", camera);
            self.emit(DebugSeverity::Warning, &message);
            return Ok(());
        };

        // 没有着色模型，所有像素都是未命中的结果
        let color = self.scene_params.ambient.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        view.framebuffer.fill(color);

        self.stats.last_clear_color.store(u32::from_le_bytes(color), Ordering::Release);
        self.stats.frames_traced.fetch_add(1, Ordering::AcqRel);
        log::trace!(
            "[headless] traced frame {} for {} against tlas {:#x}",
            frame_id,
            camera,
            tlas.device_address
        );
        Ok(())
    }
}
impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        log::info!("HeadlessBackend dropped.");
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;
    use parking_lot::Mutex;
    use rtbridge_render_interface::acceleration::tlas_instance_record;
    use rtbridge_render_interface::debug_bridge::copy_callback_text;
    use rtbridge_render_interface::geometry::GeometryData;
    use rtbridge_render_interface::handles::GeometryId;
    use rtbridge_render_interface::render_target::{RawTargetHandle, TargetFormat};

    use super::*;

    static MESSAGES: Mutex<Vec<(i32, String)>> = Mutex::new(Vec::new());

    fn key() -> GeometryHandle {
        GeometryHandle::from_index(1)
    }

    fn triangle() -> GeometryRecord {
        GeometryData::new(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2])
            .to_record(GeometryId(1))
            .unwrap()
    }

    #[test]
    fn test_blas_respects_memory_budget() {
        let mut backend = HeadlessBackend::new(HeadlessSettings {
            memory_budget_bytes: 1024,
            max_tlas_instances: 16,
        });
        let record = triangle();

        let first = backend.build_blas(key(), &record).unwrap();
        assert_eq!(first.primitive_count, 1);
        assert_eq!(first.device_address % AS_ALIGNMENT, 0);

        // 每个 BLAS 占用 256 字节，预算只够 4 个
        let results: Vec<_> = (0..8).map(|_| backend.build_blas(key(), &record)).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert!(results.iter().any(|r| matches!(r, Err(BridgeError::BuildFailed(_)))));
        assert_eq!(backend.stats().used_bytes(), 1024);

        backend.release_blas(key(), &first);
        assert_eq!(backend.stats().used_bytes(), 768);
        assert_eq!(backend.stats().blas_released(), 1);
    }

    #[test]
    fn test_failed_tlas_keeps_previous() {
        let mut backend = HeadlessBackend::default();
        let blas = backend.build_blas(key(), &triangle()).unwrap();
        let records = [tlas_instance_record(&Mat4::IDENTITY, 0, blas.device_address)];

        let first = backend.build_tlas(&records).unwrap();
        backend.stats().inject_tlas_failures(1);
        assert!(matches!(backend.build_tlas(&records), Err(BridgeError::BuildFailed(_))));
        assert_eq!(backend.tlas(), Some(&first));

        let second = backend.build_tlas(&records).unwrap();
        assert_ne!(second.device_address, first.device_address);
        assert_eq!(backend.stats().tlas_built(), 2);
        assert_eq!(backend.stats().last_tlas_instance_count(), 1);
    }

    #[test]
    fn test_trace_fills_target_with_ambient() {
        let mut backend = HeadlessBackend::default();
        backend.prepare().unwrap();
        let target = RenderTargetDesc::new(TargetFormat::Rgba32, 4, 2, RawTargetHandle(1)).unwrap();
        backend.bind_render_target(CameraId(0), &target).unwrap();
        backend.write_camera(CameraId(0), &CameraParamsBlock::default());
        backend.write_scene_params(&SceneParamsBlock {
            ambient: [1.0, 0.5, 0.0, 1.0],
        });

        let tlas = backend.build_tlas(&[]).unwrap();
        backend.trace_rays(1, CameraId(0), &tlas).unwrap();

        let framebuffer = backend.framebuffer(CameraId(0)).unwrap();
        assert_eq!(framebuffer.len(), 8);
        assert!(framebuffer.iter().all(|p| *p == [255, 128, 0, 255]));
        assert_eq!(backend.stats().last_clear_color(), [255, 128, 0, 255]);
        assert_eq!(backend.stats().frames_traced(), 1);
    }

    #[test]
    fn test_trace_without_target_is_skipped() {
        let mut backend = HeadlessBackend::default();
        backend.prepare().unwrap();
        backend.write_camera(CameraId(0), &CameraParamsBlock::default());
        let tlas = backend.build_tlas(&[]).unwrap();

        backend.trace_rays(1, CameraId(0), &tlas).unwrap();
        assert_eq!(backend.stats().frames_traced(), 0);
    }

    #[test]
    fn test_render_targets_are_per_camera() {
        let mut backend = HeadlessBackend::default();
        backend.prepare().unwrap();
        let small = RenderTargetDesc::new(TargetFormat::Rgba32, 2, 2, RawTargetHandle(1)).unwrap();
        let wide = RenderTargetDesc::new(TargetFormat::Rgba32, 8, 1, RawTargetHandle(2)).unwrap();
        backend.bind_render_target(CameraId(1), &small).unwrap();
        backend.bind_render_target(CameraId(2), &wide).unwrap();
        backend.write_camera(CameraId(1), &CameraParamsBlock::default());
        backend.write_scene_params(&SceneParamsBlock {
            ambient: [0.0, 1.0, 0.0, 1.0],
        });

        let tlas = backend.build_tlas(&[]).unwrap();
        backend.trace_rays(1, CameraId(1), &tlas).unwrap();
        // 相机 2 没有相机参数
        backend.trace_rays(1, CameraId(2), &tlas).unwrap();

        assert!(backend.framebuffer(CameraId(1)).unwrap().iter().all(|p| *p == [0, 255, 0, 255]));
        assert!(backend.framebuffer(CameraId(2)).unwrap().iter().all(|p| *p == [0; 4]));
        assert_eq!(backend.stats().frames_traced(), 1);

        // 替换相机 1 的目标不影响相机 2
        let replaced = RenderTargetDesc::new(TargetFormat::Rgba32, 3, 3, RawTargetHandle(3)).unwrap();
        backend.bind_render_target(CameraId(1), &replaced).unwrap();
        assert_eq!(backend.render_target(CameraId(1)), Some(&replaced));
        assert_eq!(backend.render_target(CameraId(2)), Some(&wide));
        assert_eq!(backend.framebuffer(CameraId(1)).unwrap().len(), 9);
    }

    #[test]
    fn test_release_tlas_frees_memory() {
        let mut backend = HeadlessBackend::default();
        let blas = backend.build_blas(key(), &triangle()).unwrap();
        let tlas = backend.build_tlas(&[tlas_instance_record(&Mat4::IDENTITY, 0, blas.device_address)]).unwrap();

        backend.release_blas(key(), &blas);
        backend.release_tlas(&tlas);
        assert_eq!(backend.tlas(), None);
        assert_eq!(backend.stats().used_bytes(), 0);

        // 重复释放只发出警告
        backend.release_tlas(&tlas);
        assert_eq!(backend.stats().used_bytes(), 0);
    }

    #[test]
    fn test_diagnostics_go_through_callback() {
        unsafe extern "C" fn capture(text: *const std::ffi::c_char, severity: i32, length: i32) {
            let text = unsafe { copy_callback_text(text, length) };
            MESSAGES.lock().push((severity, text));
        }

        let mut backend = HeadlessBackend::new(HeadlessSettings {
            memory_budget_bytes: 0,
            max_tlas_instances: 16,
        });
        backend.register_debug_callback(Some(capture));
        backend.prepare().unwrap();
        let _ = backend.build_blas(key(), &triangle());

        let messages = MESSAGES.lock();
        assert_eq!(messages[0], (0, "Prepared ray tracing pipeline".to_string()));
        assert_eq!(messages[1].0, 2);
        assert!(messages[1].1.starts_with("out of device memory while building blas"));
    }
}

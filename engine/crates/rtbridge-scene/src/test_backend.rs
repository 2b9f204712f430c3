use ash::vk;
use rtbridge_render_interface::acceleration::{BlasInfo, TlasInfo, blas_address_of};
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::camera::{CameraParamsBlock, SceneParamsBlock};
use rtbridge_render_interface::debug_bridge::RawDebugCallback;
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::geometry::GeometryRecord;
use rtbridge_render_interface::handles::{CameraId, GeometryHandle};
use rtbridge_render_interface::render_target::RenderTargetDesc;

/// 记录调用情况的渲染器，用于单元测试
#[derive(Default)]
pub struct RecordingBackend {
    next_address: u64,
    pub blas_builds: Vec<GeometryHandle>,
    pub released_blas: Vec<GeometryHandle>,
    pub tlas_builds: usize,
    pub released_tlas: usize,
    /// 最近一次成功构建时引用的 BLAS 地址
    pub last_tlas_blas_addresses: Vec<vk::DeviceAddress>,
    pub fail_tlas: bool,
    pub fail_blas: bool,
}
impl RecordingBackend {
    fn alloc_address(&mut self) -> vk::DeviceAddress {
        self.next_address += 0x100;
        self.next_address
    }
}
impl RenderBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn prepare(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn reset_pipeline(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn register_debug_callback(&mut self, _callback: Option<RawDebugCallback>) {}

    fn build_blas(&mut self, geometry: GeometryHandle, record: &GeometryRecord) -> BridgeResult<BlasInfo> {
        if self.fail_blas {
            return Err(BridgeError::BuildFailed("out of device memory".to_string()));
        }
        self.blas_builds.push(geometry);
        Ok(BlasInfo {
            device_address: self.alloc_address(),
            primitive_count: record.triangle_count() as u32,
            size_bytes: record.byte_size() as u64,
            bounds: record.bounds(),
        })
    }

    fn release_blas(&mut self, geometry: GeometryHandle, _blas: &BlasInfo) {
        self.released_blas.push(geometry);
    }

    fn build_tlas(&mut self, instances: &[vk::AccelerationStructureInstanceKHR]) -> BridgeResult<TlasInfo> {
        if self.fail_tlas {
            return Err(BridgeError::BuildFailed("out of device memory".to_string()));
        }
        self.tlas_builds += 1;
        self.last_tlas_blas_addresses = instances.iter().map(blas_address_of).collect();
        Ok(TlasInfo {
            device_address: self.alloc_address(),
            instance_count: instances.len() as u32,
            size_bytes: (instances.len() * size_of::<vk::AccelerationStructureInstanceKHR>()) as u64,
        })
    }

    fn release_tlas(&mut self, _tlas: &TlasInfo) {
        self.released_tlas += 1;
    }

    fn bind_render_target(&mut self, _camera: CameraId, _target: &RenderTargetDesc) -> BridgeResult<()> {
        Ok(())
    }

    fn write_camera(&mut self, _camera: CameraId, _block: &CameraParamsBlock) {}

    fn write_scene_params(&mut self, _block: &SceneParamsBlock) {}

    fn trace_rays(&mut self, _frame_id: u64, _camera: CameraId, _tlas: &TlasInfo) -> BridgeResult<()> {
        Ok(())
    }
}

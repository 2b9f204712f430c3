use ash::vk;

use crate::acceleration::{BlasInfo, TlasInfo};
use crate::camera::{CameraParamsBlock, SceneParamsBlock};
use crate::debug_bridge::RawDebugCallback;
use crate::error::BridgeResult;
use crate::geometry::GeometryRecord;
use crate::handles::{CameraId, GeometryHandle};
use crate::render_target::RenderTargetDesc;

/// 外部光追渲染器的唯一调用入口
///
/// 所有方法都只会在渲染上下文中被调用（渲染线程，或者单线程模拟时的显式交接点）。
///
/// 失败约定：
/// - [`RenderBackend::build_tlas`] 失败时，渲染器必须保持之前的 TLAS 可用
/// - 传入的切片和记录只在调用期间有效，需要保留的数据由渲染器自行复制
pub trait RenderBackend: Send {
    /// 用于日志的名字
    fn name(&self) -> &str;

    /// 创建管线等一次性资源
    fn prepare(&mut self) -> BridgeResult<()>;

    /// 销毁并重建管线，场景数据保持不变
    fn reset_pipeline(&mut self) -> BridgeResult<()>;

    /// 注册诊断信息回调，`None` 表示注销
    fn register_debug_callback(&mut self, callback: Option<RawDebugCallback>);

    /// 为一个几何构建 BLAS
    fn build_blas(&mut self, geometry: GeometryHandle, record: &GeometryRecord) -> BridgeResult<BlasInfo>;

    /// 释放不再被任何 TLAS 引用的 BLAS
    fn release_blas(&mut self, geometry: GeometryHandle, blas: &BlasInfo);

    /// 基于 instance 记录构建新的 TLAS，成功后替换旧的
    fn build_tlas(&mut self, instances: &[vk::AccelerationStructureInstanceKHR]) -> BridgeResult<TlasInfo>;

    /// 释放 TLAS，渲染上下文关闭时调用
    fn release_tlas(&mut self, tlas: &TlasInfo);

    /// 为相机绑定宿主提供的渲染目标，替换该相机已经绑定的目标
    fn bind_render_target(&mut self, camera: CameraId, target: &RenderTargetDesc) -> BridgeResult<()>;

    /// 只写入指定相机的参数
    fn write_camera(&mut self, camera: CameraId, block: &CameraParamsBlock);

    fn write_scene_params(&mut self, block: &SceneParamsBlock);

    /// 使用指定的 TLAS 向相机的渲染目标发射光线
    fn trace_rays(&mut self, frame_id: u64, camera: CameraId, tlas: &TlasInfo) -> BridgeResult<()>;
}

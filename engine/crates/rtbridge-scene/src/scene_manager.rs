use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::geometry::{GeometryData, GeometryRecord};
use rtbridge_render_interface::handles::{GeometryHandle, GeometryId, HostObjectId, InstanceHandle};

use crate::acceleration_builder::{AccelerationBuilder, BuildReport, TopLevelStructure};
use crate::geometry_registry::GeometryRegistry;
use crate::instance_manager::{InstanceManager, SceneInstance};

/// 宿主线程和渲染线程共享的场景
///
/// 几何、instance 的修改以及加速结构的构建都在这一把锁内完成。
pub type SharedScene = Arc<Mutex<SceneManager>>;

/// 在 CPU 侧管理场景数据
#[derive(Default)]
pub struct SceneManager {
    geometry_registry: GeometryRegistry,
    instance_manager: InstanceManager,
    acceleration_builder: AccelerationBuilder,
}
// new & init
impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedScene {
        Arc::new(Mutex::new(Self::new()))
    }
}
// getter
impl SceneManager {
    #[inline]
    pub fn geometry_registry(&self) -> &GeometryRegistry {
        &self.geometry_registry
    }
    #[inline]
    pub fn instance_manager(&self) -> &InstanceManager {
        &self.instance_manager
    }
    #[inline]
    pub fn acceleration_builder(&self) -> &AccelerationBuilder {
        &self.acceleration_builder
    }
    /// 最近一次成功构建的 TLAS
    #[inline]
    pub fn tlas(&self) -> Option<&TopLevelStructure> {
        self.acceleration_builder.tlas()
    }
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.instance_manager.is_dirty()
    }
    #[inline]
    pub fn get_geometry(&self, handle: GeometryHandle) -> Option<&GeometryRecord> {
        self.geometry_registry.get(handle)
    }
    #[inline]
    pub fn get_instance(&self, handle: InstanceHandle) -> Option<&SceneInstance> {
        self.instance_manager.get(handle)
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.geometry_registry.is_empty() && self.instance_manager.is_empty()
    }
}
// tools
impl SceneManager {
    #[inline]
    pub fn upload_geometry(&mut self, id: GeometryId, data: GeometryData<'_>) -> BridgeResult<GeometryHandle> {
        self.geometry_registry.upload(id, data)
    }

    #[inline]
    pub fn lookup_geometry(&self, id: GeometryId) -> Option<GeometryHandle> {
        self.geometry_registry.lookup(id)
    }

    /// 让一个几何失效，之后可以用同一个 id 上传新的内容
    ///
    /// 仍有 instance 引用该几何时返回 [`BridgeError::GeometryInUse`]。
    pub fn invalidate_geometry(&mut self, id: GeometryId) -> BridgeResult<GeometryHandle> {
        let handle = self.geometry_registry.lookup(id).ok_or(BridgeError::UnknownGeometryId(id))?;
        let instance_count = self.instance_manager.references_geometry(handle);
        if instance_count > 0 {
            return Err(BridgeError::GeometryInUse { id, instance_count });
        }

        self.geometry_registry.remove(id)?;
        self.acceleration_builder.retire_blas(handle);
        log::info!("Invalidated geometry {}", id);
        Ok(handle)
    }

    #[inline]
    pub fn add_instance(&mut self, geometry: GeometryHandle, transform: Mat4) -> BridgeResult<InstanceHandle> {
        self.instance_manager.add_instance(&self.geometry_registry, geometry, transform)
    }

    #[inline]
    pub fn add_host_instance(
        &mut self,
        host_id: HostObjectId,
        geometry: GeometryHandle,
        transform: Mat4,
    ) -> BridgeResult<InstanceHandle> {
        self.instance_manager.add_host_instance(&self.geometry_registry, host_id, geometry, transform)
    }

    #[inline]
    pub fn lookup_host_instance(&self, host_id: HostObjectId) -> Option<InstanceHandle> {
        self.instance_manager.lookup_host_instance(host_id)
    }

    #[inline]
    pub fn remove_instance(&mut self, handle: InstanceHandle) -> BridgeResult<()> {
        self.instance_manager.remove_instance(handle).map(|_| ())
    }

    #[inline]
    pub fn update_transform(&mut self, handle: InstanceHandle, transform: Mat4) -> BridgeResult<()> {
        self.instance_manager.update_transform(handle, transform)
    }

    /// 基于当前场景构建加速结构
    pub fn build(&mut self, backend: &mut dyn RenderBackend) -> BridgeResult<BuildReport> {
        self.acceleration_builder.build(&self.geometry_registry, &mut self.instance_manager, backend)
    }

    /// 把渲染器上的所有加速结构交还给渲染器，下一次 build 会重新构建
    pub fn release_acceleration(&mut self, backend: &mut dyn RenderBackend) {
        self.acceleration_builder.release_all(backend);
    }
}
impl Drop for SceneManager {
    fn drop(&mut self) {
        log::info!("SceneManager dropped.");
    }
}

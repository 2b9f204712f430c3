use std::collections::HashMap;

use glam::Mat4;
use indexmap::IndexMap;
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::handles::{GeometryHandle, HostObjectId, InstanceHandle};

use crate::geometry_registry::GeometryRegistry;

/// 场景中的一次摆放：一个几何加上一个 local-to-world 变换
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInstance {
    pub geometry: GeometryHandle,
    pub transform: Mat4,
    /// 对应的宿主对象，宿主可以据此反查 instance
    pub host_id: Option<HostObjectId>,
}

/// 构建加速结构时使用的快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceSnapshot {
    pub handle: InstanceHandle,
    pub geometry: GeometryHandle,
    pub transform: Mat4,
}

/// 管理所有 instance
///
/// - 句柄单调递增，删除之后不会复用
/// - 任何修改都会把场景标记为 dirty，直到下一次成功构建
/// - 按照插入顺序迭代，快照的顺序与宿主添加的顺序一致
#[derive(Default)]
pub struct InstanceManager {
    all_instances: IndexMap<InstanceHandle, SceneInstance>,
    host_index: HashMap<HostObjectId, InstanceHandle>,
    next_handle: u64,
    dirty: bool,
}
// new & init
impl InstanceManager {
    pub fn new() -> Self {
        Self::default()
    }
}
// getter
impl InstanceManager {
    #[inline]
    pub fn get(&self, handle: InstanceHandle) -> Option<&SceneInstance> {
        self.all_instances.get(&handle)
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.all_instances.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.all_instances.is_empty()
    }
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&InstanceHandle, &SceneInstance)> {
        self.all_instances.iter()
    }
    #[inline]
    pub fn lookup_host_instance(&self, host_id: HostObjectId) -> Option<InstanceHandle> {
        self.host_index.get(&host_id).copied()
    }
}
// tools
impl InstanceManager {
    /// geometry 未注册时返回 [`BridgeError::UnknownGeometry`]，不产生任何修改
    pub fn add_instance(
        &mut self,
        registry: &GeometryRegistry,
        geometry: GeometryHandle,
        transform: Mat4,
    ) -> BridgeResult<InstanceHandle> {
        self.insert(registry, geometry, transform, None)
    }

    /// 与 [`InstanceManager::add_instance`] 相同，同时记录宿主对象
    ///
    /// 同一个宿主对象再次添加时，反查结果指向最新的 instance。
    pub fn add_host_instance(
        &mut self,
        registry: &GeometryRegistry,
        host_id: HostObjectId,
        geometry: GeometryHandle,
        transform: Mat4,
    ) -> BridgeResult<InstanceHandle> {
        self.insert(registry, geometry, transform, Some(host_id))
    }

    fn insert(
        &mut self,
        registry: &GeometryRegistry,
        geometry: GeometryHandle,
        transform: Mat4,
        host_id: Option<HostObjectId>,
    ) -> BridgeResult<InstanceHandle> {
        if !registry.contains(geometry) {
            return Err(BridgeError::UnknownGeometry(geometry));
        }

        self.next_handle += 1;
        let handle = InstanceHandle::from_raw(self.next_handle);
        self.all_instances.insert(
            handle,
            SceneInstance {
                geometry,
                transform,
                host_id,
            },
        );
        if let Some(host_id) = host_id
            && let Some(previous) = self.host_index.insert(host_id, handle)
        {
            log::warn!("Host object {:?} already owned {}, now mapped to {}", host_id, previous, handle);
        }
        self.dirty = true;

        log::debug!("Added {} (geometry {:?})", handle, geometry);
        Ok(handle)
    }

    /// 重复删除同一个句柄会返回 [`BridgeError::UnknownInstance`]
    pub fn remove_instance(&mut self, handle: InstanceHandle) -> BridgeResult<SceneInstance> {
        let instance = self.all_instances.shift_remove(&handle).ok_or(BridgeError::UnknownInstance(handle))?;
        if let Some(host_id) = instance.host_id
            && self.host_index.get(&host_id) == Some(&handle)
        {
            self.host_index.remove(&host_id);
        }
        self.dirty = true;

        log::debug!("Removed {}", handle);
        Ok(instance)
    }

    pub fn update_transform(&mut self, handle: InstanceHandle, transform: Mat4) -> BridgeResult<()> {
        let instance = self.all_instances.get_mut(&handle).ok_or(BridgeError::UnknownInstance(handle))?;
        instance.transform = transform;
        self.dirty = true;
        Ok(())
    }

    /// 引用了指定几何的 instance 数量
    pub fn references_geometry(&self, geometry: GeometryHandle) -> usize {
        self.all_instances.values().filter(|instance| instance.geometry == geometry).count()
    }

    pub fn snapshot(&self) -> Vec<InstanceSnapshot> {
        self.all_instances
            .iter()
            .map(|(handle, instance)| InstanceSnapshot {
                handle: *handle,
                geometry: instance.geometry,
                transform: instance.transform,
            })
            .collect()
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

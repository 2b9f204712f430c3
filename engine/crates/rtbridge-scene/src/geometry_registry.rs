use std::collections::HashMap;

use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::geometry::{GeometryData, GeometryRecord};
use rtbridge_render_interface::handles::{GeometryHandle, GeometryId};
use slotmap::SlotMap;

/// 已上传的几何，按照宿主 mesh 的 id 去重
#[derive(Default)]
pub struct GeometryRegistry {
    all_geometries: SlotMap<GeometryHandle, GeometryRecord>,
    /// 宿主 mesh id -> 句柄，同一个 id 只会上传一次
    id_cache: HashMap<GeometryId, GeometryHandle>,
}
// new & init
impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
// getter
impl GeometryRegistry {
    #[inline]
    pub fn get(&self, handle: GeometryHandle) -> Option<&GeometryRecord> {
        self.all_geometries.get(handle)
    }
    #[inline]
    pub fn contains(&self, handle: GeometryHandle) -> bool {
        self.all_geometries.contains_key(handle)
    }
    #[inline]
    pub fn lookup(&self, id: GeometryId) -> Option<GeometryHandle> {
        self.id_cache.get(&id).copied()
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.all_geometries.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.all_geometries.is_empty()
    }
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (GeometryHandle, &GeometryRecord)> {
        self.all_geometries.iter()
    }
}
// tools
impl GeometryRegistry {
    /// 查找或者创建
    ///
    /// id 已经存在时直接返回已有的句柄，不会重新上传，也不会检查新的数据。
    /// 否则校验数据并复制一份，校验失败时不会产生任何修改。
    pub fn upload(&mut self, id: GeometryId, data: GeometryData<'_>) -> BridgeResult<GeometryHandle> {
        if let Some(handle) = self.lookup(id) {
            log::debug!("Geometry {} already uploaded, reusing {:?}", id, handle);
            return Ok(handle);
        }

        let record = data.to_record(id)?;
        let (vertex_count, triangle_count) = (record.vertex_count(), record.triangle_count());
        let handle = self.all_geometries.insert(record);
        self.id_cache.insert(id, handle);

        log::info!("Added geometry {} ({} vertices, {} triangles)", id, vertex_count, triangle_count);
        Ok(handle)
    }

    /// 移除一个几何，调用者负责确认没有 instance 引用它
    pub fn remove(&mut self, id: GeometryId) -> BridgeResult<(GeometryHandle, GeometryRecord)> {
        let handle = self.id_cache.remove(&id).ok_or(BridgeError::UnknownGeometryId(id))?;
        let record = self.all_geometries.remove(handle).ok_or(BridgeError::UnknownGeometry(handle))?;
        Ok((handle, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    const QUAD: [[f32; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn test_same_id_returns_same_handle() {
        let mut registry = GeometryRegistry::new();
        let first = registry.upload(GeometryId(7), GeometryData::new(&TRIANGLE, &[0, 1, 2])).unwrap();
        let second = registry.upload(GeometryId(7), GeometryData::new(&TRIANGLE, &[0, 1, 2])).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(GeometryId(7)), Some(first));
    }

    #[test]
    fn test_cached_id_ignores_new_content() {
        let mut registry = GeometryRegistry::new();
        let handle = registry.upload(GeometryId(1), GeometryData::new(&TRIANGLE, &[0, 1, 2])).unwrap();
        let again = registry.upload(GeometryId(1), GeometryData::new(&QUAD, &[0, 1, 2, 0, 2, 3])).unwrap();

        assert_eq!(handle, again);
        assert_eq!(registry.get(handle).unwrap().triangle_count(), 1);
    }

    #[test]
    fn test_invalid_geometry_leaves_registry_untouched() {
        let mut registry = GeometryRegistry::new();
        let result = registry.upload(GeometryId(3), GeometryData::new(&[], &[]));

        assert!(matches!(result, Err(BridgeError::InvalidGeometry(_))));
        assert!(registry.is_empty());
        assert_eq!(registry.lookup(GeometryId(3)), None);
    }

    #[test]
    fn test_remove_then_upload_gets_fresh_handle() {
        let mut registry = GeometryRegistry::new();
        let old = registry.upload(GeometryId(2), GeometryData::new(&TRIANGLE, &[0, 1, 2])).unwrap();
        let (removed, record) = registry.remove(GeometryId(2)).unwrap();
        assert_eq!(removed, old);
        assert_eq!(record.id(), GeometryId(2));
        assert!(!registry.contains(old));

        let new = registry.upload(GeometryId(2), GeometryData::new(&QUAD, &[0, 1, 2, 0, 2, 3])).unwrap();
        assert_ne!(old, new);
        assert_eq!(registry.get(new).unwrap().triangle_count(), 2);

        assert_eq!(registry.remove(GeometryId(99)).unwrap_err(), BridgeError::UnknownGeometryId(GeometryId(99)));
    }
}

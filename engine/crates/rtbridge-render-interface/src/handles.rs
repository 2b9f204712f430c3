use std::fmt;

use slotmap::{Key, KeyData};

slotmap::new_key_type! {
    /// 已上传几何的句柄
    ///
    /// 带有版本号：几何失效后旧句柄不会指向新的记录
    pub struct GeometryHandle;
}
impl GeometryHandle {
    /// 转换为可以跨越整数边界的索引
    #[inline]
    pub fn to_index(self) -> u64 {
        self.data().as_ffi()
    }

    #[inline]
    pub fn from_index(index: u64) -> Self {
        KeyData::from_ffi(index).into()
    }
}

/// 宿主侧 mesh 的稳定身份，用于去重
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub i32);

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 宿主侧场景对象的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostObjectId(pub i32);

/// 宿主侧相机的身份，每个相机有自己的渲染目标和相机参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub i32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera-{}", self.0)
    }
}

/// 场景中一个 instance 的句柄
///
/// 单调递增分配，删除之后也不会被复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_geometry_handle_index_round_trip() {
        let mut map: SlotMap<GeometryHandle, u32> = SlotMap::with_key();
        let handle = map.insert(42);

        let restored = GeometryHandle::from_index(handle.to_index());
        assert_eq!(restored, handle);
        assert_eq!(map.get(restored), Some(&42));
    }

    #[test]
    fn test_stale_geometry_handle_does_not_alias() {
        let mut map: SlotMap<GeometryHandle, u32> = SlotMap::with_key();
        let old = map.insert(1);
        map.remove(old);
        let new = map.insert(2);

        // 同一个槽位被复用，但是版本不同
        assert_ne!(old, new);
        assert!(map.get(old).is_none());
    }
}

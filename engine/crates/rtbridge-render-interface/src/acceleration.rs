use ash::vk;

use crate::geometry::Aabb;

/// 渲染器为一个几何构建好的 BLAS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlasInfo {
    pub device_address: vk::DeviceAddress,
    pub primitive_count: u32,
    pub size_bytes: u64,
    /// 几何在自身空间下的包围盒
    pub bounds: Aabb,
}

/// 渲染器构建好的 TLAS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TlasInfo {
    pub device_address: vk::DeviceAddress,
    pub instance_count: u32,
    pub size_bytes: u64,
}

/// instance 的可见性掩码，所有光线都可以命中
pub const INSTANCE_MASK_ALL: u8 = 0xFF;

/// custom index 在 instance 结构中只有 24 位
pub const MAX_CUSTOM_INDEX: u32 = (1 << 24) - 1;

/// 3x4 row-major matrix
pub fn rt_transform(trans: &glam::Mat4) -> vk::TransformMatrixKHR {
    let c1 = &trans.x_axis;
    let c2 = &trans.y_axis;
    let c3 = &trans.z_axis;
    let c4 = &trans.w_axis;

    vk::TransformMatrixKHR {
        matrix: [
            c1.x, c2.x, c3.x, c4.x, // row 1
            c1.y, c2.y, c3.y, c4.y, // row 2
            c1.z, c2.z, c3.z, c4.z, // row 3
        ],
    }
}

/// 构造 TLAS 中的一条 instance 记录
///
/// 所有 instance 使用同一个 hit group，并关闭背面剔除。
pub fn tlas_instance_record(
    transform: &glam::Mat4,
    custom_index: u32,
    blas_address: vk::DeviceAddress,
) -> vk::AccelerationStructureInstanceKHR {
    vk::AccelerationStructureInstanceKHR {
        transform: rt_transform(transform),
        instance_custom_index_and_mask: vk::Packed24_8::new(custom_index & MAX_CUSTOM_INDEX, INSTANCE_MASK_ALL),
        instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
            0,
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
        ),
        acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
            device_handle: blas_address,
        },
    }
}

/// 读取 instance 记录中引用的 BLAS 地址
#[inline]
pub fn blas_address_of(record: &vk::AccelerationStructureInstanceKHR) -> vk::DeviceAddress {
    // 记录总是由 tlas_instance_record 以 device_handle 构造
    unsafe { record.acceleration_structure_reference.device_handle }
}

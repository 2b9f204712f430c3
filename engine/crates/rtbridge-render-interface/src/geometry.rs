use glam::Vec3;

use crate::error::{BridgeError, BridgeResult};
use crate::handles::GeometryId;

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}
impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        max: Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    };

    #[inline]
    pub fn grow_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }
}

/// 宿主提交的几何数据，只在一次同步调用期间借用
///
/// 借用结束之前，数据会被复制到 [`GeometryRecord`] 中，
/// 调用返回之后宿主可以立刻回收这些缓冲区。
#[derive(Debug, Clone, Copy)]
pub struct GeometryData<'a> {
    pub positions: &'a [[f32; 3]],
    /// 可以为空；非空时长度必须与顶点数一致
    pub normals: &'a [[f32; 3]],
    /// 可以为空；非空时长度必须与顶点数一致
    pub uvs: &'a [[f32; 2]],
    /// 三角形列表
    pub indices: &'a [u32],
}
// new & init
impl<'a> GeometryData<'a> {
    pub fn new(positions: &'a [[f32; 3]], indices: &'a [u32]) -> Self {
        Self {
            positions,
            normals: &[],
            uvs: &[],
            indices,
        }
    }

    pub fn with_normals(mut self, normals: &'a [[f32; 3]]) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: &'a [[f32; 2]]) -> Self {
        self.uvs = uvs;
        self
    }

    /// 从紧密排列的 float/int 数组构造，宿主通常以这种形式传递 mesh
    ///
    /// 负数索引会在 [`GeometryData::validate`] 中被当作越界索引拒绝。
    pub fn from_flat(
        vertices: &'a [f32],
        normals: &'a [f32],
        uvs: &'a [f32],
        indices: &'a [i32],
    ) -> BridgeResult<Self> {
        let positions = bytemuck::try_cast_slice::<f32, [f32; 3]>(vertices).map_err(|_| {
            BridgeError::InvalidGeometry(format!("vertex float count {} is not a multiple of 3", vertices.len()))
        })?;
        let normals = bytemuck::try_cast_slice::<f32, [f32; 3]>(normals).map_err(|_| {
            BridgeError::InvalidGeometry(format!("normal float count {} is not a multiple of 3", normals.len()))
        })?;
        let uvs = bytemuck::try_cast_slice::<f32, [f32; 2]>(uvs)
            .map_err(|_| BridgeError::InvalidGeometry(format!("uv float count {} is not a multiple of 2", uvs.len())))?;

        Ok(Self {
            positions,
            normals,
            uvs,
            indices: bytemuck::cast_slice::<i32, u32>(indices),
        })
    }
}
// tools
impl GeometryData<'_> {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// 在任何修改发生之前检查数据是否合法
    pub fn validate(&self) -> BridgeResult<()> {
        let vertex_count = self.positions.len();
        if vertex_count == 0 {
            return Err(BridgeError::InvalidGeometry("vertex array is empty".to_string()));
        }
        if self.indices.is_empty() {
            return Err(BridgeError::InvalidGeometry("index array is empty".to_string()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(BridgeError::InvalidGeometry(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if !self.normals.is_empty() && self.normals.len() != vertex_count {
            return Err(BridgeError::InvalidGeometry(format!(
                "normal count {} does not match vertex count {}",
                self.normals.len(),
                vertex_count
            )));
        }
        if !self.uvs.is_empty() && self.uvs.len() != vertex_count {
            return Err(BridgeError::InvalidGeometry(format!(
                "uv count {} does not match vertex count {}",
                self.uvs.len(),
                vertex_count
            )));
        }
        if let Some((pos, index)) = self.indices.iter().enumerate().find(|(_, idx)| **idx as usize >= vertex_count) {
            return Err(BridgeError::InvalidGeometry(format!(
                "index {} at position {} is out of range for {} vertices",
                *index as i32, pos, vertex_count
            )));
        }
        if self.positions.iter().flatten().any(|v| !v.is_finite()) {
            return Err(BridgeError::InvalidGeometry("vertex positions contain non-finite values".to_string()));
        }
        Ok(())
    }

    /// 校验并复制为自有的记录
    pub fn to_record(&self, id: GeometryId) -> BridgeResult<GeometryRecord> {
        self.validate()?;
        Ok(GeometryRecord {
            id,
            positions: self.positions.to_vec(),
            normals: self.normals.to_vec(),
            uvs: self.uvs.to_vec(),
            indices: self.indices.to_vec(),
        })
    }
}

/// 上传之后的几何记录，创建后不可修改
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    id: GeometryId,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}
// getter
impl GeometryRecord {
    #[inline]
    pub fn id(&self) -> GeometryId {
        self.id
    }
    #[inline]
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }
    #[inline]
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }
    #[inline]
    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
// tools
impl GeometryRecord {
    /// 记录占用的字节数，用于估算 BLAS 的显存开销
    pub fn byte_size(&self) -> usize {
        size_of_val(self.positions.as_slice())
            + size_of_val(self.normals.as_slice())
            + size_of_val(self.uvs.as_slice())
            + size_of_val(self.indices.as_slice())
    }

    /// 被索引引用到的顶点的包围盒
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for &index in &self.indices {
            aabb.grow_point(Vec3::from(self.positions[index as usize]));
        }
        aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn test_validate_rejects_empty_arrays() {
        let empty = GeometryData::new(&[], &[0, 1, 2]);
        assert!(matches!(empty.validate(), Err(BridgeError::InvalidGeometry(_))));

        let no_indices = GeometryData::new(&TRIANGLE, &[]);
        assert!(matches!(no_indices.validate(), Err(BridgeError::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_rejects_partial_triangle() {
        let data = GeometryData::new(&TRIANGLE, &[0, 1]);
        let err = data.validate().unwrap_err();
        assert_eq!(err, BridgeError::InvalidGeometry("index count 2 is not a multiple of 3".to_string()));
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let data = GeometryData::new(&TRIANGLE, &[0, 1, 3]);
        assert!(matches!(data.validate(), Err(BridgeError::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_rejects_mismatched_normals() {
        let normals = [[0.0, 0.0, 1.0]; 2];
        let data = GeometryData::new(&TRIANGLE, &[0, 1, 2]).with_normals(&normals);
        assert!(matches!(data.validate(), Err(BridgeError::InvalidGeometry(_))));
    }

    #[test]
    fn test_from_flat_arrays() {
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let normals = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let uvs = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let indices = [0, 1, 2];

        let data = GeometryData::from_flat(&vertices, &normals, &uvs, &indices).unwrap();
        assert_eq!(data.vertex_count(), 3);
        assert_eq!(data.positions[1], [1.0, 0.0, 0.0]);
        assert_eq!(data.uvs[2], [0.0, 1.0]);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_from_flat_rejects_ragged_vertices() {
        let vertices = [0.0, 0.0, 0.0, 1.0];
        let result = GeometryData::from_flat(&vertices, &[], &[], &[0, 1, 2]);
        assert!(matches!(result, Err(BridgeError::InvalidGeometry(_))));
    }

    #[test]
    fn test_negative_index_is_rejected() {
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let data = GeometryData::from_flat(&vertices, &[], &[], &[0, 1, -1]).unwrap();
        let err = data.validate().unwrap_err();
        assert_eq!(
            err,
            BridgeError::InvalidGeometry("index -1 at position 2 is out of range for 3 vertices".to_string())
        );
    }

    #[test]
    fn test_record_is_an_independent_copy() {
        let mut positions = TRIANGLE.to_vec();
        let indices = vec![0, 1, 2];
        let record = GeometryData::new(&positions, &indices).to_record(GeometryId(7)).unwrap();

        // 宿主在调用返回之后修改自己的缓冲区
        positions[0] = [9.0, 9.0, 9.0];
        drop(indices);

        assert_eq!(record.positions()[0], [0.0, 0.0, 0.0]);
        assert_eq!(record.triangle_count(), 1);
        assert_eq!(record.id(), GeometryId(7));
    }

    #[test]
    fn test_bounds() {
        let record = GeometryData::new(&TRIANGLE, &[0, 1, 2]).to_record(GeometryId(1)).unwrap();
        let bounds = record.bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
        assert!(!bounds.is_empty());
        assert!(Aabb::EMPTY.is_empty());
    }
}

use ash::vk;
use glam::Mat4;
use itertools::Itertools;
use rtbridge_render_interface::acceleration::{BlasInfo, MAX_CUSTOM_INDEX, TlasInfo, tlas_instance_record};
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::handles::{GeometryHandle, InstanceHandle};
use slotmap::SecondaryMap;

use crate::geometry_registry::GeometryRegistry;
use crate::instance_manager::InstanceManager;

/// TLAS 中的一条 instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TlasInstance {
    pub instance: InstanceHandle,
    pub geometry: GeometryHandle,
    pub blas_address: vk::DeviceAddress,
    pub transform: Mat4,
}

/// 已经构建完成的 TLAS，记录了构建时刻的 instance 集合
#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelStructure {
    info: TlasInfo,
    instances: Vec<TlasInstance>,
    generation: u64,
}
// getter
impl TopLevelStructure {
    #[inline]
    pub fn info(&self) -> &TlasInfo {
        &self.info
    }
    #[inline]
    pub fn instances(&self) -> &[TlasInstance] {
        &self.instances
    }
    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
    /// 第几次成功构建，从 1 开始
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
    #[inline]
    pub fn find(&self, instance: InstanceHandle) -> Option<&TlasInstance> {
        self.instances.iter().find(|i| i.instance == instance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildReport {
    /// 自上次构建以来没有任何变化
    UpToDate,
    Built {
        generation: u64,
        instance_count: usize,
        /// 本次新建的 BLAS 数量
        new_blas: usize,
        /// 本次释放的 BLAS 数量
        released_blas: usize,
    },
}

/// 两层加速结构的构建
///
/// - 每个几何对应一个 BLAS，构建后不再变化，推迟到下一次 build 时才构建
/// - TLAS 总是基于当前 instance 集合整体重建，不做增量修改
/// - 构建失败时保留上一次的 TLAS
#[derive(Default)]
pub struct AccelerationBuilder {
    all_blas: SecondaryMap<GeometryHandle, BlasInfo>,
    /// 几何失效后，对应的 BLAS 可能仍被当前 TLAS 引用，等下一次 TLAS 构建成功后再释放
    retired_blas: Vec<(GeometryHandle, BlasInfo)>,
    tlas: Option<TopLevelStructure>,
    generation: u64,
}
// new & init
impl AccelerationBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}
// getter
impl AccelerationBuilder {
    #[inline]
    pub fn tlas(&self) -> Option<&TopLevelStructure> {
        self.tlas.as_ref()
    }
    #[inline]
    pub fn blas(&self, geometry: GeometryHandle) -> Option<&BlasInfo> {
        self.all_blas.get(geometry)
    }
    #[inline]
    pub fn blas_count(&self) -> usize {
        self.all_blas.len()
    }
    #[inline]
    pub fn retired_blas_count(&self) -> usize {
        self.retired_blas.len()
    }
}
// tools
impl AccelerationBuilder {
    /// 是否存在尚未反映到 TLAS 中的变化
    ///
    /// instance 引用的几何一定已经有 BLAS：新的引用会把场景标记为 dirty，
    /// 构建失败时 dirty 也不会被清除。
    pub fn needs_build(&self, instances: &InstanceManager) -> bool {
        self.tlas.is_none() || instances.is_dirty() || !self.retired_blas.is_empty()
    }

    /// 调用者需要持有场景锁，保证 registry 和 instances 在构建期间不变
    pub fn build(
        &mut self,
        registry: &GeometryRegistry,
        instances: &mut InstanceManager,
        backend: &mut dyn RenderBackend,
    ) -> BridgeResult<BuildReport> {
        if !self.needs_build(instances) {
            return Ok(BuildReport::UpToDate);
        }

        // 1. 基于 instance 快照确定需要的几何
        let snapshot = instances.snapshot();
        if snapshot.len() > MAX_CUSTOM_INDEX as usize + 1 {
            return Err(BridgeError::BuildFailed(format!(
                "{} instances exceed the 24-bit custom index range",
                snapshot.len()
            )));
        }
        let required = snapshot.iter().map(|s| s.geometry).unique().collect_vec();

        // 2. 补齐缺失的 BLAS，已经构建好的 BLAS 即使后续失败也可以复用；没有被引用的几何不构建
        let new_blas = self.build_missing_blas(registry, &required, backend)?;

        let mut tlas_instances = Vec::with_capacity(snapshot.len());
        let mut records = Vec::with_capacity(snapshot.len());
        for (custom_index, instance) in snapshot.iter().enumerate() {
            let blas = self.all_blas.get(instance.geometry).ok_or_else(|| {
                BridgeError::BuildFailed(format!("{} references geometry without BLAS", instance.handle))
            })?;
            records.push(tlas_instance_record(&instance.transform, custom_index as u32, blas.device_address));
            tlas_instances.push(TlasInstance {
                instance: instance.handle,
                geometry: instance.geometry,
                blas_address: blas.device_address,
                transform: instance.transform,
            });
        }

        // 3. 构建 TLAS，失败时保留旧的
        let info = backend.build_tlas(&records).map_err(into_build_failed)?;

        self.generation += 1;
        let instance_count = tlas_instances.len();
        self.tlas = Some(TopLevelStructure {
            info,
            instances: tlas_instances,
            generation: self.generation,
        });
        instances.clear_dirty();

        // 4. 新的 TLAS 不再引用失效的 BLAS
        let released_blas = self.retired_blas.len();
        for (geometry, blas) in self.retired_blas.drain(..) {
            backend.release_blas(geometry, &blas);
        }

        log::info!(
            "Successfully built tlas #{} on {}: {} instances, {} distinct blas",
            self.generation,
            backend.name(),
            instance_count,
            required.len()
        );
        Ok(BuildReport::Built {
            generation: self.generation,
            instance_count,
            new_blas,
            released_blas,
        })
    }

    fn build_missing_blas(
        &mut self,
        registry: &GeometryRegistry,
        required: &[GeometryHandle],
        backend: &mut dyn RenderBackend,
    ) -> BridgeResult<usize> {
        let mut built = 0;
        for &handle in required {
            if self.all_blas.contains_key(handle) {
                continue;
            }
            let record = registry.get(handle).ok_or_else(|| {
                BridgeError::BuildFailed(format!("instance references unknown geometry {:?}", handle))
            })?;
            let blas = backend.build_blas(handle, record).map_err(into_build_failed)?;
            log::debug!(
                "Built blas for geometry {} ({} primitives, {} bytes)",
                record.id(),
                blas.primitive_count,
                blas.size_bytes
            );
            self.all_blas.insert(handle, blas);
            built += 1;
        }
        Ok(built)
    }

    /// 几何失效时调用，BLAS 在下一次 TLAS 构建成功后释放
    pub fn retire_blas(&mut self, geometry: GeometryHandle) {
        if let Some(blas) = self.all_blas.remove(geometry) {
            self.retired_blas.push((geometry, blas));
        }
    }

    /// 把所有加速结构交还给渲染器，渲染上下文关闭时调用
    ///
    /// 之后的 build 会重新构建需要的 BLAS 和 TLAS。
    pub fn release_all(&mut self, backend: &mut dyn RenderBackend) {
        for (geometry, blas) in self.retired_blas.drain(..) {
            backend.release_blas(geometry, &blas);
        }
        for (geometry, blas) in self.all_blas.drain() {
            backend.release_blas(geometry, &blas);
        }
        if let Some(tlas) = self.tlas.take() {
            backend.release_tlas(&tlas.info);
        }
    }
}

/// backend 返回的任何错误在构建阶段都视为构建失败
fn into_build_failed(e: BridgeError) -> BridgeError {
    match e {
        BridgeError::BuildFailed(_) => e,
        other => BridgeError::BuildFailed(other.to_string()),
    }
}

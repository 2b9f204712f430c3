use std::sync::Arc;
use std::time::Duration;

use glam::Mat4;
use parking_lot::Mutex;
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::camera::{CameraState, SceneParams};
use rtbridge_render_interface::debug_bridge::{DebugBridgeGuard, DebugSink, GlobalDebugBridge, raw_debug_callback};
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::geometry::GeometryData;
use rtbridge_render_interface::handles::{CameraId, GeometryHandle, GeometryId, HostObjectId, InstanceHandle};
use rtbridge_render_interface::render_target::RenderTargetDesc;
use rtbridge_scene::acceleration_builder::BuildReport;
use rtbridge_scene::scene_manager::{SceneManager, SharedScene};

use crate::command::{CommandSender, FrameEventToken, RenderCommand, command_channel};
use crate::context::RenderContext;
use crate::render_thread::RenderThread;
use crate::settings::BridgeSettings;
use crate::status::RenderStatus;

/// 宿主一侧的入口
///
/// - 场景修改（几何、instance）直接在场景锁内同步完成，错误立即返回给调用者
/// - 管线、TLAS 构建、渲染目标等操作作为命令提交，由渲染上下文按顺序执行，
///   执行结果通过 [`RenderStatus`] 上报
/// - 相机与场景参数写入固定的参数寄存器，帧事件时由渲染上下文读取
/// - 渲染目标与相机参数都按照宿主相机 id 区分，互不覆盖
///
/// 矩阵参数是按列主序排列的 16 个 float。
pub struct RayTracingBridge {
    scene: SharedScene,
    commands: CommandSender,
    status: Arc<RenderStatus>,
    settings: BridgeSettings,

    render_thread: Option<RenderThread>,
    debug_guard: Mutex<Option<DebugBridgeGuard>>,
}
// new & init
impl RayTracingBridge {
    /// 创建渲染线程，渲染上下文在渲染线程中运行
    pub fn spawn(backend: Box<dyn RenderBackend>, settings: BridgeSettings) -> BridgeResult<Self> {
        let (mut bridge, context) = Self::inline(backend, settings);
        let thread = RenderThread::spawn(&bridge.settings.render_thread_name, context, bridge.commands.clone())?;
        bridge.render_thread = Some(thread);
        Ok(bridge)
    }

    /// 不创建线程，渲染上下文交给调用者，在自己的交接点上执行
    pub fn inline(backend: Box<dyn RenderBackend>, settings: BridgeSettings) -> (Self, RenderContext) {
        let (commands, receiver) = command_channel(settings.command_queue_capacity);
        let scene = SceneManager::new_shared();
        let status = Arc::new(RenderStatus::default());
        log::info!("Creating ray tracing bridge on {} renderer.", backend.name());

        let context = RenderContext::new(backend, receiver, scene.clone(), status.clone());
        let bridge = Self {
            scene,
            commands,
            status,
            settings,
            render_thread: None,
            debug_guard: Mutex::new(None),
        };
        (bridge, context)
    }
}
// getter
impl RayTracingBridge {
    #[inline]
    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }
    #[inline]
    pub fn status(&self) -> &Arc<RenderStatus> {
        &self.status
    }
    #[inline]
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }
    #[inline]
    pub fn is_threaded(&self) -> bool {
        self.render_thread.is_some()
    }
    #[inline]
    pub fn last_build(&self) -> Option<BridgeResult<BuildReport>> {
        self.status.last_build()
    }
    /// 最近一次成功构建的 TLAS 中的 instance 数量
    pub fn tlas_instance_count(&self) -> Option<usize> {
        self.scene.lock().tlas().map(|tlas| tlas.instance_count())
    }
}
// geometry
impl RayTracingBridge {
    /// 上传几何，返回几何索引
    ///
    /// 数据按照紧密排列的 float 数组传入：位置和法线每个顶点 3 个，uv 每个顶点 2 个。
    /// 同一个 `id` 重复上传时直接返回已有的索引。
    pub fn upload_geometry(
        &self,
        id: i32,
        positions: &[f32],
        normals: &[f32],
        uvs: &[f32],
        indices: &[i32],
    ) -> BridgeResult<u64> {
        let data = GeometryData::from_flat(positions, normals, uvs, indices)?;
        self.upload_geometry_data(GeometryId(id), data).map(|handle| handle.to_index())
    }

    pub fn upload_geometry_data(&self, id: GeometryId, data: GeometryData<'_>) -> BridgeResult<GeometryHandle> {
        self.scene.lock().upload_geometry(id, data)
    }

    #[inline]
    pub fn lookup_geometry_index(&self, id: i32) -> Option<u64> {
        self.scene.lock().lookup_geometry(GeometryId(id)).map(|handle| handle.to_index())
    }

    /// 让几何失效，之后可以用同一个 id 上传新的内容
    pub fn invalidate_geometry(&self, id: i32) -> BridgeResult<()> {
        self.scene.lock().invalidate_geometry(GeometryId(id)).map(|_| ())
    }
}
// instance
impl RayTracingBridge {
    pub fn add_instance(&self, geometry_index: u64, transform: &[f32; 16]) -> BridgeResult<InstanceHandle> {
        self.scene
            .lock()
            .add_instance(GeometryHandle::from_index(geometry_index), Mat4::from_cols_array(transform))
    }

    /// 添加 instance，同时记录宿主对象 id，之后可以通过 [`Self::lookup_host_instance`] 查找
    pub fn add_host_instance(
        &self,
        host_id: i32,
        geometry_index: u64,
        transform: &[f32; 16],
    ) -> BridgeResult<InstanceHandle> {
        self.scene.lock().add_host_instance(
            HostObjectId(host_id),
            GeometryHandle::from_index(geometry_index),
            Mat4::from_cols_array(transform),
        )
    }

    #[inline]
    pub fn lookup_host_instance(&self, host_id: i32) -> Option<InstanceHandle> {
        self.scene.lock().lookup_host_instance(HostObjectId(host_id))
    }

    pub fn remove_instance(&self, instance: InstanceHandle) -> BridgeResult<()> {
        self.scene.lock().remove_instance(instance)
    }

    pub fn update_transform(&self, instance: InstanceHandle, transform: &[f32; 16]) -> BridgeResult<()> {
        self.scene.lock().update_transform(instance, Mat4::from_cols_array(transform))
    }
}
// commands
impl RayTracingBridge {
    /// 请求基于当前场景构建 TLAS，返回命令序号
    ///
    /// 构建在渲染上下文中进行，结果通过 [`RenderStatus::last_build`] 查询。
    pub fn build_top_level_structure(&self) -> BridgeResult<u64> {
        self.commands.enqueue(RenderCommand::BuildTopLevel)
    }

    pub fn prepare(&self) -> BridgeResult<u64> {
        self.commands.enqueue(RenderCommand::Prepare)
    }

    pub fn reset_pipeline(&self) -> BridgeResult<u64> {
        self.commands.enqueue(RenderCommand::ResetPipeline)
    }

    /// 替换相机 `camera_id` 的渲染目标
    ///
    /// 校验在调用时同步完成，非法的描述不会进入队列。
    pub fn set_render_target(
        &self,
        camera_id: i32,
        format: i32,
        width: i32,
        height: i32,
        handle: u64,
    ) -> BridgeResult<RenderTargetDesc> {
        let desc = RenderTargetDesc::from_host(format, width, height, handle)?;
        self.commands.enqueue(RenderCommand::SetRenderTarget(CameraId(camera_id), desc))?;
        Ok(desc)
    }

    /// 每帧调用一次，把返回的 token 交给宿主的渲染循环
    ///
    /// 这一帧追踪所有同时有渲染目标和相机参数的相机。
    #[inline]
    pub fn frame_event_token(&self) -> BridgeResult<FrameEventToken> {
        self.commands.frame_event_token()
    }

    /// 只为一个相机追踪光线的帧事件，相机没有渲染目标或者相机参数时跳过
    #[inline]
    pub fn camera_event_token(&self, camera_id: i32) -> BridgeResult<FrameEventToken> {
        self.commands.camera_event_token(CameraId(camera_id))
    }

    /// 等待之前提交的所有命令执行完成，只在渲染线程模式下可用
    pub fn flush(&self) -> BridgeResult<()> {
        if !self.is_threaded() {
            return Err(BridgeError::RenderThreadUnavailable(
                "flush requires a render thread, drain the render context instead".to_string(),
            ));
        }
        let timeout = self.settings.flush_timeout();
        let (signal, done) = crossbeam_channel::bounded(1);
        self.commands.enqueue(RenderCommand::Fence(signal))?;
        done.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => BridgeError::Timeout(timeout),
            crossbeam_channel::RecvTimeoutError::Disconnected => BridgeError::ChannelClosed,
        })
    }

    /// 等待指定帧被渲染上下文处理，超时返回 false
    #[inline]
    pub fn wait_for_frame(&self, token: FrameEventToken) -> bool {
        self.status.wait_for_frame(token, self.settings.flush_timeout())
    }

    #[inline]
    pub fn wait_for_frame_timeout(&self, token: FrameEventToken, timeout: Duration) -> bool {
        self.status.wait_for_frame(token, timeout)
    }
}
// params
impl RayTracingBridge {
    /// 只覆盖相机 `camera_id` 的参数
    ///
    /// `near_far_fov` 依次为近平面、远平面、竖直方向视角（弧度）。
    pub fn update_camera(
        &self,
        camera_id: i32,
        position: [f32; 3],
        direction: [f32; 3],
        up: [f32; 3],
        side: [f32; 3],
        near_far_fov: [f32; 3],
    ) {
        let camera = CameraState::from_host(position, direction, up, side, near_far_fov);
        self.commands.params().update_camera(CameraId(camera_id), &camera);
    }

    #[inline]
    pub fn update_camera_state(&self, camera_id: i32, camera: &CameraState) {
        self.commands.params().update_camera(CameraId(camera_id), camera);
    }

    /// 环境色 RGBA
    pub fn update_scene_parameters(&self, rgba: [f32; 4]) {
        self.commands.params().update_scene_params(&SceneParams::from_rgba(rgba));
    }
}
// debug
impl RayTracingBridge {
    /// 注册进程内唯一的诊断信息接收者，并让渲染器通过它输出诊断信息
    ///
    /// 进程内已经有接收者时返回 [`BridgeError::DebugCallbackAlreadyRegistered`]。
    pub fn register_debug_sink(&self, sink: Arc<dyn DebugSink>) -> BridgeResult<()> {
        let mut guard = self.debug_guard.lock();
        if guard.is_some() {
            return Err(BridgeError::DebugCallbackAlreadyRegistered);
        }
        let installed = GlobalDebugBridge::install(sink)?;
        if let Err(e) = self.commands.enqueue(RenderCommand::RegisterDebugCallback(Some(raw_debug_callback))) {
            drop(installed);
            return Err(e);
        }
        *guard = Some(installed);
        Ok(())
    }

    /// 渲染器不再调用回调，同时注销进程内的接收者
    pub fn unregister_debug_sink(&self) -> BridgeResult<()> {
        let mut guard = self.debug_guard.lock();
        if guard.is_none() {
            return Ok(());
        }
        self.commands.enqueue(RenderCommand::RegisterDebugCallback(None))?;
        // 渲染器在处理注销命令之前发出的信息会落到默认的日志输出
        guard.take();
        Ok(())
    }
}
impl Drop for RayTracingBridge {
    fn drop(&mut self) {
        if let Some(thread) = self.render_thread.take()
            && let Err(e) = thread.join()
        {
            log::error!("{}", e);
        }
        self.debug_guard.lock().take();
        log::info!("RayTracingBridge dropped.");
    }
}

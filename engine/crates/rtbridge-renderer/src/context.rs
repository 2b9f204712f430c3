use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use rtbridge_render_interface::acceleration::TlasInfo;
use rtbridge_render_interface::backend::RenderBackend;
use rtbridge_render_interface::handles::CameraId;
use rtbridge_render_interface::render_target::RenderTargetDesc;
use rtbridge_scene::scene_manager::SharedScene;

use crate::command::{CommandReceiver, FrameEventToken, PendingCommand, RenderCommand};
use crate::status::RenderStatus;

/// 绑定了渲染目标的相机
struct ViewState {
    target: RenderTargetDesc,
    /// 已经写入渲染器的相机参数版本，0 表示还没有相机参数
    camera_version: u64,
}

/// 渲染上下文：持有渲染器，按照提交顺序执行命令
///
/// 可以移动到渲染线程中运行（[`crate::render_thread::RenderThread`]），
/// 也可以由宿主在自己的交接点上显式调用 [`RenderContext::drain`]。
pub struct RenderContext {
    backend: Box<dyn RenderBackend>,
    receiver: CommandReceiver,
    scene: SharedScene,
    status: Arc<RenderStatus>,

    prepared: bool,
    views: BTreeMap<CameraId, ViewState>,
    /// 已经写入渲染器的场景参数版本
    scene_params_version: u64,
}
// new & init
impl RenderContext {
    pub fn new(
        backend: Box<dyn RenderBackend>,
        receiver: CommandReceiver,
        scene: SharedScene,
        status: Arc<RenderStatus>,
    ) -> Self {
        Self {
            backend,
            receiver,
            scene,
            status,
            prepared: false,
            views: BTreeMap::new(),
            scene_params_version: 0,
        }
    }
}
// getter
impl RenderContext {
    #[inline]
    pub fn status(&self) -> &Arc<RenderStatus> {
        &self.status
    }
    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
    #[inline]
    pub fn render_target(&self, camera: CameraId) -> Option<&RenderTargetDesc> {
        self.views.get(&camera).map(|view| &view.target)
    }
    /// 绑定了渲染目标的相机
    #[inline]
    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.views.keys().copied()
    }
    #[inline]
    pub fn pending_commands(&self) -> usize {
        self.receiver.len()
    }
}
// update
impl RenderContext {
    /// 执行当前队列中的所有命令，遇到 [`RenderCommand::Shutdown`] 时停止
    pub fn drain(&mut self) -> ControlFlow<()> {
        while let Some(pending) = self.receiver.try_recv() {
            if self.execute(pending).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// 宿主在自己的渲染循环中调用：执行到指定帧事件为止
    ///
    /// 返回这一帧是否已经完成。
    pub fn run_until_frame(&mut self, token: FrameEventToken) -> bool {
        while !self.status.is_frame_complete(token) {
            let Some(pending) = self.receiver.try_recv() else {
                break;
            };
            if self.execute(pending).is_break() {
                break;
            }
        }
        self.status.is_frame_complete(token)
    }

    /// 阻塞运行，直到收到关闭命令或者所有 sender 都被 drop
    pub fn run_blocking(&mut self) {
        while let Ok(pending) = self.receiver.recv() {
            if self.execute(pending).is_break() {
                break;
            }
        }
    }

    pub fn execute(&mut self, pending: PendingCommand) -> ControlFlow<()> {
        log::trace!("execute #{} (frame {}): {:?}", pending.seq, pending.frame, pending.command);

        match pending.command {
            RenderCommand::Prepare => self.prepare(),
            RenderCommand::ResetPipeline => {
                if let Err(e) = self.backend.reset_pipeline() {
                    log::error!("Failed to reset pipeline: {}", e);
                }
            }
            RenderCommand::BuildTopLevel => self.build_top_level(),
            RenderCommand::SetRenderTarget(camera, desc) => self.set_render_target(camera, desc),
            RenderCommand::RegisterDebugCallback(callback) => self.backend.register_debug_callback(callback),
            RenderCommand::FrameEvent(token) => self.render_frame(token),
            RenderCommand::Fence(signal) => {
                let _ = signal.send(());
            }
            RenderCommand::Shutdown => {
                log::info!("Render context received shutdown.");
                self.release_acceleration();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn prepare(&mut self) {
        if self.prepared {
            log::debug!("Pipeline already prepared.");
            return;
        }
        match self.backend.prepare() {
            Ok(()) => {
                self.prepared = true;
                log::info!("Prepared {} renderer.", self.backend.name());
            }
            Err(e) => log::error!("Failed to prepare {} renderer: {}", self.backend.name(), e),
        }
    }

    fn build_top_level(&mut self) {
        let result = self.scene.lock().build(self.backend.as_mut());
        if let Err(e) = &result {
            log::error!("{}", e);
        }
        self.status.record_build(result);
    }

    /// 只替换这个相机的渲染目标，已经写入的相机参数保留
    fn set_render_target(&mut self, camera: CameraId, desc: RenderTargetDesc) {
        let result = self.backend.bind_render_target(camera, &desc).map(|_| desc);
        match &result {
            Ok(desc) => {
                log::info!(
                    "Render target {:?} bound to {} ({}x{}, {:?})",
                    desc.handle,
                    camera,
                    desc.extent.width,
                    desc.extent.height,
                    desc.format.vk_format()
                );
                self.views
                    .entry(camera)
                    .and_modify(|view| view.target = *desc)
                    .or_insert(ViewState {
                        target: *desc,
                        camera_version: 0,
                    });
            }
            Err(e) => log::error!("Failed to bind render target for {}: {}", camera, e),
        }
        self.status.record_render_target(result);
    }

    /// 同步最新的参数，对每个准备好的相机追踪光线
    fn render_frame(&mut self, token: FrameEventToken) {
        if let Some((block, version)) = self.receiver.params().scene().read_if_newer(self.scene_params_version) {
            self.backend.write_scene_params(&block);
            self.scene_params_version = version;
        }

        let cameras: Vec<CameraId> = match token.camera() {
            Some(camera) => vec![camera],
            None => self.views.keys().copied().collect(),
        };
        let traced = self.trace(token.frame_id(), &cameras);
        self.status.complete_frame(token.frame_id(), traced);
    }

    /// 返回实际追踪了光线的相机数量
    fn trace(&mut self, frame_id: u64, cameras: &[CameraId]) -> usize {
        if !self.prepared {
            log::debug!("Frame {}: pipeline not prepared, skip tracing.", frame_id);
            return 0;
        }
        if cameras.is_empty() {
            log::debug!("Frame {}: no render target, skip tracing.", frame_id);
            return 0;
        }

        // 只在取 TLAS 时持有场景锁，追踪光线期间宿主可以继续修改场景
        let tlas = self.scene.lock().tlas().map(|tlas| *tlas.info());
        let Some(tlas) = tlas else {
            log::debug!("Frame {}: no tlas yet, skip tracing.", frame_id);
            return 0;
        };

        cameras
            .iter()
            .filter(|camera| self.trace_view(frame_id, **camera, &tlas))
            .count()
    }

    fn trace_view(&mut self, frame_id: u64, camera: CameraId, tlas: &TlasInfo) -> bool {
        let params = self.receiver.params();
        let Some(view) = self.views.get_mut(&camera) else {
            log::debug!("Frame {}: no render target for {}, skip tracing.", frame_id, camera);
            return false;
        };
        if let Some((block, version)) = params.camera_if_newer(camera, view.camera_version) {
            self.backend.write_camera(camera, &block);
            view.camera_version = version;
        }
        if view.camera_version == 0 {
            log::debug!("Frame {}: no camera data for {}, skip tracing.", frame_id, camera);
            return false;
        }

        match self.backend.trace_rays(frame_id, camera, tlas) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Frame {}: failed to trace rays for {}: {}", frame_id, camera, e);
                false
            }
        }
    }
}
// destroy
impl RenderContext {
    /// 把场景的加速结构交还给渲染器，可以重复调用
    fn release_acceleration(&mut self) {
        self.scene.lock().release_acceleration(self.backend.as_mut());
    }
}
impl Drop for RenderContext {
    fn drop(&mut self) {
        // 宿主直接 drop 上下文时没有经过关闭命令
        self.release_acceleration();
        log::info!("RenderContext dropped.");
    }
}

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rtbridge_render_interface::error::BridgeResult;
use rtbridge_render_interface::render_target::RenderTargetDesc;
use rtbridge_scene::acceleration_builder::BuildReport;

use crate::command::FrameEventToken;

#[derive(Default)]
struct StatusState {
    last_build: Option<BridgeResult<BuildReport>>,
    build_failures: u64,
    last_render_target: Option<BridgeResult<RenderTargetDesc>>,
    completed_frame: u64,
    traced_frames: u64,
    traced_views: u64,
}

/// 渲染上下文执行结果，宿主在帧循环中读取
///
/// 构建失败等异步错误通过这里上报，而不是中断渲染上下文。
#[derive(Default)]
pub struct RenderStatus {
    state: Mutex<StatusState>,
    frame_done: Condvar,
}
// update
impl RenderStatus {
    pub fn record_build(&self, result: BridgeResult<BuildReport>) {
        let mut state = self.state.lock();
        if result.is_err() {
            state.build_failures += 1;
        }
        state.last_build = Some(result);
    }

    pub fn record_render_target(&self, result: BridgeResult<RenderTargetDesc>) {
        self.state.lock().last_render_target = Some(result);
    }

    /// `traced_views` 为这一帧实际追踪了光线的相机数量
    pub fn complete_frame(&self, frame_id: u64, traced_views: usize) {
        let mut state = self.state.lock();
        state.completed_frame = state.completed_frame.max(frame_id);
        if traced_views > 0 {
            state.traced_frames += 1;
        }
        state.traced_views += traced_views as u64;
        self.frame_done.notify_all();
    }
}
// getter
impl RenderStatus {
    #[inline]
    pub fn last_build(&self) -> Option<BridgeResult<BuildReport>> {
        self.state.lock().last_build.clone()
    }
    #[inline]
    pub fn build_failures(&self) -> u64 {
        self.state.lock().build_failures
    }
    #[inline]
    pub fn last_render_target(&self) -> Option<BridgeResult<RenderTargetDesc>> {
        self.state.lock().last_render_target.clone()
    }
    #[inline]
    pub fn completed_frame(&self) -> u64 {
        self.state.lock().completed_frame
    }
    /// 实际追踪了光线的帧数
    #[inline]
    pub fn traced_frames(&self) -> u64 {
        self.state.lock().traced_frames
    }
    /// 所有帧中追踪过光线的相机次数之和
    #[inline]
    pub fn traced_views(&self) -> u64 {
        self.state.lock().traced_views
    }
    #[inline]
    pub fn is_frame_complete(&self, token: FrameEventToken) -> bool {
        self.completed_frame() >= token.frame_id()
    }

    /// 等待帧事件被渲染上下文处理，超时返回 false
    pub fn wait_for_frame(&self, token: FrameEventToken, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.completed_frame < token.frame_id() {
            if self.frame_done.wait_until(&mut state, deadline).timed_out() {
                return state.completed_frame >= token.frame_id();
            }
        }
        true
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use rtbridge_render_interface::error::{BridgeError, BridgeResult};

use crate::command::{CommandSender, RenderCommand};
use crate::context::RenderContext;

/// 渲染线程句柄
///
/// 线程内运行 [`RenderContext::run_blocking`]，直到收到关闭命令或者宿主一侧的 sender 全部被 drop。
pub struct RenderThread {
    /// 用于发送关闭命令
    sender: CommandSender,
    thread_handle: Option<JoinHandle<()>>,
    /// 运行标志
    running: Arc<AtomicBool>,
}
// new & init
impl RenderThread {
    /// 创建并启动渲染线程，渲染上下文被移动到新线程中
    pub fn spawn(name: &str, mut context: RenderContext, sender: CommandSender) -> BridgeResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                log::info!("Render thread started.");
                context.run_blocking();
                running_clone.store(false, Ordering::SeqCst);
                log::info!("Render thread exited.");
            })
            .map_err(|e| BridgeError::RenderThreadUnavailable(format!("failed to spawn render thread: {}", e)))?;

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
            running,
        })
    }
}
// getter
impl RenderThread {
    /// 检查渲染线程是否仍在运行
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
// destroy
impl RenderThread {
    /// 请求渲染线程关闭，关闭命令排在所有已提交的命令之后
    pub fn shutdown(&self) {
        if !self.is_running() {
            return;
        }
        if self.sender.enqueue(RenderCommand::Shutdown).is_err() {
            log::warn!("Render thread already disconnected.");
        }
    }

    /// 等待渲染线程结束
    pub fn join(mut self) -> BridgeResult<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> BridgeResult<()> {
        self.shutdown();
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|_| BridgeError::RenderThreadUnavailable("render thread panicked".to_string()))
    }
}
impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Err(e) = self.join_inner() {
            log::error!("{}", e);
        }
    }
}

//! 渲染上下文一侧
//!
//! 宿主通过 [`bridge::RayTracingBridge`] 修改场景、提交命令；
//! 渲染上下文（[`context::RenderContext`]）按照提交顺序执行命令，并在帧事件到来时追踪光线。
//! 两者之间只通过 [`command`] 中的通道通信。

pub mod bridge;
pub mod command;
pub mod context;
pub mod headless;
pub mod param_sync;
pub mod render_thread;
pub mod settings;
pub mod status;

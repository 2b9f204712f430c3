//! 宿主场景与外部光线追踪渲染器之间的边界
//!
//! 这里只定义跨越边界的数据与约定：
//! - 句柄与错误类型
//! - 几何、相机、渲染目标等边界数据
//! - [`backend::RenderBackend`]：渲染器一侧唯一的调用入口
//! - [`debug_bridge`]：渲染器诊断信息到宿主日志的转换

pub mod acceleration;
pub mod backend;
pub mod camera;
pub mod debug_bridge;
pub mod error;
pub mod geometry;
pub mod handles;
pub mod render_target;

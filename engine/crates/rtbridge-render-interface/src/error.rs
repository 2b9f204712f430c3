use std::time::Duration;

use crate::handles::{GeometryHandle, GeometryId, InstanceHandle};

/// 桥接层的所有错误
///
/// 查询类错误（未知句柄等）直接返回给调用者；
/// [`BridgeError::BuildFailed`] 会被记录在渲染状态里，由宿主的帧循环读取。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unknown geometry handle {0:?}")]
    UnknownGeometry(GeometryHandle),

    #[error("unknown geometry id {0}")]
    UnknownGeometryId(GeometryId),

    #[error("unknown instance {0}")]
    UnknownInstance(InstanceHandle),

    /// 几何仍被存活的 instance 引用，不能失效
    #[error("geometry {id} is still referenced by {instance_count} instance(s)")]
    GeometryInUse { id: GeometryId, instance_count: usize },

    #[error("acceleration structure build failed: {0}")]
    BuildFailed(String),

    #[error("invalid render target: {0}")]
    InvalidRenderTarget(String),

    #[error("unrecognized debug severity {0}")]
    UnrecognizedSeverity(i32),

    #[error("a debug callback is already registered for this process")]
    DebugCallbackAlreadyRegistered,

    #[error("render command channel is closed")]
    ChannelClosed,

    #[error("render command queue is full")]
    QueueFull,

    #[error("render thread unavailable: {0}")]
    RenderThreadUnavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("settings error: {0}")]
    Settings(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

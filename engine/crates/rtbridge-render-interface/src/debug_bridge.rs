//! 渲染器诊断信息 -> 宿主日志
//!
//! 渲染器以 `(text, severity, length)` 的形式调用回调，`text` 只在回调期间有效，
//! 因此所有入口都会在返回之前把文本复制为 `String`。
//!
//! 进程内只允许注册一个 sink：[`GlobalDebugBridge::install`] 返回的
//! [`DebugBridgeGuard`] 被 drop 时注销。没有注册 sink 时使用 [`LogDebugSink`]。

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BridgeError, BridgeResult};

/// 渲染器诊断信息使用的 log target，便于宿主单独过滤
pub const RENDERER_LOG_TARGET: &str = "rtbridge::renderer";

/// 渲染器可以调用的回调函数签名
pub type RawDebugCallback = unsafe extern "C" fn(text: *const c_char, severity: i32, length: i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DebugSeverity {
    Info = 0,
    Warning = 1,
    Error = 2,
}
impl DebugSeverity {
    pub fn from_raw(raw: i32) -> BridgeResult<Self> {
        match raw {
            0 => Ok(DebugSeverity::Info),
            1 => Ok(DebugSeverity::Warning),
            2 => Ok(DebugSeverity::Error),
            _ => Err(BridgeError::UnrecognizedSeverity(raw)),
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    #[inline]
    pub fn log_level(self) -> log::Level {
        match self {
            DebugSeverity::Info => log::Level::Info,
            DebugSeverity::Warning => log::Level::Warn,
            DebugSeverity::Error => log::Level::Error,
        }
    }
}

/// 诊断信息的接收方
pub trait DebugSink: Send + Sync {
    fn on_message(&self, severity: DebugSeverity, text: &str);
}

/// 转换为宿主的 log 记录
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDebugSink;
impl DebugSink for LogDebugSink {
    fn on_message(&self, severity: DebugSeverity, text: &str) {
        log::log!(target: RENDERER_LOG_TARGET, severity.log_level(), "{}", text);
    }
}

/// 按照 severity 分发到 sink
///
/// 无法识别的 severity 不会被丢弃，而是以 Error 级别输出并带上原始数值。
fn dispatch_to(sink: &dyn DebugSink, severity: i32, text: &str) -> BridgeResult<()> {
    match DebugSeverity::from_raw(severity) {
        Ok(severity) => {
            sink.on_message(severity, text);
            Ok(())
        }
        Err(e) => {
            sink.on_message(DebugSeverity::Error, &format!("Unsupported debug severity {}: {}", severity, text));
            Err(e)
        }
    }
}

/// 在回调返回之前复制文本
///
/// `length < 0` 时把 `text` 当作以 0 结尾的 C 字符串。
///
/// # Safety
/// `text` 为空，或者在调用期间指向至少 `length` 个可读字节（`length < 0` 时为合法的 C 字符串）
pub unsafe fn copy_callback_text(text: *const c_char, length: i32) -> String {
    if text.is_null() || length == 0 {
        return String::new();
    }
    if length < 0 {
        return unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    }
    let bytes = unsafe { std::slice::from_raw_parts(text.cast::<u8>(), length as usize) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// 一个 sink 以及对应的分发逻辑
#[derive(Clone)]
pub struct DebugBridge {
    sink: Arc<dyn DebugSink>,
}
impl DebugBridge {
    pub fn new(sink: Arc<dyn DebugSink>) -> Self {
        Self { sink }
    }

    #[inline]
    pub fn dispatch(&self, severity: i32, text: &str) -> BridgeResult<()> {
        dispatch_to(self.sink.as_ref(), severity, text)
    }

    /// # Safety
    /// 同 [`copy_callback_text`]
    pub unsafe fn dispatch_raw(&self, text: *const c_char, severity: i32, length: i32) -> BridgeResult<()> {
        let owned = unsafe { copy_callback_text(text, length) };
        self.dispatch(severity, &owned)
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_DEBUG_BRIDGE: RwLock<Option<DebugBridge>> = RwLock::new(None);
}

/// 进程级别的 debug bridge
pub struct GlobalDebugBridge;
impl GlobalDebugBridge {
    /// 注册进程内唯一的 sink
    pub fn install(sink: Arc<dyn DebugSink>) -> BridgeResult<DebugBridgeGuard> {
        let mut slot = GLOBAL_DEBUG_BRIDGE.write();
        if slot.is_some() {
            return Err(BridgeError::DebugCallbackAlreadyRegistered);
        }
        *slot = Some(DebugBridge::new(sink));
        log::info!("Debug bridge installed.");
        Ok(DebugBridgeGuard { _private: () })
    }

    #[inline]
    pub fn is_installed() -> bool {
        GLOBAL_DEBUG_BRIDGE.read().is_some()
    }

    pub fn dispatch(severity: i32, text: &str) -> BridgeResult<()> {
        let slot = GLOBAL_DEBUG_BRIDGE.read();
        match slot.as_ref() {
            Some(bridge) => bridge.dispatch(severity, text),
            None => dispatch_to(&LogDebugSink, severity, text),
        }
    }

    fn teardown() {
        GLOBAL_DEBUG_BRIDGE.write().take();
    }
}

/// drop 时注销进程级别的 sink
pub struct DebugBridgeGuard {
    _private: (),
}
impl Drop for DebugBridgeGuard {
    fn drop(&mut self) {
        GlobalDebugBridge::teardown();
        log::info!("Debug bridge torn down.");
    }
}

/// 交给渲染器的回调
///
/// # Safety
/// 同 [`copy_callback_text`]
pub unsafe extern "C" fn raw_debug_callback(text: *const c_char, severity: i32, length: i32) {
    let owned = unsafe { copy_callback_text(text, length) };
    // 无法识别的 severity 已经以 Error 级别输出
    let _ = GlobalDebugBridge::dispatch(severity, &owned);
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<(DebugSeverity, String)>>,
    }
    impl DebugSink for RecordingSink {
        fn on_message(&self, severity: DebugSeverity, text: &str) {
            self.records.lock().push((severity, text.to_string()));
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(DebugSeverity::from_raw(0).unwrap(), DebugSeverity::Info);
        assert_eq!(DebugSeverity::from_raw(1).unwrap(), DebugSeverity::Warning);
        assert_eq!(DebugSeverity::from_raw(2).unwrap(), DebugSeverity::Error);
        assert_eq!(DebugSeverity::from_raw(3), Err(BridgeError::UnrecognizedSeverity(3)));
        assert_eq!(DebugSeverity::Error.log_level(), log::Level::Error);
        assert_eq!(DebugSeverity::Warning.as_raw(), 1);
    }

    #[test]
    fn test_text_is_copied_before_return() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = DebugBridge::new(sink.clone());

        let mut buffer = b"out of memory".to_vec();
        let result = unsafe { bridge.dispatch_raw(buffer.as_ptr().cast(), 2, buffer.len() as i32) };
        assert!(result.is_ok());

        // 回调返回之后，渲染器立刻复用并释放缓冲区
        buffer.iter_mut().for_each(|b| *b = b'X');
        drop(buffer);

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], (DebugSeverity::Error, "out of memory".to_string()));
    }

    #[test]
    fn test_length_limits_the_copy() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = DebugBridge::new(sink.clone());

        let buffer = b"warning: trailing garbage";
        unsafe { bridge.dispatch_raw(buffer.as_ptr().cast(), 1, 7) }.unwrap();

        assert_eq!(sink.records.lock()[0], (DebugSeverity::Warning, "warning".to_string()));
    }

    #[test]
    fn test_c_string_without_length() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = DebugBridge::new(sink.clone());

        let text = c"prepared pipeline";
        unsafe { bridge.dispatch_raw(text.as_ptr(), 0, -1) }.unwrap();

        assert_eq!(sink.records.lock()[0], (DebugSeverity::Info, "prepared pipeline".to_string()));
    }

    #[test]
    fn test_unknown_severity_is_reported_as_error() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = DebugBridge::new(sink.clone());

        let result = bridge.dispatch(7, "device lost");
        assert_eq!(result, Err(BridgeError::UnrecognizedSeverity(7)));

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, DebugSeverity::Error);
        assert!(records[0].1.contains('7'));
        assert!(records[0].1.contains("device lost"));
    }

    #[test]
    fn test_null_text_is_empty() {
        let text = unsafe { copy_callback_text(std::ptr::null(), 12) };
        assert!(text.is_empty());
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use rtbridge_render_interface::debug_bridge::{GlobalDebugBridge, LogDebugSink, RENDERER_LOG_TARGET, raw_debug_callback};
use rtbridge_render_interface::error::BridgeError;

lazy_static::lazy_static! {
    static ref CAPTURED: Mutex<Vec<(log::Level, String, String)>> = Mutex::new(Vec::new());
}

/// 记录所有日志，供断言使用
struct CaptureLogger;
impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED.lock().push((record.level(), record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn renderer_records() -> Vec<(log::Level, String)> {
    CAPTURED
        .lock()
        .iter()
        .filter(|(_, target, _)| target == RENDERER_LOG_TARGET)
        .map(|(level, _, text)| (*level, text.clone()))
        .collect()
}

// 进程级别的状态只在这一个测试中使用
#[test]
fn test_global_debug_bridge_lifecycle() {
    log::set_boxed_logger(Box::new(CaptureLogger)).unwrap();
    log::set_max_level(log::LevelFilter::Trace);

    // 1. 注册之后，第二次注册被拒绝
    let guard = GlobalDebugBridge::install(Arc::new(LogDebugSink)).unwrap();
    assert!(GlobalDebugBridge::is_installed());
    assert!(matches!(
        GlobalDebugBridge::install(Arc::new(LogDebugSink)),
        Err(BridgeError::DebugCallbackAlreadyRegistered)
    ));

    // 2. severity = 2 的消息变成一条 error 记录，回调返回后缓冲区被改写
    let mut buffer = b"out of memory".to_vec();
    unsafe { raw_debug_callback(buffer.as_ptr().cast(), 2, buffer.len() as i32) };
    buffer.fill(0);
    drop(buffer);

    let records = renderer_records();
    assert_eq!(records, vec![(log::Level::Error, "out of memory".to_string())]);

    // 3. 无法识别的 severity 以 error 级别输出，并带上原始值
    let text = b"strange";
    unsafe { raw_debug_callback(text.as_ptr().cast(), 42, text.len() as i32) };
    let records = renderer_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].0, log::Level::Error);
    assert!(records[1].1.contains("42"));
    assert!(records[1].1.contains("strange"));

    // 4. 注销之后可以重新注册
    drop(guard);
    assert!(!GlobalDebugBridge::is_installed());
    let guard = GlobalDebugBridge::install(Arc::new(LogDebugSink)).unwrap();
    drop(guard);

    // 5. 没有注册 sink 时，仍然会输出到宿主日志
    let text = b"fallback";
    unsafe { raw_debug_callback(text.as_ptr().cast(), 1, text.len() as i32) };
    let records = renderer_records();
    assert_eq!(records.last().unwrap(), &(log::Level::Warn, "fallback".to_string()));
}

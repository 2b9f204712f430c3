use std::sync::Arc;

use rtbridge_crate_tools::init_log::init_log_with_filter;
use rtbridge_render_interface::debug_bridge::LogDebugSink;
use rtbridge_renderer::bridge::RayTracingBridge;
use rtbridge_renderer::headless::{HeadlessBackend, HeadlessStats};
use rtbridge_renderer::settings::BridgeSettings;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// 读取配置并初始化日志
///
/// 第一个命令行参数可以指定一个 toml 配置文件。
pub fn init_env() -> anyhow::Result<BridgeSettings> {
    std::panic::set_hook(Box::new(panic_handler));

    let settings = match std::env::args().nth(1) {
        Some(path) => BridgeSettings::load(&path)?,
        None => BridgeSettings::default(),
    };
    init_log_with_filter(&settings.log_filter);
    Ok(settings)
}

/// 在渲染线程上运行无 GPU 渲染器，渲染器的诊断信息写入日志
pub fn spawn_headless_bridge(settings: BridgeSettings) -> anyhow::Result<(RayTracingBridge, Arc<HeadlessStats>)> {
    let backend = HeadlessBackend::new(settings.headless);
    let stats = backend.stats();
    let bridge = RayTracingBridge::spawn(Box::new(backend), settings)?;
    bridge.register_debug_sink(Arc::new(LogDebugSink))?;
    Ok((bridge, stats))
}

/// 一个三角形：位置、法线、uv、索引
pub fn triangle() -> ([f32; 9], [f32; 9], [f32; 6], [i32; 3]) {
    (
        [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        [0, 1, 2],
    )
}

use std::path::Path;
use std::time::Duration;

use rtbridge_render_interface::error::{BridgeError, BridgeResult};

/// 桥接层默认配置
pub struct DefaultBridgeSettings;
impl DefaultBridgeSettings {
    pub const RENDER_THREAD_NAME: &'static str = "RenderThread";
    /// 0 表示不限制队列长度
    pub const COMMAND_QUEUE_CAPACITY: usize = 0;
    pub const FLUSH_TIMEOUT_MS: u64 = 5_000;
    pub const LOG_FILTER: &'static str = "info";
    pub const MEMORY_BUDGET_BYTES: u64 = 256 * 1024 * 1024;
    pub const MAX_TLAS_INSTANCES: u32 = 1 << 24;
}

/// 无 GPU 渲染器的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct HeadlessSettings {
    /// 加速结构可以使用的内存，超出时构建失败
    pub memory_budget_bytes: u64,
    pub max_tlas_instances: u32,
}
impl Default for HeadlessSettings {
    fn default() -> Self {
        Self {
            memory_budget_bytes: DefaultBridgeSettings::MEMORY_BUDGET_BYTES,
            max_tlas_instances: DefaultBridgeSettings::MAX_TLAS_INSTANCES,
        }
    }
}

/// 桥接层配置，可以从 toml 加载，缺失的字段使用默认值
///
/// ```toml
/// render_thread_name = "RayTracer"
/// command_queue_capacity = 1024
/// flush_timeout_ms = 2000
/// log_filter = "info,rtbridge::renderer=debug"
///
/// [headless]
/// memory_budget_bytes = 67108864
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub render_thread_name: String,
    pub command_queue_capacity: usize,
    pub flush_timeout_ms: u64,
    pub log_filter: String,
    pub headless: HeadlessSettings,
}
impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            render_thread_name: DefaultBridgeSettings::RENDER_THREAD_NAME.to_string(),
            command_queue_capacity: DefaultBridgeSettings::COMMAND_QUEUE_CAPACITY,
            flush_timeout_ms: DefaultBridgeSettings::FLUSH_TIMEOUT_MS,
            log_filter: DefaultBridgeSettings::LOG_FILTER.to_string(),
            headless: HeadlessSettings::default(),
        }
    }
}
// new & init
impl BridgeSettings {
    pub fn from_toml_str(text: &str) -> BridgeResult<Self> {
        toml::from_str(text).map_err(|e| BridgeError::Settings(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Settings(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}
// getter
impl BridgeSettings {
    #[inline]
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_keys_use_defaults() {
        let settings = BridgeSettings::from_toml_str("flush_timeout_ms = 250").unwrap();
        assert_eq!(settings.flush_timeout(), Duration::from_millis(250));
        assert_eq!(settings.render_thread_name, "RenderThread");
        assert_eq!(settings.headless, HeadlessSettings::default());
    }

    #[test]
    fn test_nested_headless_table() {
        let text = r#"
            render_thread_name = "RayTracer"
            command_queue_capacity = 64

            [headless]
            memory_budget_bytes = 4096
        "#;
        let settings = BridgeSettings::from_toml_str(text).unwrap();
        assert_eq!(settings.render_thread_name, "RayTracer");
        assert_eq!(settings.command_queue_capacity, 64);
        assert_eq!(settings.headless.memory_budget_bytes, 4096);
        assert_eq!(settings.headless.max_tlas_instances, DefaultBridgeSettings::MAX_TLAS_INSTANCES);
    }

    #[test]
    fn test_bad_toml_is_a_settings_error() {
        let result = BridgeSettings::from_toml_str("flush_timeout_ms = \"soon\"");
        assert!(matches!(result, Err(BridgeError::Settings(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_filter = \"warn\"").unwrap();

        let settings = BridgeSettings::load(file.path()).unwrap();
        assert_eq!(settings.log_filter, "warn");

        let missing = BridgeSettings::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(BridgeError::Settings(_))));
    }
}

use std::io::Write;

use rtbridge_render_interface::debug_bridge::RENDERER_LOG_TARGET;

/// 使用默认的过滤级别（info）初始化日志
pub fn init_log() {
    init_log_with_filter("info");
}

/// 初始化日志
///
/// `filter` 使用 env_logger 的语法，例如 `"info"` 或 `"warn,rtbridge::renderer=debug"`。
///
/// 重复调用不会 panic，后续的调用会被忽略（测试中经常出现多次初始化）。
pub fn init_log_with_filter(filter: &str) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let black_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));
            let renderer_style = info_style.fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Magenta)));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S");
            let level = record.level();

            // 来自渲染器的诊断信息没有有意义的 file:line，改为显示来源
            if record.target() == RENDERER_LOG_TARGET {
                return writeln!(
                    buf,
                    "{level_style}[{time}] {level}{level_style:#} {renderer_style}[renderer]{renderer_style:#} \
                     {black_style}{}{black_style:#}",
                    record.args()
                );
            }

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {black_style}{}{black_style:#}",
                record.args()
            )
        })
        .parse_filters(filter)
        .try_init();

    if let Err(e) = result {
        log::debug!("logger already initialized: {}", e);
    }
}

//! 日志初始化.
//!
//! 库 crate 通过 `log` 门面输出, 这里在应用侧安装 `tracing` 订阅器:
//! 控制台层 (带颜色) 与可选的按天滚动文件层. `WEBMUX_LOG` 环境变量
//! 优先于配置中的级别.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod retention;

/// 覆盖日志级别的环境变量
pub const LOG_ENV: &str = "WEBMUX_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志目录, `None` 时不写文件
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            file_prefix: default_prefix(),
            console: true,
            retention_days: default_retention_days(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_prefix() -> String {
    "webmux".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    30
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 构造过滤器: 环境变量优先, 其次为配置级别
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

/// 安装全局日志订阅器, 进程内只能成功一次
pub fn init(config: LoggingConfig) -> Result<()> {
    let console_layer = config.console.then(|| {
        fmt::Layer::default()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .event_format(ConsoleFormatter)
            .with_filter(build_filter(&config.level))
    });

    let file_layer = match &config.directory {
        Some(directory) => {
            let directory = Path::new(directory);
            std::fs::create_dir_all(directory)
                .with_context(|| format!("创建日志目录失败, path={}", directory.display()))?;
            retention::cleanup_logs_now(directory, &config.file_prefix, config.retention_days)?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(directory)
                .context("创建滚动日志文件失败")?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();

            Some(
                fmt::Layer::default()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(FileFormatter)
                    .with_filter(build_filter(&config.level)),
            )
        }
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("日志系统已初始化")?;

    if let Some(directory) = &config.directory {
        let today = Local::now().date_naive();
        let path = retention::build_log_path(Path::new(directory), &config.file_prefix, today);
        tracing::info!("日志文件: {}", path.display());
    }
    Ok(())
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(writer, "{}{:5}\x1b[0m {} > ", color, meta.level().as_str(), meta.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{} {:5}] {} > ",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.level().as_str(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

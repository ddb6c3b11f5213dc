//! 历史日志清理.
//!
//! 日志文件按 `<prefix>.<YYYY-MM-DD>.log` 命名, 超过保留天数的文件在初始化时删除.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// 构造某一天的日志文件路径
pub(crate) fn build_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 删除早于 `today - retention_days` 的日志, 返回删除的文件数
pub(crate) fn cleanup_logs(
    directory: &Path,
    prefix: &str,
    retention_days: i64,
    today: NaiveDate,
) -> Result<usize> {
    if !directory.exists() {
        return Ok(0);
    }
    let cutoff = today - ChronoDuration::days(retention_days);

    let mut removed = 0;
    let entries = fs::read_dir(directory)
        .with_context(|| format!("读取日志目录失败, path={}", directory.display()))?;
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = parse_log_name(&file_name, prefix) else {
            continue;
        };
        if date < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// 以当前日期清理
pub(crate) fn cleanup_logs_now(directory: &Path, prefix: &str, retention_days: i64) -> Result<usize> {
    cleanup_logs(directory, prefix, retention_days, Local::now().date_naive())
}

fn parse_log_name(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date_part = file_name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if date_part.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

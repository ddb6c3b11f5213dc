//! 时间码换算.
//!
//! Matroska 中的时间戳都是 TimecodeScale (纳秒) 的整数倍.
//! 帧在提交时携带纳秒时间戳, 写出前换算为时间码.

use std::fmt;

/// 默认 TimecodeScale: 1ms (1_000_000 纳秒)
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// DateUTC 的纪元 (2001-01-01T00:00:00Z) 相对 Unix 纪元的秒数
pub const MATROSKA_EPOCH_UNIX_SECS: i64 = 978_307_200;

/// 纳秒转时间码 (向下取整)
///
/// `scale` 为 0 时按默认刻度换算.
pub const fn ns_to_timecode(ns: u64, scale: u64) -> u64 {
    let scale = if scale == 0 { DEFAULT_TIMECODE_SCALE } else { scale };
    ns / scale
}

/// 时间码转纳秒 (溢出时饱和)
pub const fn timecode_to_ns(timecode: u64, scale: u64) -> u64 {
    let scale = if scale == 0 { DEFAULT_TIMECODE_SCALE } else { scale };
    timecode.saturating_mul(scale)
}

/// DateUTC 取值转换为 Unix 纳秒时间戳
pub const fn date_utc_to_unix_ns(date_utc: i64) -> i64 {
    date_utc + MATROSKA_EPOCH_UNIX_SECS * 1_000_000_000
}

/// 带刻度的时间码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    /// 时间码值
    pub value: u64,
    /// 刻度 (纳秒/单位)
    pub scale: u64,
}

impl Timecode {
    /// 转换为纳秒
    pub const fn to_ns(&self) -> u64 {
        timecode_to_ns(self.value, self.scale)
    }

    /// 转换为秒
    pub fn to_seconds(&self) -> f64 {
        self.to_ns() as f64 / 1_000_000_000.0
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.to_seconds())
    }
}

//! 统一错误类型定义.
//!
//! 容器引擎内部统一使用 `WebmResult`, 到了 C ABI 边界再折叠为
//! 布尔值/空句柄, 或者通过 [`WebmError::status`] 折叠为有符号状态码.

use thiserror::Error;

/// 成功状态码
pub const STATUS_OK: i32 = 0;
/// 文件格式无效
pub const STATUS_FILE_FORMAT_INVALID: i32 = -1;
/// 数据尚未全部可用
pub const STATUS_BUFFER_NOT_FULL: i32 = -2;
/// 读写失败
pub const STATUS_IO_FAILED: i32 = -3;
/// 参数或调用顺序错误
pub const STATUS_INVALID_ARGUMENT: i32 = -4;

/// webmux 统一错误类型
#[derive(Debug, Error)]
pub enum WebmError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 在错误的生命周期状态下调用
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// 编解码器取值不在封闭词表内
    #[error("未知编解码器: {kind} 取值 {value}")]
    UnknownCodec {
        /// "video" 或 "audio"
        kind: &'static str,
        /// 宿主传入的原始值
        value: u32,
    },

    /// 轨道号不属于当前 Segment
    #[error("未找到轨道: {0}")]
    TrackNotFound(u64),

    /// 宿主读取回调失败
    #[error("读取失败: 位置 {position}, 长度 {len}")]
    ReadFailed {
        /// 绝对读取位置
        position: u64,
        /// 请求的字节数
        len: usize,
    },

    /// 宿主写入回调失败
    #[error("写入失败: {0} 字节")]
    WriteFailed(usize),

    /// 宿主定位回调失败
    #[error("定位失败: 位置 {0}")]
    SeekFailed(u64),

    /// 写入端没有提供定位能力
    #[error("写入端不支持定位")]
    NotSeekable,

    /// 宿主返回了负的写入位置
    #[error("无效的写入位置: {0}")]
    InvalidPosition(i64),

    /// 宿主无法报告数据源长度
    #[error("无法获取数据源长度")]
    LengthUnavailable,

    /// 数据尚未全部到达
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 不支持的特性
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达数据末尾
    #[error("已到达流末尾")]
    Eof,
}

impl WebmError {
    /// 折叠为容器引擎约定的有符号状态码 (成功为 0, 失败为负数)
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidData(_) | Self::Unsupported(_) | Self::Eof => STATUS_FILE_FORMAT_INVALID,
            Self::NeedMoreData => STATUS_BUFFER_NOT_FULL,
            Self::ReadFailed { .. }
            | Self::WriteFailed(_)
            | Self::SeekFailed(_)
            | Self::NotSeekable
            | Self::InvalidPosition(_)
            | Self::LengthUnavailable
            | Self::Io(_) => STATUS_IO_FAILED,
            Self::InvalidArgument(_)
            | Self::InvalidState(_)
            | Self::UnknownCodec { .. }
            | Self::TrackNotFound(_) => STATUS_INVALID_ARGUMENT,
        }
    }
}

/// webmux 统一 Result 类型
pub type WebmResult<T> = Result<T, WebmError>;

/// 将结果折叠为状态码
pub fn status_of<T>(result: &WebmResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status(),
    }
}

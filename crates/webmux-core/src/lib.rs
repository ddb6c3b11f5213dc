//! # webmux-core
//!
//! webmux 核心库, 提供基础类型定义、错误处理和时间码工具.
//!
//! 容器引擎 (`webmux-format`) 与 C ABI 层 (`webmux-ffi`) 共用本 crate 的类型.

pub mod block;
pub mod codec;
pub mod color;
pub mod error;
pub mod timecode;

// 重导出常用类型
pub use block::BlockFlags;
pub use codec::{AudioCodec, TrackType, VideoCodec};
pub use color::{ColorRange, Colour};
pub use error::{WebmError, WebmResult};
pub use timecode::{DEFAULT_TIMECODE_SCALE, Timecode};

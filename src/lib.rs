//! # webmux
//!
//! 纯 Rust 实现的 WebM 封装/解析适配层.
//!
//! webmux 让宿主程序以"函数 + 上下文"的方式驱动 WebM 容器引擎:
//! - **读写适配**: 把宿主回调或 `std::io` 对象适配为引擎的读写能力
//! - **封装**: Segment / 轨道 / 帧的生命周期, 逐帧生成 WebM 流
//! - **解析**: 读取 Segment 头部、轨道与帧, 支持数据逐步到达
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use webmux::core::{AudioCodec, VideoCodec};
//! use webmux::format::{MemoryBuffer, Segment};
//!
//! let mut buf = MemoryBuffer::new();
//! let mut segment = Segment::new();
//! segment.init(&mut buf)?;
//! let video = segment.add_video_track(640, 480, 0, VideoCodec::Vp9)?;
//! let audio = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus)?;
//! segment.add_frame(video, &[0u8; 128], 0, true)?;
//! segment.add_frame(audio, &[0u8; 32], 0, true)?;
//! segment.finalize(None)?;
//! # Ok::<(), webmux::core::WebmError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `webmux-core` | 错误, 编解码器词表, 色彩与时间码 |
//! | `webmux-format` | 读写能力契约与适配器, EBML, Segment 封装与解析 |
//! | `webmux-ffi` | C ABI 导出层 |

pub mod logging;

/// 核心类型与工具
pub use webmux_core as core;

/// 容器引擎
pub use webmux_format as format;

/// 获取 webmux 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

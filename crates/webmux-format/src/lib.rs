//! # webmux-format
//!
//! webmux 容器引擎, 负责 WebM (Matroska 子集) 的封装与解析.
//!
//! - [`io`]: 读写能力契约及原生/回调适配器
//! - [`ebml`]: EBML 元素编解码
//! - [`mux`]: Segment 封装器
//! - [`parse`]: Segment 解析器

pub mod ebml;
pub mod io;
pub mod mux;
pub mod parse;

// 重导出常用类型
pub use io::{
    CallbackReader, CallbackWriter, IoReader, IoWriter, MemoryBuffer, MkvReader, MkvWriter,
    ReaderLength, StreamWriter,
};
pub use mux::{CuePoint, Segment, SegmentInfo, SegmentOptions, SegmentState, TrackNumber};
pub use parse::{Frame, TrackInfo, WebmReader};

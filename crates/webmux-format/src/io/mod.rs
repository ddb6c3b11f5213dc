//! I/O 能力抽象层.
//!
//! 容器引擎只通过两个能力契约访问字节:
//! - [`MkvReader`]: 随机访问的字节源, 供 Segment 解析器使用
//! - [`MkvWriter`]: 可选定位的字节汇, 供 Segment 封装器使用
//!
//! 每个契约有两类实现:
//! - 原生实现: [`IoReader`] / [`IoWriter`] 包装 `std::io` 对象, [`MemoryBuffer`] 用于内存处理
//! - 回调实现: [`CallbackReader`] / [`CallbackWriter`] 把宿主提供的函数与上下文组合起来

mod callback;
mod memory;
mod native;

pub use callback::{
    CallbackReader, CallbackWriter, ElementStartNotifyFn, GetPositionFn, LengthFn, ReadFn,
    SetPositionFn, WriteFn,
};
pub use memory::MemoryBuffer;
pub use native::{IoReader, IoWriter, StreamWriter};

use webmux_core::WebmResult;

/// 数据源长度信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderLength {
    /// 数据源总大小, `None` 表示未知 (如直播流)
    pub total: Option<u64>,
    /// 当前无需阻塞即可读取的字节数
    pub available: u64,
}

impl ReaderLength {
    /// 完全可用的数据源
    pub const fn complete(size: u64) -> Self {
        Self {
            total: Some(size),
            available: size,
        }
    }

    /// 数据是否已全部到达
    pub fn is_complete(&self) -> bool {
        self.total == Some(self.available)
    }
}

/// 随机访问字节源
///
/// 解析器按绝对位置读取, 不依赖任何内部游标.
pub trait MkvReader {
    /// 从绝对位置 `position` 读取恰好 `buf.len()` 个字节
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()>;

    /// 报告总大小与当前可用大小
    ///
    /// 解析器据此判断向后读取是否安全.
    fn length(&mut self) -> WebmResult<ReaderLength>;
}

/// 字节汇
///
/// 封装器按顺序写入; 只有 [`MkvWriter::seekable`] 为真时才会回填
/// Duration、SeekHead 与 Segment 大小.
pub trait MkvWriter {
    /// 写入一段连续字节, 部分写入必须报告为失败
    fn write(&mut self, buf: &[u8]) -> WebmResult<()>;

    /// 当前写入位置
    fn position(&mut self) -> WebmResult<u64>;

    /// 定位到绝对位置
    fn set_position(&mut self, position: u64) -> WebmResult<()>;

    /// 是否支持定位
    fn seekable(&self) -> bool;

    /// 开始写入一个结构性元素时的通知, 默认忽略
    fn element_start_notify(&mut self, _element_id: u64, _position: i64) {}
}

impl<T: MkvReader + ?Sized> MkvReader for &mut T {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()> {
        (**self).read(position, buf)
    }

    fn length(&mut self) -> WebmResult<ReaderLength> {
        (**self).length()
    }
}

impl<T: MkvReader + ?Sized> MkvReader for Box<T> {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()> {
        (**self).read(position, buf)
    }

    fn length(&mut self) -> WebmResult<ReaderLength> {
        (**self).length()
    }
}

impl<T: MkvWriter + ?Sized> MkvWriter for &mut T {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        (**self).write(buf)
    }

    fn position(&mut self) -> WebmResult<u64> {
        (**self).position()
    }

    fn set_position(&mut self, position: u64) -> WebmResult<()> {
        (**self).set_position(position)
    }

    fn seekable(&self) -> bool {
        (**self).seekable()
    }

    fn element_start_notify(&mut self, element_id: u64, position: i64) {
        (**self).element_start_notify(element_id, position)
    }
}

impl<T: MkvWriter + ?Sized> MkvWriter for Box<T> {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        (**self).write(buf)
    }

    fn position(&mut self) -> WebmResult<u64> {
        (**self).position()
    }

    fn set_position(&mut self, position: u64) -> WebmResult<()> {
        (**self).set_position(position)
    }

    fn seekable(&self) -> bool {
        (**self).seekable()
    }

    fn element_start_notify(&mut self, element_id: u64, position: i64) {
        (**self).element_start_notify(element_id, position)
    }
}

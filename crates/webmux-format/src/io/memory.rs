//! 内存缓冲区.
//!
//! 同时实现 [`MkvReader`] 与 [`MkvWriter`], 用于测试和内存中封装/解析.

use webmux_core::{WebmError, WebmResult};

use super::{MkvReader, MkvWriter, ReaderLength};

/// 内存缓冲区
///
/// 写入语义与文件一致: 游标在末尾时追加, 否则覆盖已有数据.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 写入游标
    pos: usize,
    /// 模拟尚未到达的数据: 仅前 `available` 字节可读
    available: Option<u64>,
}

impl MemoryBuffer {
    /// 创建空缓冲区 (用于写入)
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有数据创建 (用于读取)
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            available: None,
        }
    }

    /// 限制可读字节数, 模拟渐进到达的数据源
    pub fn set_available(&mut self, available: Option<u64>) {
        self.available = available;
    }

    /// 获取内部数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 消耗自身, 返回内部数据
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn readable_len(&self) -> u64 {
        let len = self.data.len() as u64;
        self.available.map_or(len, |a| a.min(len))
    }
}

impl MkvReader for MemoryBuffer {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()> {
        let end = position
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.readable_len())
            .ok_or(WebmError::ReadFailed {
                position,
                len: buf.len(),
            })?;
        buf.copy_from_slice(&self.data[position as usize..end as usize]);
        Ok(())
    }

    fn length(&mut self) -> WebmResult<ReaderLength> {
        Ok(ReaderLength {
            total: Some(self.data.len() as u64),
            available: self.readable_len(),
        })
    }
}

impl MkvWriter for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        // 覆盖已有数据, 超出部分追加
        let overlap = (self.data.len() - self.pos).min(buf.len());
        self.data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len();
        Ok(())
    }

    fn position(&mut self) -> WebmResult<u64> {
        Ok(self.pos as u64)
    }

    fn set_position(&mut self, position: u64) -> WebmResult<()> {
        self.pos = usize::try_from(position).map_err(|_| WebmError::SeekFailed(position))?;
        Ok(())
    }

    fn seekable(&self) -> bool {
        true
    }
}

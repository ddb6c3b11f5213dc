//! EBML 读取工具.
//!
//! 在已读入内存的字节切片上解析元素; 跨越 I/O 的部分由解析器负责.

use byteorder::{BigEndian, ByteOrder};
use webmux_core::{WebmError, WebmResult};

/// 元素头部: ID + 数据大小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// 元素 ID (含前导标记位)
    pub id: u32,
    /// 数据大小, `None` 表示未知大小
    pub size: Option<u64>,
    /// 头部总字节数
    pub header_len: usize,
}

/// 由首字节推算 VINT 长度
pub fn vint_len_from_first(first: u8) -> WebmResult<usize> {
    if first == 0 {
        return Err(WebmError::InvalidData("EBML: 无效的 VINT 首字节".into()));
    }
    Ok(first.leading_zeros() as usize + 1)
}

/// 读取元素 ID, 返回 (ID, 字节数)
pub fn read_id(data: &[u8]) -> WebmResult<(u32, usize)> {
    let first = *data.first().ok_or(WebmError::Eof)?;
    let len = vint_len_from_first(first)?;
    if len > 4 {
        return Err(WebmError::InvalidData("EBML: 元素 ID 超过 4 字节".into()));
    }
    let bytes = data.get(..len).ok_or(WebmError::Eof)?;
    Ok((BigEndian::read_uint(bytes, len) as u32, len))
}

/// 读取数据大小, 返回 (大小, 字节数); 数据位全 1 时大小为 `None`
pub fn read_size(data: &[u8]) -> WebmResult<(Option<u64>, usize)> {
    let first = *data.first().ok_or(WebmError::Eof)?;
    let len = vint_len_from_first(first)?;
    let bytes = data.get(..len).ok_or(WebmError::Eof)?;
    let raw = BigEndian::read_uint(bytes, len);
    // 掩掉前导标记位
    let max_val = (1u64 << (7 * len)) - 1;
    let value = raw & max_val;
    if value == max_val {
        Ok((None, len))
    } else {
        Ok((Some(value), len))
    }
}

/// 读取元素头部
pub fn read_header(data: &[u8]) -> WebmResult<ElementHeader> {
    let (id, id_len) = read_id(data)?;
    let (size, size_len) = read_size(&data[id_len..])?;
    Ok(ElementHeader {
        id,
        size,
        header_len: id_len + size_len,
    })
}

/// 读取无符号整数 (大端, 0-8 字节; 0 字节视为 0)
pub fn read_uint(data: &[u8]) -> WebmResult<u64> {
    match data.len() {
        0 => Ok(0),
        n @ 1..=8 => Ok(BigEndian::read_uint(data, n)),
        n => Err(WebmError::InvalidData(format!("EBML: 无效的 uint 大小: {n}"))),
    }
}

/// 读取有符号整数 (大端, 符号扩展)
pub fn read_sint(data: &[u8]) -> WebmResult<i64> {
    match data.len() {
        0 => Ok(0),
        n @ 1..=8 => Ok(BigEndian::read_int(data, n)),
        n => Err(WebmError::InvalidData(format!("EBML: 无效的 sint 大小: {n}"))),
    }
}

/// 读取浮点数 (0、4 或 8 字节)
pub fn read_float(data: &[u8]) -> WebmResult<f64> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f64::from(BigEndian::read_f32(data))),
        8 => Ok(BigEndian::read_f64(data)),
        n => Err(WebmError::InvalidData(format!(
            "EBML: 无效的浮点数大小: {n}"
        ))),
    }
}

/// 读取 UTF-8 字符串, 去除尾部 NUL
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// 主元素子元素迭代器
///
/// 产出 (ID, 负载切片). 子元素不允许未知大小.
pub struct Elements<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Elements<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = WebmResult<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.offset..];
        let result = read_header(rest).and_then(|header| {
            let size = header.size.ok_or_else(|| {
                WebmError::InvalidData(format!("EBML: 子元素 0x{:X} 大小未知", header.id))
            })?;
            let end = usize::try_from(size)
                .ok()
                .and_then(|s| header.header_len.checked_add(s))
                .filter(|&end| end <= rest.len())
                .ok_or_else(|| {
                    WebmError::InvalidData(format!("EBML: 子元素 0x{:X} 越界", header.id))
                })?;
            Ok((header.id, &rest[header.header_len..end], end))
        });
        match result {
            Ok((id, payload, consumed)) => {
                self.offset += consumed;
                Some(Ok((id, payload)))
            }
            Err(e) => {
                // 出错后停止迭代
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}

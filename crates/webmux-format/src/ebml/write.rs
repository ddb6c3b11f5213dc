//! EBML 写入工具.
//!
//! 所有函数都写入内存缓冲区; 元素先在缓冲区中组装, 再整体交给写入端.

use webmux_core::{WebmError, WebmResult};

use super::ids;

/// 8 字节 "未知大小" VINT
pub const UNKNOWN_SIZE_8: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// 单个 VINT 可表示的最大已知大小 (8 字节, 数据位全 1 保留给未知大小)
pub const MAX_VINT_SIZE: u64 = (1 << 56) - 2;

/// 元素 ID 所占字节数
pub fn id_len(id: u32) -> usize {
    if id <= 0xFF {
        1
    } else if id <= 0xFFFF {
        2
    } else if id <= 0xFF_FFFF {
        3
    } else {
        4
    }
}

/// 写 EBML 元素 ID (保留前导位)
pub fn write_id(buf: &mut Vec<u8>, id: u32) {
    let len = id_len(id);
    buf.extend_from_slice(&id.to_be_bytes()[4 - len..]);
}

/// 编码 `size` 所需的最短 VINT 长度
pub fn vint_len(size: u64) -> usize {
    // 数据位全 1 的取值保留给未知大小, 因此使用严格小于
    let mut len = 1;
    while len < 8 && size >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    len
}

/// 以固定长度写 VINT
///
/// 用于需要事后原位回填的大小字段.
pub fn write_vint_fixed(buf: &mut Vec<u8>, size: u64, len: usize) -> WebmResult<()> {
    if !(1..=8).contains(&len) || vint_len(size) > len {
        return Err(WebmError::InvalidArgument(format!(
            "EBML: 大小 {size} 无法编码为 {len} 字节 VINT"
        )));
    }
    let marker = 1u64 << (7 * len);
    let bytes = (size | marker).to_be_bytes();
    buf.extend_from_slice(&bytes[8 - len..]);
    Ok(())
}

/// 写 EBML 元素大小 (最短 VINT 编码)
pub fn write_size(buf: &mut Vec<u8>, size: u64) {
    let len = vint_len(size);
    let marker = 1u64 << (7 * len);
    buf.extend_from_slice(&(size | marker).to_be_bytes()[8 - len..]);
}

/// uint 的最短字节表示
fn uint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// 写 uint 元素
pub fn write_uint(buf: &mut Vec<u8>, id: u32, value: u64) {
    let len = uint_len(value);
    write_id(buf, id);
    write_size(buf, len as u64);
    buf.extend_from_slice(&value.to_be_bytes()[8 - len..]);
}

/// 写 8 字节有符号整数元素 (DateUTC 等)
pub fn write_i64(buf: &mut Vec<u8>, id: u32, value: i64) {
    write_id(buf, id);
    write_size(buf, 8);
    buf.extend_from_slice(&value.to_be_bytes());
}

/// 写 float64 元素
pub fn write_float(buf: &mut Vec<u8>, id: u32, value: f64) {
    write_id(buf, id);
    write_size(buf, 8);
    buf.extend_from_slice(&value.to_be_bytes());
}

/// 写 string 元素
pub fn write_string(buf: &mut Vec<u8>, id: u32, value: &str) {
    write_binary(buf, id, value.as_bytes());
}

/// 写 binary 元素
pub fn write_binary(buf: &mut Vec<u8>, id: u32, data: &[u8]) {
    write_id(buf, id);
    write_size(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// 写主元素 (ID + 大小 + 已组装好的子元素)
pub fn write_master(buf: &mut Vec<u8>, id: u32, content: &[u8]) {
    write_binary(buf, id, content);
}

/// 写一个总长度恰为 `total_len` 字节的 Void 元素
pub fn write_void(buf: &mut Vec<u8>, total_len: usize) -> WebmResult<()> {
    // ID 占 1 字节, 选取能容纳剩余负载的最短大小字段
    for size_len in 1..=8usize {
        let Some(payload) = total_len.checked_sub(1 + size_len) else {
            break;
        };
        if vint_len(payload as u64) <= size_len {
            write_id(buf, ids::VOID);
            write_vint_fixed(buf, payload as u64, size_len)?;
            buf.resize(buf.len() + payload, 0);
            return Ok(());
        }
    }
    Err(WebmError::InvalidArgument(format!(
        "EBML: 无法构造 {total_len} 字节的 Void"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vint_编码() {
        let cases: [(u64, &[u8]); 5] = [
            (0, &[0x80]),
            (1, &[0x81]),
            (126, &[0xFE]),
            (127, &[0x40, 0x7F]),
            (16_383, &[0x20, 0x3F, 0xFF]),
        ];
        for (size, expected) in cases {
            let mut buf = Vec::new();
            write_size(&mut buf, size);
            assert_eq!(buf, expected, "size={size}");
        }
    }

    #[test]
    fn test_vint_固定长度() {
        let mut buf = Vec::new();
        write_vint_fixed(&mut buf, 5, 8).unwrap();
        assert_eq!(buf, vec![0x01, 0, 0, 0, 0, 0, 0, 5]);
        assert!(write_vint_fixed(&mut Vec::new(), 300, 1).is_err());
    }

    #[test]
    fn test_元素_id() {
        let mut buf = Vec::new();
        write_id(&mut buf, ids::EBML_HEADER);
        write_id(&mut buf, ids::TRACK_NUMBER);
        write_id(&mut buf, ids::LANGUAGE);
        assert_eq!(buf, vec![0x1A, 0x45, 0xDF, 0xA3, 0xD7, 0x22, 0xB5, 0x9C]);
    }

    #[test]
    fn test_uint_最短编码() {
        let mut buf = Vec::new();
        write_uint(&mut buf, ids::TRACK_NUMBER, 0);
        assert_eq!(buf, vec![0xD7, 0x81, 0x00]);

        buf.clear();
        write_uint(&mut buf, ids::TIMECODE_SCALE, 1_000_000);
        assert_eq!(buf, vec![0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]);
    }

    #[test]
    fn test_void_精确长度() {
        for total in [2usize, 9, 128, 129, 200] {
            let mut buf = Vec::new();
            write_void(&mut buf, total).unwrap();
            assert_eq!(buf.len(), total);
            assert_eq!(buf[0], 0xEC);
        }
        assert!(write_void(&mut Vec::new(), 1).is_err());
    }
}

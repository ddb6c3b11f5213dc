//! 宿主读取回调 → [`MkvReader`] 适配, 以及 Segment 解析导出.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_long, c_void};

use log::debug;
use webmux_format::io::CallbackReader;
use webmux_format::parse::{Frame, WebmReader};

use crate::guard;

/// 读取回调: (user_data, 绝对位置, 长度, 目标缓冲区) → 是否读满
pub type ReadFun = unsafe extern "C" fn(*mut c_void, i64, c_long, *mut u8) -> bool;
/// 长度回调: 写出 (总大小, 可用大小), 总大小为负表示未知
pub type LengthFun = unsafe extern "C" fn(*mut c_void, *mut i64, *mut i64) -> bool;

/// 宿主提供的读取回调集合
pub struct ForeignReader {
    user_data: *mut c_void,
    read: ReadFun,
    length: LengthFun,
}

/// 读取端句柄
pub type FfiReader = CallbackReader<ForeignReader>;

fn foreign_read(r: &mut ForeignReader, position: u64, buf: &mut [u8]) -> bool {
    let (Ok(position), Ok(len)) = (i64::try_from(position), c_long::try_from(buf.len())) else {
        return false;
    };
    // 安全: 回调与 user_data 由宿主在创建读取端时提供
    unsafe { (r.read)(r.user_data, position, len, buf.as_mut_ptr()) }
}

fn foreign_length(r: &mut ForeignReader) -> Option<(i64, i64)> {
    let (mut total, mut available) = (-1i64, 0i64);
    unsafe { (r.length)(r.user_data, &mut total, &mut available) }.then_some((total, available))
}

/// 创建读取端
///
/// `read` 与 `length` 必须都提供, 否则返回空指针.
#[unsafe(no_mangle)]
pub extern "C" fn parser_new_reader(
    read: Option<ReadFun>,
    length: Option<LengthFun>,
    user_data: *mut c_void,
) -> *mut FfiReader {
    let (Some(read), Some(length)) = (read, length) else {
        debug!("parser_new_reader: 缺少必需回调");
        return std::ptr::null_mut();
    };
    guard(std::ptr::null_mut(), || {
        let foreign = ForeignReader {
            user_data,
            read,
            length,
        };
        Box::into_raw(Box::new(CallbackReader::new(
            foreign,
            foreign_read,
            foreign_length,
        )))
    })
}

/// 释放读取端
///
/// # Safety
///
/// `reader` 为空或来自 [`parser_new_reader`] 且未被释放.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_delete_reader(reader: *mut FfiReader) {
    if !reader.is_null() {
        drop(unsafe { Box::from_raw(reader) });
    }
}

// ========================
// Segment 解析
// ========================

/// 解析器句柄
pub struct FfiParser {
    reader: WebmReader<&'static mut FfiReader>,
    codec_ids: Vec<CString>,
    frame: Option<Frame>,
}

/// 一帧的描述, 数据通过 [`parser_frame_data`] 获取
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FfiFrameInfo {
    pub track_number: u64,
    pub timestamp_ns: u64,
    pub keyframe: bool,
    pub size: usize,
}

/// 在读取端上解析 Segment 头部
///
/// 失败 (含数据尚未到达) 时返回空指针.
///
/// # Safety
///
/// `reader` 为空或为有效的读取端, 且在解析器释放前不被释放或另作他用.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_open_segment(reader: *mut FfiReader) -> *mut FfiParser {
    if reader.is_null() {
        return std::ptr::null_mut();
    }
    // 安全: 调用方保证读取端比解析器活得久
    let reader: &'static mut FfiReader = unsafe { &mut *reader };
    guard(std::ptr::null_mut(), move || match WebmReader::open(reader) {
        Ok(reader) => {
            let codec_ids = reader
                .tracks()
                .iter()
                .map(|t| CString::new(t.codec_id.as_str()).unwrap_or_default())
                .collect();
            Box::into_raw(Box::new(FfiParser {
                reader,
                codec_ids,
                frame: None,
            }))
        }
        Err(e) => {
            debug!("parser_open_segment 失败: {e}");
            std::ptr::null_mut()
        }
    })
}

/// 释放解析器, 不影响其读取端
///
/// # Safety
///
/// `parser` 为空或来自 [`parser_open_segment`] 且未被释放.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_delete_segment(parser: *mut FfiParser) {
    if !parser.is_null() {
        drop(unsafe { Box::from_raw(parser) });
    }
}

/// 轨道数量
///
/// # Safety
///
/// `parser` 为空或为有效的解析器.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_track_count(parser: *const FfiParser) -> usize {
    unsafe { parser.as_ref() }.map_or(0, |p| p.reader.tracks().len())
}

/// 第 `index` 个轨道的轨道号, 越界时返回 0
///
/// # Safety
///
/// `parser` 为空或为有效的解析器.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_track_number(parser: *const FfiParser, index: usize) -> u64 {
    unsafe { parser.as_ref() }
        .and_then(|p| p.reader.tracks().get(index))
        .map_or(0, |t| t.number)
}

/// 第 `index` 个轨道的 CodecID, 越界时返回空指针
///
/// 字符串归解析器所有.
///
/// # Safety
///
/// `parser` 为空或为有效的解析器.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_track_codec_id(
    parser: *const FfiParser,
    index: usize,
) -> *const c_char {
    unsafe { parser.as_ref() }
        .and_then(|p| p.codec_ids.get(index))
        .map_or(std::ptr::null(), |s| s.as_ptr())
}

/// 读取下一帧
///
/// 返回 1 表示读到一帧并填充 `info`, 0 表示结束, 负数为引擎状态码
/// (-2 表示数据尚未到达, 可稍后重试).
///
/// # Safety
///
/// `parser` 为空或为有效的解析器; `info` 为空或指向可写的 [`FfiFrameInfo`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_read_frame(parser: *mut FfiParser, info: *mut FfiFrameInfo) -> c_int {
    let (Some(parser), Some(info)) = (unsafe { parser.as_mut() }, unsafe { info.as_mut() }) else {
        return webmux_core::error::STATUS_INVALID_ARGUMENT;
    };
    guard(webmux_core::error::STATUS_INVALID_ARGUMENT, || {
        match parser.reader.next_frame() {
            Ok(Some(frame)) => {
                *info = FfiFrameInfo {
                    track_number: frame.track_number,
                    timestamp_ns: frame.timestamp_ns,
                    keyframe: frame.keyframe,
                    size: frame.data.len(),
                };
                parser.frame = Some(frame);
                1
            }
            Ok(None) => {
                parser.frame = None;
                0
            }
            Err(e) => {
                debug!("parser_read_frame 失败: {e}");
                e.status()
            }
        }
    })
}

/// 最近一帧的数据, 在下一次 [`parser_read_frame`] 前有效
///
/// # Safety
///
/// `parser` 为空或为有效的解析器.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn parser_frame_data(parser: *const FfiParser) -> *const u8 {
    unsafe { parser.as_ref() }
        .and_then(|p| p.frame.as_ref())
        .map_or(std::ptr::null(), |f| f.data.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use std::ffi::CStr;
    use webmux_core::{AudioCodec, VideoCodec};
    use webmux_format::{MemoryBuffer, MkvReader, Segment};

    /// 用封装器生成一段 WebM 数据
    fn sample_webm() -> Vec<u8> {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = segment.add_video_track(64, 64, 0, VideoCodec::Vp9).unwrap();
        let a = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).unwrap();
        segment.add_frame(v, &[0xAA; 10], 0, true).unwrap();
        segment.add_frame(a, &[0xBB; 3], 5_000_000, true).unwrap();
        segment.add_frame(v, &[0xCC; 6], 40_000_000, false).unwrap();
        segment.finalize(None).unwrap();
        drop(segment);
        buf.into_data()
    }

    #[test]
    fn test_缺少必需回调返回空() {
        let mut host = HostBuffer::default();
        let ud = host.as_user_data();
        assert!(parser_new_reader(None, Some(host_length), ud).is_null());
        assert!(parser_new_reader(Some(host_read), None, ud).is_null());
    }

    #[test]
    fn test_读取端转发() {
        let mut host = HostBuffer {
            data: vec![1, 2, 3, 4, 5],
            ..HostBuffer::default()
        };
        let reader = parser_new_reader(Some(host_read), Some(host_length), host.as_user_data());
        assert!(!reader.is_null());
        let r = unsafe { &mut *reader };
        let mut buf = [0u8; 2];
        r.read(3, &mut buf).unwrap();
        assert_eq!(buf, [4, 5]);
        assert!(r.read(4, &mut buf).is_err());
        assert!(r.length().unwrap().is_complete());
        unsafe { parser_delete_reader(reader) };
    }

    #[test]
    fn test_解析_segment() {
        let mut host = HostBuffer {
            data: sample_webm(),
            ..HostBuffer::default()
        };
        let reader = parser_new_reader(Some(host_read), Some(host_length), host.as_user_data());
        let parser = unsafe { parser_open_segment(reader) };
        assert!(!parser.is_null());

        unsafe {
            assert_eq!(parser_track_count(parser), 2);
            assert_eq!(parser_track_number(parser, 0), 1);
            assert_eq!(parser_track_number(parser, 9), 0);
            let codec = CStr::from_ptr(parser_track_codec_id(parser, 0));
            assert_eq!(codec.to_str().unwrap(), "V_VP9");
            assert!(parser_track_codec_id(parser, 9).is_null());

            let mut info = FfiFrameInfo::default();
            let mut sizes = Vec::new();
            while parser_read_frame(parser, &mut info) == 1 {
                let data = std::slice::from_raw_parts(parser_frame_data(parser), info.size);
                sizes.push((info.track_number, data.len(), data[0]));
            }
            assert_eq!(sizes, vec![(1, 10, 0xAA), (2, 3, 0xBB), (1, 6, 0xCC)]);
            assert!(parser_frame_data(parser).is_null());

            parser_delete_segment(parser);
            parser_delete_reader(reader);
        }
    }

    #[test]
    fn test_空句柄() {
        unsafe {
            assert!(parser_open_segment(std::ptr::null_mut()).is_null());
            assert_eq!(parser_track_count(std::ptr::null()), 0);
            let mut info = FfiFrameInfo::default();
            assert!(parser_read_frame(std::ptr::null_mut(), &mut info) < 0);
            parser_delete_segment(std::ptr::null_mut());
            parser_delete_reader(std::ptr::null_mut());
        }
    }
}

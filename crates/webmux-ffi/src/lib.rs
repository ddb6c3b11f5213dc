//! # webmux-ffi
//!
//! webmux C FFI 导出层.
//!
//! 宿主以函数指针 + `user_data` 的形式提供 I/O, 本 crate 把它们适配为
//! 容器引擎的读写能力, 并导出 Segment / 轨道 / 帧的生命周期接口.
//!
//! # 命名规范
//!
//! - `parser_*`: 读取端与 Segment 解析
//! - `mux_*`: 写入端、Segment 封装与轨道配置
//! - `webmux_*`: 库信息
//!
//! # 内存管理
//!
//! - 每个 `*_new_*` / `*_open_*` 返回的句柄必须由对应的 `*_delete_*` 释放
//! - 轨道句柄归所属 Segment 所有, 随 `mux_delete_segment` 一起释放
//! - 写入端必须比绑定到它的 Segment 活得久
//!
//! # 失败约定
//!
//! 空句柄一律视为失败 (返回 false / null / 0), 不会被解引用.
//! panic 不会跨越 FFI 边界, 被捕获后同样报告为失败.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};

use log::error;

pub mod reader;
pub mod segment;
pub mod writer;

/// Opus 音频编解码器取值
#[unsafe(no_mangle)]
pub static OPUS_CODEC_ID: u32 = webmux_core::codec::OPUS_CODEC_ID;
/// Vorbis 音频编解码器取值
#[unsafe(no_mangle)]
pub static VORBIS_CODEC_ID: u32 = webmux_core::codec::VORBIS_CODEC_ID;
/// VP8 视频编解码器取值
#[unsafe(no_mangle)]
pub static VP8_CODEC_ID: u32 = webmux_core::codec::VP8_CODEC_ID;
/// VP9 视频编解码器取值
#[unsafe(no_mangle)]
pub static VP9_CODEC_ID: u32 = webmux_core::codec::VP9_CODEC_ID;
/// H.264 视频编解码器取值
#[unsafe(no_mangle)]
pub static H264_CODEC_ID: u32 = webmux_core::codec::H264_CODEC_ID;

/// 获取 webmux 版本号字符串
///
/// 返回的字符串指针为静态分配, 无需释放.
#[unsafe(no_mangle)]
pub extern "C" fn webmux_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

/// 获取 webmux 版本号的数字表示
///
/// 格式: (主版本 << 16) | (次版本 << 8) | 修订版本
#[unsafe(no_mangle)]
pub extern "C" fn webmux_version_int() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0);
    let major = part(env!("CARGO_PKG_VERSION_MAJOR"));
    let minor = part(env!("CARGO_PKG_VERSION_MINOR"));
    let patch = part(env!("CARGO_PKG_VERSION_PATCH"));
    (major << 16) | (minor << 8) | patch
}

/// 执行 FFI 调用体, panic 时记录日志并返回 `fallback`
pub(crate) fn guard<T>(fallback: T, body: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(_) => {
            error!("FFI 调用发生 panic, 按失败处理");
            fallback
        }
    }
}

/// 把 C 字符串借用为 `&str`, 空指针或非 UTF-8 时返回 `None`
///
/// # Safety
///
/// `ptr` 为空或指向以 NUL 结尾且在 `'a` 内有效的字符串.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // 安全: 调用方保证 ptr 指向有效的 C 字符串
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 测试用宿主: 以 `Vec<u8>` 为存储的读写回调

    use std::os::raw::{c_long, c_void};

    /// 宿主侧存储
    #[derive(Default)]
    pub struct HostBuffer {
        pub data: Vec<u8>,
        pub pos: usize,
        pub notified: Vec<u64>,
    }

    /// 测试中输出库日志
    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    impl HostBuffer {
        pub fn as_user_data(&mut self) -> *mut c_void {
            (self as *mut Self).cast()
        }
    }

    unsafe fn host<'a>(user_data: *mut c_void) -> &'a mut HostBuffer {
        unsafe { &mut *user_data.cast::<HostBuffer>() }
    }

    pub unsafe extern "C" fn host_write(user_data: *mut c_void, buf: *const c_void, len: usize) -> bool {
        let host = unsafe { host(user_data) };
        let src = unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), len) };
        let end = host.pos + len;
        if end > host.data.len() {
            host.data.resize(end, 0);
        }
        host.data[host.pos..end].copy_from_slice(src);
        host.pos = end;
        true
    }

    pub unsafe extern "C" fn host_position(user_data: *mut c_void) -> i64 {
        unsafe { host(user_data) }.pos as i64
    }

    pub unsafe extern "C" fn host_set_position(user_data: *mut c_void, pos: u64) -> bool {
        unsafe { host(user_data) }.pos = pos as usize;
        true
    }

    pub unsafe extern "C" fn host_notify(user_data: *mut c_void, id: u64, _pos: i64) {
        unsafe { host(user_data) }.notified.push(id);
    }

    pub unsafe extern "C" fn host_read(
        user_data: *mut c_void,
        pos: i64,
        len: c_long,
        buf: *mut u8,
    ) -> bool {
        let host = unsafe { host(user_data) };
        let start = pos as usize;
        let Some(src) = host.data.get(start..start + len as usize) else {
            return false;
        };
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), buf, src.len()) };
        true
    }

    pub unsafe extern "C" fn host_length(
        user_data: *mut c_void,
        total: *mut i64,
        available: *mut i64,
    ) -> bool {
        let len = unsafe { host(user_data) }.data.len() as i64;
        unsafe {
            *total = len;
            *available = len;
        }
        true
    }
}

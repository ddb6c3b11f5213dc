//! 宿主写入回调 → [`MkvWriter`] 适配.

use std::os::raw::c_void;

use log::debug;
use webmux_format::io::CallbackWriter;

use crate::guard;

/// 写入回调: 只有全部写入才返回 true
pub type WriteFun = unsafe extern "C" fn(*mut c_void, *const c_void, usize) -> bool;
/// 获取当前写入位置
pub type GetPositionFun = unsafe extern "C" fn(*mut c_void) -> i64;
/// 定位到绝对位置
pub type SetPositionFun = unsafe extern "C" fn(*mut c_void, u64) -> bool;
/// 元素开始通知: (user_data, 元素 ID, 绝对位置)
pub type ElementStartNotifyFun = unsafe extern "C" fn(*mut c_void, u64, i64);

/// 宿主提供的写入回调集合
pub struct ForeignWriter {
    user_data: *mut c_void,
    write: WriteFun,
    get_position: GetPositionFun,
    set_position: Option<SetPositionFun>,
    element_start_notify: Option<ElementStartNotifyFun>,
}

/// 写入端句柄
pub type FfiWriter = CallbackWriter<ForeignWriter>;

fn foreign_write(w: &mut ForeignWriter, buf: &[u8]) -> bool {
    // 安全: 回调与 user_data 由宿主在创建写入端时提供
    unsafe { (w.write)(w.user_data, buf.as_ptr().cast(), buf.len()) }
}

fn foreign_position(w: &mut ForeignWriter) -> i64 {
    unsafe { (w.get_position)(w.user_data) }
}

fn foreign_set_position(w: &mut ForeignWriter, position: u64) -> bool {
    match w.set_position {
        Some(set_position) => unsafe { set_position(w.user_data, position) },
        None => false,
    }
}

fn foreign_notify(w: &mut ForeignWriter, element_id: u64, position: i64) {
    if let Some(notify) = w.element_start_notify {
        unsafe { notify(w.user_data, element_id, position) }
    }
}

/// 创建写入端
///
/// `write` 与 `get_position` 必须提供, 否则返回空指针.
/// 只有提供了 `set_position` 的写入端才被视为可定位.
#[unsafe(no_mangle)]
pub extern "C" fn mux_new_writer(
    write: Option<WriteFun>,
    get_position: Option<GetPositionFun>,
    set_position: Option<SetPositionFun>,
    element_start_notify: Option<ElementStartNotifyFun>,
    user_data: *mut c_void,
) -> *mut FfiWriter {
    let (Some(write), Some(get_position)) = (write, get_position) else {
        debug!("mux_new_writer: 缺少必需回调");
        return std::ptr::null_mut();
    };
    guard(std::ptr::null_mut(), || {
        let foreign = ForeignWriter {
            user_data,
            write,
            get_position,
            set_position,
            element_start_notify,
        };
        let mut writer = CallbackWriter::new(foreign, foreign_write, foreign_position);
        if set_position.is_some() {
            writer = writer.with_set_position(foreign_set_position);
        }
        if element_start_notify.is_some() {
            writer = writer.with_element_start_notify(foreign_notify);
        }
        Box::into_raw(Box::new(writer))
    })
}

/// 释放写入端
///
/// # Safety
///
/// `writer` 为空或来自 [`mux_new_writer`] 且未被释放;
/// 绑定到它的 Segment 此后不能再写入.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_delete_writer(writer: *mut FfiWriter) {
    if !writer.is_null() {
        drop(unsafe { Box::from_raw(writer) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use webmux_format::MkvWriter;

    #[test]
    fn test_缺少必需回调返回空() {
        let mut host = HostBuffer::default();
        let ud = host.as_user_data();
        assert!(mux_new_writer(None, Some(host_position), None, None, ud).is_null());
        assert!(mux_new_writer(Some(host_write), None, None, None, ud).is_null());
    }

    #[test]
    fn test_可定位取决于_set_position() {
        let mut host = HostBuffer::default();
        let ud = host.as_user_data();

        let plain = mux_new_writer(Some(host_write), Some(host_position), None, None, ud);
        assert!(!plain.is_null());
        assert!(!unsafe { &*plain }.seekable());

        let seekable = mux_new_writer(
            Some(host_write),
            Some(host_position),
            Some(host_set_position),
            Some(host_notify),
            ud,
        );
        let w = unsafe { &mut *seekable };
        assert!(w.seekable());
        w.write(&[1, 2, 3, 4]).unwrap();
        w.set_position(1).unwrap();
        w.write(&[9]).unwrap();
        assert_eq!(w.position().unwrap(), 2);
        w.element_start_notify(0xEC, 0);

        unsafe {
            mux_delete_writer(plain);
            mux_delete_writer(seekable);
            mux_delete_writer(std::ptr::null_mut());
        }
        assert_eq!(host.data, vec![1, 9, 3, 4]);
        assert_eq!(host.notified, vec![0xEC]);
    }
}

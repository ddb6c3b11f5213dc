//! 回调驱动的读写适配器.
//!
//! 宿主以函数 + 上下文的形式提供 I/O 能力. 上下文类型 `C` 由宿主决定,
//! 可以是拥有的状态, 也可以是 `&mut` 借用; 适配器只负责把调用原样转发.
//!
//! 必需的回调是构造参数, 因此"缺少必需回调"在类型层面不可表示;
//! 可选回调通过 `with_*` 方法追加.

use std::fmt;

use log::debug;
use webmux_core::{WebmError, WebmResult};

use super::{MkvReader, MkvWriter, ReaderLength};

/// 读取回调: (上下文, 绝对位置, 目标缓冲区) → 是否读满
pub type ReadFn<C> = fn(&mut C, u64, &mut [u8]) -> bool;
/// 长度回调: 返回 (总大小, 可用大小), 总大小为负表示未知; 无法回答时返回 `None`
pub type LengthFn<C> = fn(&mut C) -> Option<(i64, i64)>;
/// 写入回调: 只有全部接受才返回 `true`
pub type WriteFn<C> = fn(&mut C, &[u8]) -> bool;
/// 获取写入位置回调
pub type GetPositionFn<C> = fn(&mut C) -> i64;
/// 定位回调
pub type SetPositionFn<C> = fn(&mut C, u64) -> bool;
/// 元素开始通知回调: (上下文, 元素 ID, 绝对位置)
pub type ElementStartNotifyFn<C> = fn(&mut C, u64, i64);

/// 回调驱动的字节源
pub struct CallbackReader<C> {
    read: ReadFn<C>,
    length: LengthFn<C>,
    context: C,
}

impl<C> CallbackReader<C> {
    /// 由上下文与两个必需回调构造
    pub fn new(context: C, read: ReadFn<C>, length: LengthFn<C>) -> Self {
        Self {
            read,
            length,
            context,
        }
    }

    /// 获取上下文引用
    pub fn context(&self) -> &C {
        &self.context
    }

    /// 获取上下文可变引用
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// 消耗自身, 归还上下文
    pub fn into_context(self) -> C {
        self.context
    }
}

impl<C> MkvReader for CallbackReader<C> {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()> {
        if (self.read)(&mut self.context, position, buf) {
            Ok(())
        } else {
            debug!("读取回调失败: 位置 {position}, 长度 {}", buf.len());
            Err(WebmError::ReadFailed {
                position,
                len: buf.len(),
            })
        }
    }

    fn length(&mut self) -> WebmResult<ReaderLength> {
        let (total, available) =
            (self.length)(&mut self.context).ok_or(WebmError::LengthUnavailable)?;
        if available < 0 {
            return Err(WebmError::LengthUnavailable);
        }
        Ok(ReaderLength {
            total: u64::try_from(total).ok(),
            available: available as u64,
        })
    }
}

impl<C> fmt::Debug for CallbackReader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackReader").finish_non_exhaustive()
    }
}

/// 回调驱动的字节汇
pub struct CallbackWriter<C> {
    write: WriteFn<C>,
    get_position: GetPositionFn<C>,
    set_position: Option<SetPositionFn<C>>,
    element_start_notify: Option<ElementStartNotifyFn<C>>,
    context: C,
}

impl<C> CallbackWriter<C> {
    /// 由上下文与两个必需回调构造, 默认不可定位
    pub fn new(context: C, write: WriteFn<C>, get_position: GetPositionFn<C>) -> Self {
        Self {
            write,
            get_position,
            set_position: None,
            element_start_notify: None,
            context,
        }
    }

    /// 追加定位能力
    pub fn with_set_position(mut self, set_position: SetPositionFn<C>) -> Self {
        self.set_position = Some(set_position);
        self
    }

    /// 追加元素开始通知
    pub fn with_element_start_notify(mut self, notify: ElementStartNotifyFn<C>) -> Self {
        self.element_start_notify = Some(notify);
        self
    }

    /// 获取上下文引用
    pub fn context(&self) -> &C {
        &self.context
    }

    /// 获取上下文可变引用
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// 消耗自身, 归还上下文
    pub fn into_context(self) -> C {
        self.context
    }
}

impl<C> MkvWriter for CallbackWriter<C> {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        if (self.write)(&mut self.context, buf) {
            Ok(())
        } else {
            debug!("写入回调失败: {} 字节", buf.len());
            Err(WebmError::WriteFailed(buf.len()))
        }
    }

    fn position(&mut self) -> WebmResult<u64> {
        let pos = (self.get_position)(&mut self.context);
        u64::try_from(pos).map_err(|_| WebmError::InvalidPosition(pos))
    }

    fn set_position(&mut self, position: u64) -> WebmResult<()> {
        let Some(set_position) = self.set_position else {
            return Err(WebmError::NotSeekable);
        };
        if set_position(&mut self.context, position) {
            Ok(())
        } else {
            Err(WebmError::SeekFailed(position))
        }
    }

    fn seekable(&self) -> bool {
        self.set_position.is_some()
    }

    fn element_start_notify(&mut self, element_id: u64, position: i64) {
        if let Some(notify) = self.element_start_notify {
            notify(&mut self.context, element_id, position);
        }
    }
}

impl<C> fmt::Debug for CallbackWriter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackWriter")
            .field("seekable", &self.set_position.is_some())
            .field("notify", &self.element_start_notify.is_some())
            .finish_non_exhaustive()
    }
}

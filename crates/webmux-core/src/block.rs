//! SimpleBlock 标志位.

use bitflags::bitflags;

bitflags! {
    /// SimpleBlock 头部的标志字节
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u8 {
        /// 关键帧
        const KEYFRAME = 0x80;
        /// 不可见帧
        const INVISIBLE = 0x08;
        /// Xiph 分包
        const LACING_XIPH = 0x02;
        /// EBML 分包
        const LACING_EBML = 0x06;
        /// 固定长度分包
        const LACING_FIXED = 0x04;
        /// 可丢弃帧
        const DISCARDABLE = 0x01;
    }
}

impl BlockFlags {
    /// 分包方式所占的位
    pub const LACING_MASK: u8 = 0x06;

    /// 仅由关键帧标记构造
    pub fn from_keyframe(keyframe: bool) -> Self {
        if keyframe { Self::KEYFRAME } else { Self::empty() }
    }

    /// 是否为关键帧
    pub fn is_keyframe(self) -> bool {
        self.contains(Self::KEYFRAME)
    }

    /// 是否使用了分包
    pub fn is_laced(self) -> bool {
        self.bits() & Self::LACING_MASK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_关键帧标志() {
        assert_eq!(BlockFlags::from_keyframe(true).bits(), 0x80);
        assert!(BlockFlags::from_bits_retain(0x81).is_keyframe());
        assert!(!BlockFlags::from_keyframe(false).is_keyframe());
    }

    #[test]
    fn test_分包检测() {
        assert!(!BlockFlags::from_bits_retain(0x80).is_laced());
        assert!(BlockFlags::from_bits_retain(0x82).is_laced());
        assert!(BlockFlags::from_bits_retain(0x06).is_laced());
    }
}

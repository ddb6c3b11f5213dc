//! 视频轨道色彩描述.
//!
//! 对应 Matroska `Video/Colour` 元素的一个子集.

/// 色彩范围
///
/// 取值与 Matroska `Range` 元素一致:
/// - Broadcast: Y 16-235, Cb/Cr 16-240 (8 位)
/// - Full: Y/Cb/Cr 0-255 (8 位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    /// 未指定
    #[default]
    Unspecified,
    /// 有限范围 (广播/TV)
    Broadcast,
    /// 完整范围 (JPEG/PC)
    Full,
    /// 由矩阵系数和传递特性推导
    Derived,
}

impl ColorRange {
    /// Matroska `Range` 元素取值
    pub const fn as_raw(self) -> u64 {
        match self {
            Self::Unspecified => 0,
            Self::Broadcast => 1,
            Self::Full => 2,
            Self::Derived => 3,
        }
    }

    /// 从 Matroska `Range` 元素取值解析, 未知值视为未指定
    pub const fn from_raw(value: u64) -> Self {
        match value {
            1 => Self::Broadcast,
            2 => Self::Full,
            3 => Self::Derived,
            _ => Self::Unspecified,
        }
    }

    /// 宿主只区分完整范围与广播范围
    pub const fn from_full_range(full_range: bool) -> Self {
        if full_range { Self::Full } else { Self::Broadcast }
    }
}

/// 色彩描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Colour {
    /// 每通道位深 (0 表示未指定)
    pub bits_per_channel: u64,
    /// 水平色度下采样: 每个色度样本在水平方向上额外跨过的亮度样本数
    pub chroma_subsampling_horz: u64,
    /// 垂直色度下采样
    pub chroma_subsampling_vert: u64,
    /// 色彩范围
    pub range: ColorRange,
    /// 矩阵系数 (ISO/IEC 23001-8 取值), `None` 表示不写出
    pub matrix_coefficients: Option<u64>,
}

impl Colour {
    /// 按宿主的四元参数构造
    pub fn new(bits_per_channel: u64, horz: u64, vert: u64, full_range: bool) -> Self {
        Self {
            bits_per_channel,
            chroma_subsampling_horz: horz,
            chroma_subsampling_vert: vert,
            range: ColorRange::from_full_range(full_range),
            matrix_coefficients: None,
        }
    }

    /// 设置矩阵系数
    pub fn with_matrix_coefficients(mut self, matrix_coefficients: u64) -> Self {
        self.matrix_coefficients = Some(matrix_coefficients);
        self
    }
}

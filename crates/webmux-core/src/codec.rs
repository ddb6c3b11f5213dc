//! 编解码器词表.
//!
//! 宿主通过小整数选择编解码器, 这些取值是 ABI 的一部分, 不能调整.
//! 词表是封闭的: 不在表内的取值在创建轨道时就被拒绝, 否则会生成
//! 结构合法但无法播放的容器.

use std::fmt;

use crate::error::WebmError;

/// Opus 音频
pub const OPUS_CODEC_ID: u32 = 0;
/// Vorbis 音频
pub const VORBIS_CODEC_ID: u32 = 1;

/// VP8 视频
pub const VP8_CODEC_ID: u32 = 0;
/// VP9 视频
pub const VP9_CODEC_ID: u32 = 1;
/// H.264 视频
pub const H264_CODEC_ID: u32 = 2;

/// Matroska 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// 视频轨道 (TrackType = 1)
    Video,
    /// 音频轨道 (TrackType = 2)
    Audio,
}

impl TrackType {
    /// Matroska TrackType 元素取值
    pub const fn as_raw(self) -> u64 {
        match self {
            Self::Video => 1,
            Self::Audio => 2,
        }
    }

    /// 从 Matroska TrackType 元素取值解析
    pub const fn from_raw(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Video),
            2 => Some(Self::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "视频",
            Self::Audio => "音频",
        };
        write!(f, "{name}")
    }
}

/// 视频编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VideoCodec {
    /// VP8
    Vp8 = VP8_CODEC_ID,
    /// VP9
    Vp9 = VP9_CODEC_ID,
    /// H.264 / AVC
    H264 = H264_CODEC_ID,
}

impl VideoCodec {
    /// 从宿主传入的原始取值解析, 不在词表内返回 `None`
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            VP8_CODEC_ID => Some(Self::Vp8),
            VP9_CODEC_ID => Some(Self::Vp9),
            H264_CODEC_ID => Some(Self::H264),
            _ => None,
        }
    }

    /// 原始取值
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// 写入 CodecID 元素的字符串
    pub const fn codec_id(self) -> &'static str {
        match self {
            Self::Vp8 => "V_VP8",
            Self::Vp9 => "V_VP9",
            Self::H264 => "V_MPEG4/ISO/AVC",
        }
    }

    /// 从 CodecID 字符串反查
    pub fn from_codec_id(codec_id: &str) -> Option<Self> {
        match codec_id {
            "V_VP8" => Some(Self::Vp8),
            "V_VP9" => Some(Self::Vp9),
            "V_MPEG4/ISO/AVC" => Some(Self::H264),
            _ => None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::H264 => "h264",
        };
        write!(f, "{name}")
    }
}

/// 音频编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AudioCodec {
    /// Opus
    Opus = OPUS_CODEC_ID,
    /// Vorbis
    Vorbis = VORBIS_CODEC_ID,
}

impl AudioCodec {
    /// 从宿主传入的原始取值解析, 不在词表内返回 `None`
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            OPUS_CODEC_ID => Some(Self::Opus),
            VORBIS_CODEC_ID => Some(Self::Vorbis),
            _ => None,
        }
    }

    /// 原始取值
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// 写入 CodecID 元素的字符串
    pub const fn codec_id(self) -> &'static str {
        match self {
            Self::Opus => "A_OPUS",
            Self::Vorbis => "A_VORBIS",
        }
    }

    /// 从 CodecID 字符串反查
    pub fn from_codec_id(codec_id: &str) -> Option<Self> {
        match codec_id {
            "A_OPUS" => Some(Self::Opus),
            "A_VORBIS" => Some(Self::Vorbis),
            _ => None,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
        };
        write!(f, "{name}")
    }
}

impl TryFrom<u32> for VideoCodec {
    type Error = WebmError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or(WebmError::UnknownCodec {
            kind: "video",
            value,
        })
    }
}

impl TryFrom<u32> for AudioCodec {
    type Error = WebmError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or(WebmError::UnknownCodec {
            kind: "audio",
            value,
        })
    }
}

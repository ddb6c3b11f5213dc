//! 轨道描述与 TrackEntry 构建.

use std::fmt;
use std::num::NonZeroU64;

use webmux_core::{AudioCodec, Colour, TrackType, VideoCodec};

use crate::ebml::{ids, write};

/// 轨道号
///
/// 0 保留为"创建失败"哨兵, 因此类型上不可为 0.
/// SimpleBlock 以 1 字节 VINT 编码轨道号, 取值范围 1..=126.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackNumber(NonZeroU64);

impl TrackNumber {
    /// 可编码的最大轨道号
    pub const MAX: u64 = 126;

    /// 校验并构造, 0 或超出范围时返回 `None`
    pub fn new(number: u64) -> Option<Self> {
        if number > Self::MAX {
            return None;
        }
        NonZeroU64::new(number).map(Self)
    }

    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TrackNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// TrackUID 的上限 (56 位)
pub const MAX_TRACK_UID: u64 = (1 << 56) - 1;

/// 随机生成非零的 56 位 TrackUID
fn generate_uid() -> u64 {
    fastrand::u64(1..=MAX_TRACK_UID)
}

/// 视频轨道参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub colour: Option<Colour>,
}

/// 音频轨道参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u32,
    /// 位深, `None` 表示不写出
    pub bit_depth: Option<u32>,
}

/// 轨道类型相关参数
#[derive(Debug, Clone, PartialEq)]
pub enum TrackKind {
    Video(VideoSettings),
    Audio(AudioSettings),
}

/// 封装中的轨道
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub number: TrackNumber,
    pub uid: u64,
    pub kind: TrackKind,
    pub codec_private: Option<Vec<u8>>,
    pub name: Option<String>,
    pub language: Option<String>,
    /// 每帧时长 (纳秒)
    pub default_duration: Option<u64>,
    /// 编码延迟 (纳秒), Opus 常用
    pub codec_delay: Option<u64>,
    /// 定位后需要预解码的时长 (纳秒)
    pub seek_pre_roll: Option<u64>,
}

impl Track {
    pub(crate) fn new(number: TrackNumber, kind: TrackKind) -> Self {
        Self {
            number,
            uid: generate_uid(),
            kind,
            codec_private: None,
            name: None,
            language: None,
            default_duration: None,
            codec_delay: None,
            seek_pre_roll: None,
        }
    }

    pub fn track_type(&self) -> TrackType {
        match self.kind {
            TrackKind::Video(_) => TrackType::Video,
            TrackKind::Audio(_) => TrackType::Audio,
        }
    }

    /// Matroska CodecID 字符串
    pub fn codec_id(&self) -> &'static str {
        match &self.kind {
            TrackKind::Video(v) => v.codec.codec_id(),
            TrackKind::Audio(a) => a.codec.codec_id(),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video(_))
    }

    pub fn video(&self) -> Option<&VideoSettings> {
        match &self.kind {
            TrackKind::Video(v) => Some(v),
            TrackKind::Audio(_) => None,
        }
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoSettings> {
        match &mut self.kind {
            TrackKind::Video(v) => Some(v),
            TrackKind::Audio(_) => None,
        }
    }

    pub fn audio_mut(&mut self) -> Option<&mut AudioSettings> {
        match &mut self.kind {
            TrackKind::Audio(a) => Some(a),
            TrackKind::Video(_) => None,
        }
    }

    /// 构建 TrackEntry 元素
    pub(crate) fn write_entry(&self, buf: &mut Vec<u8>) {
        let mut content = Vec::new();
        write::write_uint(&mut content, ids::TRACK_NUMBER, self.number.get());
        write::write_uint(&mut content, ids::TRACK_UID, self.uid);
        write::write_uint(&mut content, ids::TRACK_TYPE, self.track_type().as_raw());
        write::write_string(&mut content, ids::CODEC_ID, self.codec_id());
        if let Some(private) = &self.codec_private {
            write::write_binary(&mut content, ids::CODEC_PRIVATE, private);
        }
        if let Some(name) = &self.name {
            write::write_string(&mut content, ids::NAME, name);
        }
        if let Some(language) = &self.language {
            write::write_string(&mut content, ids::LANGUAGE, language);
        }
        if let Some(duration) = self.default_duration {
            write::write_uint(&mut content, ids::DEFAULT_DURATION, duration);
        }
        if let Some(delay) = self.codec_delay {
            write::write_uint(&mut content, ids::CODEC_DELAY, delay);
        }
        if let Some(pre_roll) = self.seek_pre_roll {
            write::write_uint(&mut content, ids::SEEK_PRE_ROLL, pre_roll);
        }

        match &self.kind {
            TrackKind::Video(v) => {
                let mut video = Vec::new();
                write::write_uint(&mut video, ids::PIXEL_WIDTH, u64::from(v.width));
                write::write_uint(&mut video, ids::PIXEL_HEIGHT, u64::from(v.height));
                if let Some(colour) = &v.colour {
                    write_colour(&mut video, colour);
                }
                write::write_master(&mut content, ids::VIDEO, &video);
            }
            TrackKind::Audio(a) => {
                let mut audio = Vec::new();
                write::write_float(&mut audio, ids::SAMPLING_FREQUENCY, f64::from(a.sample_rate));
                write::write_uint(&mut audio, ids::CHANNELS, u64::from(a.channels));
                if let Some(depth) = a.bit_depth {
                    write::write_uint(&mut audio, ids::BIT_DEPTH, u64::from(depth));
                }
                write::write_master(&mut content, ids::AUDIO, &audio);
            }
        }

        write::write_master(buf, ids::TRACK_ENTRY, &content);
    }
}

fn write_colour(buf: &mut Vec<u8>, colour: &Colour) {
    let mut content = Vec::new();
    if let Some(matrix) = colour.matrix_coefficients {
        write::write_uint(&mut content, ids::MATRIX_COEFFICIENTS, matrix);
    }
    write::write_uint(&mut content, ids::BITS_PER_CHANNEL, colour.bits_per_channel);
    write::write_uint(
        &mut content,
        ids::CHROMA_SUBSAMPLING_HORZ,
        colour.chroma_subsampling_horz,
    );
    write::write_uint(
        &mut content,
        ids::CHROMA_SUBSAMPLING_VERT,
        colour.chroma_subsampling_vert,
    );
    write::write_uint(&mut content, ids::RANGE, colour.range.as_raw());
    write::write_master(buf, ids::COLOUR, &content);
}

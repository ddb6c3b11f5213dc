//! 解析得到的轨道信息.

use webmux_core::{AudioCodec, ColorRange, Colour, TrackType, VideoCodec, WebmError, WebmResult};

use crate::ebml::ids;
use crate::ebml::read::{Elements, read_float, read_string, read_uint};

/// 视频参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
    pub colour: Option<Colour>,
}

/// 音频参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: f64,
    pub channels: u32,
    pub bit_depth: Option<u32>,
}

impl Default for AudioInfo {
    /// Matroska 规定的缺省值
    fn default() -> Self {
        Self {
            sample_rate: 8000.0,
            channels: 1,
            bit_depth: None,
        }
    }
}

/// 解析得到的轨道
///
/// 与封装端的 `Track` 不同, 这里不限制编解码器词表, 未知的 CodecID 原样保留.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub number: u64,
    pub uid: u64,
    pub track_type: Option<TrackType>,
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub default_duration: Option<u64>,
    pub codec_delay: Option<u64>,
    pub seek_pre_roll: Option<u64>,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
}

impl TrackInfo {
    /// CodecID 属于视频词表时返回对应编解码器
    pub fn video_codec(&self) -> Option<VideoCodec> {
        VideoCodec::from_codec_id(&self.codec_id)
    }

    /// CodecID 属于音频词表时返回对应编解码器
    pub fn audio_codec(&self) -> Option<AudioCodec> {
        AudioCodec::from_codec_id(&self.codec_id)
    }
}

/// 解析单个 TrackEntry 负载
pub(crate) fn parse_track_entry(data: &[u8]) -> WebmResult<TrackInfo> {
    let mut track = TrackInfo::default();
    for child in Elements::new(data) {
        let (id, payload) = child?;
        match id {
            ids::TRACK_NUMBER => track.number = read_uint(payload)?,
            ids::TRACK_UID => track.uid = read_uint(payload)?,
            ids::TRACK_TYPE => track.track_type = TrackType::from_raw(read_uint(payload)?),
            ids::CODEC_ID => track.codec_id = read_string(payload),
            ids::CODEC_PRIVATE => track.codec_private = Some(payload.to_vec()),
            ids::NAME => track.name = Some(read_string(payload)),
            ids::LANGUAGE => track.language = Some(read_string(payload)),
            ids::DEFAULT_DURATION => track.default_duration = Some(read_uint(payload)?),
            ids::CODEC_DELAY => track.codec_delay = Some(read_uint(payload)?),
            ids::SEEK_PRE_ROLL => track.seek_pre_roll = Some(read_uint(payload)?),
            ids::VIDEO => track.video = Some(parse_video(payload)?),
            ids::AUDIO => track.audio = Some(parse_audio(payload)?),
            _ => {}
        }
    }
    if track.number == 0 {
        return Err(WebmError::InvalidData("TrackEntry 缺少有效的轨道号".into()));
    }
    Ok(track)
}

fn parse_video(data: &[u8]) -> WebmResult<VideoInfo> {
    let mut video = VideoInfo::default();
    for child in Elements::new(data) {
        let (id, payload) = child?;
        match id {
            ids::PIXEL_WIDTH => video.width = read_uint(payload)? as u32,
            ids::PIXEL_HEIGHT => video.height = read_uint(payload)? as u32,
            ids::DISPLAY_WIDTH => video.display_width = Some(read_uint(payload)? as u32),
            ids::DISPLAY_HEIGHT => video.display_height = Some(read_uint(payload)? as u32),
            ids::COLOUR => video.colour = Some(parse_colour(payload)?),
            _ => {}
        }
    }
    Ok(video)
}

fn parse_colour(data: &[u8]) -> WebmResult<Colour> {
    let mut colour = Colour::default();
    for child in Elements::new(data) {
        let (id, payload) = child?;
        match id {
            ids::MATRIX_COEFFICIENTS => colour.matrix_coefficients = Some(read_uint(payload)?),
            ids::BITS_PER_CHANNEL => colour.bits_per_channel = read_uint(payload)?,
            ids::CHROMA_SUBSAMPLING_HORZ => colour.chroma_subsampling_horz = read_uint(payload)?,
            ids::CHROMA_SUBSAMPLING_VERT => colour.chroma_subsampling_vert = read_uint(payload)?,
            ids::RANGE => colour.range = ColorRange::from_raw(read_uint(payload)?),
            _ => {}
        }
    }
    Ok(colour)
}

fn parse_audio(data: &[u8]) -> WebmResult<AudioInfo> {
    let mut audio = AudioInfo::default();
    for child in Elements::new(data) {
        let (id, payload) = child?;
        match id {
            ids::SAMPLING_FREQUENCY => audio.sample_rate = read_float(payload)?,
            ids::CHANNELS => audio.channels = read_uint(payload)? as u32,
            ids::BIT_DEPTH => audio.bit_depth = Some(read_uint(payload)? as u32),
            _ => {}
        }
    }
    Ok(audio)
}

//! WebM Segment 封装器.
//!
//! 逐帧组装一个 WebM 容器, 通过借用的 [`MkvWriter`] 输出.
//!
//! # 输出结构
//! ```text
//! EBML Header (DocType: "webm")
//! Segment (8 字节大小, 完成时回填)
//! ├── Void (为 SeekHead 预留, 仅可定位写入端)
//! ├── Info (TimecodeScale, Duration 回填)
//! ├── Tracks (每个轨道一个 TrackEntry)
//! ├── Cluster... (SimpleBlock 数据)
//! └── Cues (仅可定位写入端)
//! ```
//!
//! 写入流程:
//! 1. `init()` - 绑定写入端
//! 2. `add_*_track()` / `set_*()` - 配置轨道与元数据
//! 3. `add_frame()` - 首帧触发头部写出, 之后按 Cluster 缓冲
//! 4. `finalize()` - 刷新 Cluster, 写 Cues, 回填 Duration/SeekHead/Segment 大小

mod cluster;
mod track;

pub use cluster::CuePoint;
pub use track::{AudioSettings, Track, TrackKind, TrackNumber, VideoSettings};

use log::{debug, warn};
use webmux_core::timecode::{ns_to_timecode, timecode_to_ns};
use webmux_core::{
    AudioCodec, BlockFlags, Colour, DEFAULT_TIMECODE_SCALE, VideoCodec, WebmError, WebmResult,
};

use crate::ebml::{ids, write};
use crate::io::MkvWriter;
use cluster::ClusterBuilder;

/// 默认的 MuxingApp / WritingApp
pub const DEFAULT_APP: &str = concat!("webmux-", env!("CARGO_PKG_VERSION"));

/// 为 SeekHead 预留的字节数
const SEEK_HEAD_RESERVED: usize = 128;

/// Segment 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// 已创建, 尚未绑定写入端
    Created,
    /// 已绑定写入端, 可配置与写入帧
    Building,
    /// 已完成 (终态)
    Finalized,
    /// 写入头部或 Cluster 时写入端报错 (终态), 输出不完整
    Failed,
}

/// Segment 级元数据
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// 时间码刻度 (纳秒/单位)
    pub timecode_scale: u64,
    /// 总时长 (时间码单位), `None` 时完成阶段按最后一帧推算
    pub duration: Option<f64>,
    /// 创建时间 (相对 2001-01-01 的纳秒数)
    pub date_utc: Option<i64>,
    pub title: Option<String>,
    pub muxing_app: String,
    pub writing_app: String,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            date_utc: None,
            title: None,
            muxing_app: DEFAULT_APP.to_string(),
            writing_app: DEFAULT_APP.to_string(),
        }
    }
}

/// 封装选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// 可定位写入端是否在结尾写出 Cues
    pub output_cues: bool,
    /// 单个 Cluster 的最大时长 (纳秒), `None` 表示只按关键帧切分
    pub max_cluster_duration_ns: Option<u64>,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            output_cues: true,
            max_cluster_duration_ns: None,
        }
    }
}

/// 头部写出后记录的回填位置
#[derive(Debug, Clone, Copy)]
struct Layout {
    /// Segment 大小字段的绝对位置
    segment_size_pos: u64,
    /// Segment 数据起点的绝对位置
    data_start: u64,
    /// 预留 SeekHead 的绝对位置
    seek_head_pos: Option<u64>,
    /// Duration 浮点数据的绝对位置
    duration_pos: Option<u64>,
    /// Info 相对 Segment 数据起点的偏移
    info_pos: u64,
    /// Tracks 相对 Segment 数据起点的偏移
    tracks_pos: u64,
}

/// WebM Segment 封装器
///
/// 写入端以借用方式绑定, 生命周期 `'w` 保证写入端比 Segment 活得久.
/// 销毁前必须显式调用 [`Segment::finalize`], 析构不会补写结尾结构.
pub struct Segment<'w> {
    writer: Option<&'w mut dyn MkvWriter>,
    state: SegmentState,
    options: SegmentOptions,
    info: SegmentInfo,
    tracks: Vec<Track>,
    layout: Option<Layout>,
    cluster: Option<ClusterBuilder>,
    cues: Vec<CuePoint>,
    /// 已写入帧的最大时间码
    max_timecode: u64,
    frames_written: u64,
    clusters_written: u64,
}

impl Default for Segment<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'w> Segment<'w> {
    /// 创建空 Segment
    pub fn new() -> Self {
        Self::with_options(SegmentOptions::default())
    }

    /// 以指定选项创建
    pub fn with_options(options: SegmentOptions) -> Self {
        Self {
            writer: None,
            state: SegmentState::Created,
            options,
            info: SegmentInfo::default(),
            tracks: Vec::new(),
            layout: None,
            cluster: None,
            cues: Vec::new(),
            max_timecode: 0,
            frames_written: 0,
            clusters_written: 0,
        }
    }

    /// 绑定写入端, 只能调用一次
    pub fn init(&mut self, writer: &'w mut dyn MkvWriter) -> WebmResult<()> {
        if self.state != SegmentState::Created {
            return Err(WebmError::InvalidState(format!(
                "Segment 只能初始化一次, 当前状态 {:?}",
                self.state
            )));
        }
        debug!("WebM: Segment 绑定写入端, 可定位={}", writer.seekable());
        self.writer = Some(writer);
        self.state = SegmentState::Building;
        Ok(())
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn options(&self) -> &SegmentOptions {
        &self.options
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, number: TrackNumber) -> Option<&Track> {
        self.tracks.iter().find(|t| t.number == number)
    }

    /// 已写入的帧数
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// 已写出的索引点
    pub fn cue_points(&self) -> &[CuePoint] {
        &self.cues
    }

    // ========================
    // Segment 元数据
    // ========================

    /// 设置总时长 (时间码单位)
    ///
    /// 头部写出后仍可修改, 完成时回填.
    pub fn set_duration(&mut self, duration: f64) {
        if self.reject_info_update("duration", true) {
            return;
        }
        self.info.duration = Some(duration);
    }

    pub fn set_muxing_app(&mut self, app: impl Into<String>) {
        if self.reject_info_update("muxing_app", false) {
            return;
        }
        self.info.muxing_app = app.into();
    }

    pub fn set_writing_app(&mut self, app: impl Into<String>) {
        if self.reject_info_update("writing_app", false) {
            return;
        }
        self.info.writing_app = app.into();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        if self.reject_info_update("title", false) {
            return;
        }
        self.info.title = Some(title.into());
    }

    /// 设置时间码刻度 (纳秒/单位), 0 被忽略
    pub fn set_timecode_scale(&mut self, scale: u64) {
        if scale == 0 {
            warn!("WebM: 忽略为 0 的 TimecodeScale");
            return;
        }
        if self.reject_info_update("timecode_scale", false) {
            return;
        }
        self.info.timecode_scale = scale;
    }

    /// 设置创建时间 (相对 2001-01-01 的纳秒数)
    pub fn set_date_utc(&mut self, date_utc: i64) {
        if self.reject_info_update("date_utc", false) {
            return;
        }
        self.info.date_utc = Some(date_utc);
    }

    /// 元数据设置是否应被忽略
    fn reject_info_update(&self, field: &str, patchable: bool) -> bool {
        if matches!(self.state, SegmentState::Finalized | SegmentState::Failed) {
            warn!("WebM: Segment 已结束, 忽略 {field} 设置");
            return true;
        }
        if self.layout.is_some() && !patchable {
            warn!("WebM: 头部已写出, 忽略 {field} 设置");
            return true;
        }
        false
    }

    // ========================
    // 轨道
    // ========================

    /// 添加视频轨道
    ///
    /// `desired_number` 为 0 时自动分配轨道号.
    pub fn add_video_track(
        &mut self,
        width: u32,
        height: u32,
        desired_number: u64,
        codec: VideoCodec,
    ) -> WebmResult<TrackNumber> {
        self.add_track(
            desired_number,
            TrackKind::Video(VideoSettings {
                codec,
                width,
                height,
                colour: None,
            }),
        )
    }

    /// 添加音频轨道
    ///
    /// `desired_number` 为 0 时自动分配轨道号.
    pub fn add_audio_track(
        &mut self,
        sample_rate: u32,
        channels: u32,
        desired_number: u64,
        codec: AudioCodec,
    ) -> WebmResult<TrackNumber> {
        self.add_track(
            desired_number,
            TrackKind::Audio(AudioSettings {
                codec,
                sample_rate,
                channels,
                bit_depth: None,
            }),
        )
    }

    fn add_track(&mut self, desired_number: u64, kind: TrackKind) -> WebmResult<TrackNumber> {
        self.ensure_building("添加轨道")?;
        if self.layout.is_some() {
            return Err(WebmError::InvalidState(
                "头部已写出, 不能再添加轨道".into(),
            ));
        }
        let number = self.assign_number(desired_number)?;
        let track = Track::new(number, kind);
        debug!(
            "WebM: 添加轨道 #{number}, 类型 {}, 编解码器 {}",
            track.track_type(),
            track.codec_id()
        );
        self.tracks.push(track);
        Ok(number)
    }

    fn assign_number(&self, desired: u64) -> WebmResult<TrackNumber> {
        if desired == 0 {
            return (1..=TrackNumber::MAX)
                .filter_map(TrackNumber::new)
                .find(|&n| self.track(n).is_none())
                .ok_or_else(|| WebmError::InvalidState("轨道号已用尽".into()));
        }
        let number = TrackNumber::new(desired).ok_or_else(|| {
            WebmError::InvalidArgument(format!(
                "轨道号 {desired} 超出范围 1..={}",
                TrackNumber::MAX
            ))
        })?;
        if self.track(number).is_some() {
            return Err(WebmError::InvalidArgument(format!(
                "轨道号 {desired} 已被占用"
            )));
        }
        Ok(number)
    }

    /// 取得可修改的轨道; 头部写出后轨道参数冻结
    fn track_for_update(&mut self, number: TrackNumber) -> WebmResult<&mut Track> {
        self.ensure_building("修改轨道")?;
        if self.layout.is_some() {
            return Err(WebmError::InvalidState(
                "头部已写出, 轨道参数不可再修改".into(),
            ));
        }
        self.tracks
            .iter_mut()
            .find(|t| t.number == number)
            .ok_or(WebmError::TrackNotFound(number.get()))
    }

    fn video_for_update(&mut self, number: TrackNumber) -> WebmResult<&mut VideoSettings> {
        self.track_for_update(number)?
            .video_mut()
            .ok_or_else(|| WebmError::InvalidArgument(format!("轨道 #{number} 不是视频轨道")))
    }

    /// 设置视频轨道色彩描述
    pub fn set_colour(&mut self, number: TrackNumber, colour: Colour) -> WebmResult<()> {
        self.video_for_update(number)?.colour = Some(colour);
        Ok(())
    }

    /// 设置视频轨道色彩矩阵系数, 没有色彩描述时创建一个
    pub fn set_colour_matrix_coefficients(
        &mut self,
        number: TrackNumber,
        matrix_coefficients: u64,
    ) -> WebmResult<()> {
        let video = self.video_for_update(number)?;
        video
            .colour
            .get_or_insert_with(Colour::default)
            .matrix_coefficients = Some(matrix_coefficients);
        Ok(())
    }

    /// 设置编解码器私有数据 (如 Opus 头部)
    pub fn set_codec_private(&mut self, number: TrackNumber, data: &[u8]) -> WebmResult<()> {
        self.track_for_update(number)?.codec_private = Some(data.to_vec());
        Ok(())
    }

    pub fn set_track_name(&mut self, number: TrackNumber, name: impl Into<String>) -> WebmResult<()> {
        self.track_for_update(number)?.name = Some(name.into());
        Ok(())
    }

    pub fn set_track_language(
        &mut self,
        number: TrackNumber,
        language: impl Into<String>,
    ) -> WebmResult<()> {
        self.track_for_update(number)?.language = Some(language.into());
        Ok(())
    }

    /// 设置每帧时长 (纳秒)
    pub fn set_default_duration(&mut self, number: TrackNumber, duration_ns: u64) -> WebmResult<()> {
        self.track_for_update(number)?.default_duration = Some(duration_ns);
        Ok(())
    }

    /// 设置编码延迟 (纳秒)
    pub fn set_codec_delay(&mut self, number: TrackNumber, delay_ns: u64) -> WebmResult<()> {
        self.track_for_update(number)?.codec_delay = Some(delay_ns);
        Ok(())
    }

    /// 设置定位预解码时长 (纳秒)
    pub fn set_seek_pre_roll(&mut self, number: TrackNumber, pre_roll_ns: u64) -> WebmResult<()> {
        self.track_for_update(number)?.seek_pre_roll = Some(pre_roll_ns);
        Ok(())
    }

    /// 设置音频位深
    pub fn set_bit_depth(&mut self, number: TrackNumber, bit_depth: u32) -> WebmResult<()> {
        let audio = self
            .track_for_update(number)?
            .audio_mut()
            .ok_or_else(|| WebmError::InvalidArgument(format!("轨道 #{number} 不是音频轨道")))?;
        audio.bit_depth = Some(bit_depth);
        Ok(())
    }

    // ========================
    // 帧写入
    // ========================

    /// 写入一帧
    ///
    /// 轨道不存在时不写出任何字节. 首帧会触发头部写出.
    pub fn add_frame(
        &mut self,
        track: TrackNumber,
        payload: &[u8],
        timestamp_ns: u64,
        keyframe: bool,
    ) -> WebmResult<()> {
        self.ensure_building("写入帧")?;
        let is_video = self
            .track(track)
            .ok_or(WebmError::TrackNotFound(track.get()))?
            .is_video();

        if self.layout.is_none() {
            let result = self.write_header();
            self.fail_on_error(result)?;
        }

        let scale = self.info.timecode_scale;
        let timecode = ns_to_timecode(timestamp_ns, scale);

        let start_new = match &self.cluster {
            None => true,
            Some(cluster) => {
                if timecode < cluster.timecode() {
                    return Err(WebmError::InvalidArgument(format!(
                        "帧时间码 {timecode} 早于当前 Cluster 时间码 {}",
                        cluster.timecode()
                    )));
                }
                let overflow = cluster.relative_timecode(timecode).is_none();
                let too_long = self.options.max_cluster_duration_ns.is_some_and(|max| {
                    timestamp_ns.saturating_sub(timecode_to_ns(cluster.timecode(), scale)) > max
                });
                let video_key = is_video && keyframe && !cluster.is_empty();
                overflow || too_long || video_key
            }
        };
        if start_new {
            let result = self.flush_cluster();
            self.fail_on_error(result)?;
        }

        let cue_track = self.cue_track();
        let cluster = self
            .cluster
            .get_or_insert_with(|| ClusterBuilder::new(timecode));
        let relative = cluster.relative_timecode(timecode).ok_or_else(|| {
            WebmError::InvalidArgument(format!("帧时间码 {timecode} 超出 Cluster 范围"))
        })?;
        let block =
            cluster.push_simple_block(track, relative, BlockFlags::from_keyframe(keyframe), payload);
        if keyframe && cue_track == Some(track) {
            cluster.add_cue(track, timecode, block);
        }

        self.max_timecode = self.max_timecode.max(timecode);
        self.frames_written += 1;
        Ok(())
    }

    /// 建立索引的轨道: 优先第一个视频轨道
    fn cue_track(&self) -> Option<TrackNumber> {
        self.tracks
            .iter()
            .find(|t| t.is_video())
            .or_else(|| self.tracks.first())
            .map(|t| t.number)
    }

    // ========================
    // 完成
    // ========================

    /// 完成 Segment
    ///
    /// `duration_override` 以时间码为单位覆盖总时长. 无论成功与否
    /// Segment 都进入终态, 失败不会重试.
    pub fn finalize(&mut self, duration_override: Option<u64>) -> WebmResult<()> {
        match self.state {
            SegmentState::Created => {
                return Err(WebmError::InvalidState("Segment 尚未初始化".into()));
            }
            SegmentState::Finalized => {
                return Err(WebmError::InvalidState("Segment 已完成".into()));
            }
            SegmentState::Failed => {
                return Err(WebmError::InvalidState("Segment 写入失败, 不能完成".into()));
            }
            SegmentState::Building => {}
        }
        if let Some(duration) = duration_override {
            self.info.duration = Some(duration as f64);
        }
        // 进入终态后再写结尾, 失败也不回退
        self.state = SegmentState::Finalized;

        match self.write_trailer() {
            Ok(()) => {
                debug!(
                    "WebM: Segment 完成, {} 帧, {} 个 Cluster, {} 个索引点",
                    self.frames_written,
                    self.clusters_written,
                    self.cues.len()
                );
                Ok(())
            }
            Err(e) => {
                warn!("WebM: Segment 完成失败: {e}");
                Err(e)
            }
        }
    }

    fn ensure_building(&self, operation: &str) -> WebmResult<()> {
        match self.state {
            SegmentState::Building => Ok(()),
            SegmentState::Created => Err(WebmError::InvalidState(format!(
                "{operation}: Segment 尚未初始化"
            ))),
            SegmentState::Finalized => Err(WebmError::InvalidState(format!(
                "{operation}: Segment 已完成"
            ))),
            SegmentState::Failed => Err(WebmError::InvalidState(format!(
                "{operation}: Segment 此前写入失败"
            ))),
        }
    }

    /// 写入端出错后进入失败终态, 不再重写头部或继续追加 Cluster
    fn fail_on_error(&mut self, result: WebmResult<()>) -> WebmResult<()> {
        if let Err(e) = &result {
            warn!("WebM: 写入失败, Segment 不再可用: {e}");
            self.state = SegmentState::Failed;
        }
        result
    }

    /// 写入 EBML Header + Segment + (Void) + Info + Tracks
    fn write_header(&mut self) -> WebmResult<()> {
        let writer = self
            .writer
            .as_deref_mut()
            .ok_or_else(|| WebmError::InvalidState("Segment 未绑定写入端".into()))?;
        let seekable = writer.seekable();

        // EBML Header
        let mut ebml = Vec::new();
        write::write_uint(&mut ebml, ids::EBML_VERSION, 1);
        write::write_uint(&mut ebml, ids::EBML_READ_VERSION, 1);
        write::write_uint(&mut ebml, ids::EBML_MAX_ID_LENGTH, 4);
        write::write_uint(&mut ebml, ids::EBML_MAX_SIZE_LENGTH, 8);
        write::write_string(&mut ebml, ids::EBML_DOC_TYPE, "webm");
        write::write_uint(&mut ebml, ids::EBML_DOC_TYPE_VERSION, 4);
        write::write_uint(&mut ebml, ids::EBML_DOC_TYPE_READ_VERSION, 2);
        let mut buf = Vec::new();
        write::write_master(&mut buf, ids::EBML_HEADER, &ebml);
        writer.write(&buf)?;

        // Segment (未知大小, 完成时回填)
        let segment_pos = writer.position()?;
        writer.element_start_notify(u64::from(ids::SEGMENT), segment_pos as i64);
        let mut buf = Vec::new();
        write::write_id(&mut buf, ids::SEGMENT);
        let segment_size_pos = segment_pos + buf.len() as u64;
        buf.extend_from_slice(&write::UNKNOWN_SIZE_8);
        writer.write(&buf)?;
        let data_start = segment_pos + buf.len() as u64;

        // SeekHead 预留
        let seek_head_pos = if seekable {
            let pos = writer.position()?;
            let mut void = Vec::with_capacity(SEEK_HEAD_RESERVED);
            write::write_void(&mut void, SEEK_HEAD_RESERVED)?;
            writer.write(&void)?;
            Some(pos)
        } else {
            None
        };

        // Info
        let info_pos = writer.position()?;
        writer.element_start_notify(u64::from(ids::INFO), info_pos as i64);
        let mut info = Vec::new();
        write::write_uint(&mut info, ids::TIMECODE_SCALE, self.info.timecode_scale);
        // Duration 先写占位值, 完成时回填
        let duration_offset = if seekable || self.info.duration.is_some() {
            write::write_float(&mut info, ids::DURATION, self.info.duration.unwrap_or(0.0));
            Some(info.len() - 8)
        } else {
            None
        };
        if let Some(date) = self.info.date_utc {
            write::write_i64(&mut info, ids::DATE_UTC, date);
        }
        if let Some(title) = &self.info.title {
            write::write_string(&mut info, ids::TITLE, title);
        }
        write::write_string(&mut info, ids::MUXING_APP, &self.info.muxing_app);
        write::write_string(&mut info, ids::WRITING_APP, &self.info.writing_app);
        let mut buf = Vec::new();
        write::write_id(&mut buf, ids::INFO);
        write::write_size(&mut buf, info.len() as u64);
        let info_header_len = buf.len() as u64;
        buf.extend_from_slice(&info);
        writer.write(&buf)?;
        let duration_pos =
            duration_offset.map(|offset| info_pos + info_header_len + offset as u64);

        // Tracks
        let tracks_pos = writer.position()?;
        writer.element_start_notify(u64::from(ids::TRACKS), tracks_pos as i64);
        if self.tracks.is_empty() {
            warn!("WebM: 写出头部时没有任何轨道");
        }
        let mut entries = Vec::new();
        for track in &self.tracks {
            track.write_entry(&mut entries);
        }
        let mut buf = Vec::new();
        write::write_master(&mut buf, ids::TRACKS, &entries);
        writer.write(&buf)?;

        self.layout = Some(Layout {
            segment_size_pos,
            data_start,
            seek_head_pos,
            duration_pos,
            info_pos: info_pos - data_start,
            tracks_pos: tracks_pos - data_start,
        });
        debug!(
            "WebM: 写入 EBML header + Segment + Info + Tracks, {} 个轨道",
            self.tracks.len()
        );
        Ok(())
    }

    /// 写出当前 Cluster (如有)
    fn flush_cluster(&mut self) -> WebmResult<()> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };
        if cluster.is_empty() {
            return Ok(());
        }
        let data_start = self.layout.map_or(0, |l| l.data_start);
        let writer = self
            .writer
            .as_deref_mut()
            .ok_or_else(|| WebmError::InvalidState("Segment 未绑定写入端".into()))?;
        let cues = cluster.flush(writer, data_start)?;
        self.cues.extend(cues);
        self.clusters_written += 1;
        Ok(())
    }

    /// 刷新 Cluster, 写 Cues 并回填头部
    fn write_trailer(&mut self) -> WebmResult<()> {
        if self.layout.is_none() {
            self.write_header()?;
        }
        self.flush_cluster()?;

        let layout = self
            .layout
            .ok_or_else(|| WebmError::InvalidState("Segment 头部缺失".into()))?;
        let writer = self
            .writer
            .as_deref_mut()
            .ok_or_else(|| WebmError::InvalidState("Segment 未绑定写入端".into()))?;

        if !writer.seekable() {
            debug!("WebM: 写入端不可定位, 保留未知大小的 Segment");
            return Ok(());
        }

        // Cues
        let mut cues_pos = None;
        if self.options.output_cues && !self.cues.is_empty() {
            let pos = writer.position()?;
            writer.element_start_notify(u64::from(ids::CUES), pos as i64);
            let mut buf = Vec::new();
            cluster::write_cues(&mut buf, &self.cues);
            writer.write(&buf)?;
            cues_pos = Some(pos - layout.data_start);
        }

        let end = writer.position()?;

        // Duration
        if let Some(pos) = layout.duration_pos {
            let duration = self.info.duration.unwrap_or(self.max_timecode as f64);
            writer.set_position(pos)?;
            writer.write(&duration.to_be_bytes())?;
        }

        // SeekHead
        if let Some(pos) = layout.seek_head_pos {
            let mut entries = vec![(ids::INFO, layout.info_pos), (ids::TRACKS, layout.tracks_pos)];
            if let Some(cues) = cues_pos {
                entries.push((ids::CUES, cues));
            }
            let seek_head = build_seek_head(&entries)?;
            writer.set_position(pos)?;
            writer.write(&seek_head)?;
        }

        // Segment 大小
        let mut size = Vec::with_capacity(8);
        write::write_vint_fixed(&mut size, end - layout.data_start, 8)?;
        writer.set_position(layout.segment_size_pos)?;
        writer.write(&size)?;
        writer.set_position(end)?;
        Ok(())
    }
}

impl Drop for Segment<'_> {
    fn drop(&mut self) {
        if self.state == SegmentState::Building {
            warn!(
                "WebM: Segment 未完成即被销毁, 已写入 {} 帧, 输出不完整",
                self.frames_written
            );
        }
    }
}

/// 构建恰好占满预留空间的 SeekHead (不足部分以 Void 填充)
fn build_seek_head(entries: &[(u32, u64)]) -> WebmResult<Vec<u8>> {
    let mut content = Vec::new();
    for &(id, position) in entries {
        let mut id_bytes = Vec::with_capacity(4);
        write::write_id(&mut id_bytes, id);
        let mut seek = Vec::new();
        write::write_binary(&mut seek, ids::SEEK_ID, &id_bytes);
        write::write_uint(&mut seek, ids::SEEK_POSITION, position);
        write::write_master(&mut content, ids::SEEK, &seek);
    }
    let mut buf = Vec::with_capacity(SEEK_HEAD_RESERVED);
    write::write_master(&mut buf, ids::SEEK_HEAD, &content);
    let remaining = SEEK_HEAD_RESERVED
        .checked_sub(buf.len())
        .filter(|&r| r != 1)
        .ok_or_else(|| WebmError::InvalidData("SeekHead 超出预留空间".into()))?;
    if remaining > 0 {
        write::write_void(&mut buf, remaining)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::read::{Elements, read_float, read_header, read_uint};
    use crate::io::{CallbackWriter, MemoryBuffer, StreamWriter};

    /// 第 `fail_at` 次写入 (从 1 开始计数) 返回失败的宿主
    #[derive(Default)]
    struct FlakyHost {
        data: MemoryBuffer,
        writes: usize,
        fail_at: usize,
    }

    fn flaky_writer(fail_at: usize) -> CallbackWriter<FlakyHost> {
        CallbackWriter::new(
            FlakyHost {
                fail_at,
                ..FlakyHost::default()
            },
            |h, buf| {
                h.writes += 1;
                h.writes != h.fail_at && h.data.write(buf).is_ok()
            },
            |h| h.data.position().map_or(-1, |p| p as i64),
        )
        .with_set_position(|h, pos| h.data.set_position(pos).is_ok())
    }

    fn count_id(data: &[u8], id: [u8; 4]) -> usize {
        data.windows(4).filter(|w| *w == id).count()
    }

    /// 在顶层结构中查找子元素负载
    fn find_child(data: &[u8], id: u32) -> Option<&[u8]> {
        Elements::new(data)
            .map_while(Result::ok)
            .find(|(child, _)| *child == id)
            .map(|(_, payload)| payload)
    }

    /// 返回 Segment 的 (大小字段, 负载)
    fn segment_payload(data: &[u8]) -> (Option<u64>, &[u8]) {
        let ebml = read_header(data).unwrap();
        let ebml_len = ebml.header_len + ebml.size.unwrap() as usize;
        let segment = read_header(&data[ebml_len..]).unwrap();
        assert_eq!(segment.id, ids::SEGMENT);
        (segment.size, &data[ebml_len + segment.header_len..])
    }

    fn vp9_segment(segment: &mut Segment<'_>) -> TrackNumber {
        segment.add_video_track(640, 480, 0, VideoCodec::Vp9).unwrap()
    }

    #[test]
    fn test_状态机_初始化() {
        let mut a = MemoryBuffer::new();
        let mut b = MemoryBuffer::new();
        let mut segment = Segment::new();
        assert_eq!(segment.state(), SegmentState::Created);
        assert!(segment.add_video_track(1, 1, 0, VideoCodec::Vp8).is_err());
        segment.init(&mut a).unwrap();
        assert_eq!(segment.state(), SegmentState::Building);
        assert!(matches!(segment.init(&mut b), Err(WebmError::InvalidState(_))));
        segment.finalize(None).unwrap();
    }

    #[test]
    fn test_未初始化时完成报错() {
        let mut segment = Segment::new();
        assert!(matches!(segment.finalize(None), Err(WebmError::InvalidState(_))));
        assert_eq!(segment.state(), SegmentState::Created);
    }

    #[test]
    fn test_重复完成报错() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        vp9_segment(&mut segment);
        segment.finalize(None).unwrap();
        assert!(segment.finalize(None).is_err());
        let track = TrackNumber::new(1).unwrap();
        assert!(segment.add_frame(track, &[0], 0, true).is_err());
    }

    #[test]
    fn test_轨道号分配() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = segment.add_video_track(640, 480, 0, VideoCodec::Vp9).unwrap();
        let a = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).unwrap();
        assert_ne!(v, a);
        assert_eq!((v.get(), a.get()), (1, 2));

        let explicit = segment.add_audio_track(44_100, 1, 5, AudioCodec::Vorbis).unwrap();
        assert_eq!(explicit.get(), 5);
        assert!(segment.add_audio_track(44_100, 1, 5, AudioCodec::Vorbis).is_err());
        assert!(segment.add_audio_track(44_100, 1, 127, AudioCodec::Vorbis).is_err());
        // 自动分配跳过已占用的号
        let next = segment.add_video_track(320, 240, 0, VideoCodec::Vp8).unwrap();
        assert_eq!(next.get(), 3);
        segment.finalize(None).unwrap();
    }

    #[test]
    fn test_未知轨道不写任何字节() {
        let mut buf = MemoryBuffer::new();
        {
            let mut segment = Segment::new();
            segment.init(&mut buf).unwrap();
            vp9_segment(&mut segment);
            let foreign = TrackNumber::new(9).unwrap();
            assert!(matches!(
                segment.add_frame(foreign, &[1, 2, 3], 0, true),
                Err(WebmError::TrackNotFound(9))
            ));
            assert_eq!(segment.frames_written(), 0);
            // 不完成直接销毁, 只记录警告
        }
        assert!(buf.data().is_empty());
    }

    #[test]
    fn test_头部写出后冻结轨道与元数据() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = vp9_segment(&mut segment);
        segment.set_timecode_scale(0);
        assert_eq!(segment.info().timecode_scale, DEFAULT_TIMECODE_SCALE);

        segment.add_frame(v, &[0; 10], 0, true).unwrap();
        assert!(segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).is_err());
        assert!(segment.set_codec_private(v, &[1]).is_err());
        segment.set_title("ignored");
        assert_eq!(segment.info().title, None);
        segment.set_duration(42.0);
        assert_eq!(segment.info().duration, Some(42.0));
        segment.finalize(None).unwrap();
    }

    #[test]
    fn test_色彩仅限视频轨道() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = vp9_segment(&mut segment);
        let a = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).unwrap();
        segment.set_colour(v, Colour::new(8, 1, 1, false)).unwrap();
        assert!(segment.set_colour(a, Colour::new(8, 1, 1, false)).is_err());
        segment.set_colour_matrix_coefficients(v, 1).unwrap();
        let colour = segment.track(v).unwrap().video().unwrap().colour.unwrap();
        assert_eq!(colour.bits_per_channel, 8);
        assert_eq!(colour.matrix_coefficients, Some(1));
        assert!(segment.set_bit_depth(v, 16).is_err());
        segment.set_bit_depth(a, 16).unwrap();
        segment.finalize(None).unwrap();
    }

    #[test]
    fn test_完成后回填大小与时长() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = vp9_segment(&mut segment);
        for i in 0..5u64 {
            segment.add_frame(v, &[0xAA; 100], i * 33_000_000, i == 0).unwrap();
        }
        segment.finalize(Some(1_000)).unwrap();
        drop(segment);

        let data = buf.into_data();
        assert_eq!(&data[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        let (size, payload) = segment_payload(&data);
        assert_eq!(size, Some(payload.len() as u64));

        let info = find_child(payload, ids::INFO).unwrap();
        let duration = find_child(info, ids::DURATION).unwrap();
        assert!((read_float(duration).unwrap() - 1_000.0).abs() < f64::EPSILON);

        let seek_head = find_child(payload, ids::SEEK_HEAD).unwrap();
        let seeks: Vec<_> = Elements::new(seek_head).map_while(Result::ok).collect();
        assert_eq!(seeks.len(), 3, "Info + Tracks + Cues");
        assert!(find_child(payload, ids::CUES).is_some());
    }

    #[test]
    fn test_时长按最后一帧推算() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let v = vp9_segment(&mut segment);
        segment.add_frame(v, &[0], 0, true).unwrap();
        segment.add_frame(v, &[0], 250_000_000, false).unwrap();
        segment.finalize(None).unwrap();
        drop(segment);

        let data = buf.into_data();
        let (_, payload) = segment_payload(&data);
        let info = find_child(payload, ids::INFO).unwrap();
        let duration = read_float(find_child(info, ids::DURATION).unwrap()).unwrap();
        assert!((duration - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_不可定位写入端保留未知大小() {
        let mut writer = StreamWriter::new(Vec::new());
        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);
        segment.add_frame(v, &[1; 8], 0, true).unwrap();
        segment.finalize(Some(10)).unwrap();
        drop(segment);

        let data = writer.into_inner();
        let (size, payload) = segment_payload(&data);
        assert_eq!(size, None);
        assert!(find_child(payload, ids::SEEK_HEAD).is_none());
        assert!(find_child(payload, ids::CUES).is_none());
        assert!(find_child(payload, ids::CLUSTER).is_some());
    }

    #[test]
    fn test_cluster_切分() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::with_options(SegmentOptions {
            output_cues: true,
            max_cluster_duration_ns: Some(1_000_000_000),
        });
        segment.init(&mut buf).unwrap();
        let v = vp9_segment(&mut segment);
        let a = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).unwrap();

        // 视频关键帧切分
        segment.add_frame(v, &[0], 0, true).unwrap();
        segment.add_frame(a, &[0], 10_000_000, true).unwrap();
        segment.add_frame(v, &[0], 500_000_000, true).unwrap();
        // 超过最大时长切分
        segment.add_frame(a, &[0], 1_600_000_000, true).unwrap();
        // 早于当前 Cluster 的帧被拒绝
        assert!(matches!(
            segment.add_frame(a, &[0], 1_000_000_000, true),
            Err(WebmError::InvalidArgument(_))
        ));
        segment.finalize(None).unwrap();
        // 只有视频关键帧建立索引
        assert_eq!(segment.cue_points().len(), 2);
        drop(segment);

        let data = buf.into_data();
        let (_, payload) = segment_payload(&data);
        let clusters = Elements::new(payload)
            .map_while(Result::ok)
            .filter(|(id, _)| *id == ids::CLUSTER)
            .count();
        assert_eq!(clusters, 3);
    }

    #[test]
    fn test_相对时间码溢出时切分() {
        let mut buf = MemoryBuffer::new();
        let mut segment = Segment::new();
        segment.init(&mut buf).unwrap();
        let a = segment.add_audio_track(48_000, 2, 0, AudioCodec::Opus).unwrap();
        segment.add_frame(a, &[0], 0, true).unwrap();
        // 40 秒 = 40000 个时间码单位 > i16::MAX
        segment.add_frame(a, &[0], 40_000_000_000, true).unwrap();
        segment.finalize(None).unwrap();
        // 纯音频时以音频轨道建立索引
        assert_eq!(segment.cue_points().len(), 2);
    }

    #[test]
    fn test_元素开始通知() {
        #[derive(Default)]
        struct Host {
            data: MemoryBuffer,
            notified: Vec<u64>,
        }

        let mut writer = CallbackWriter::new(
            Host::default(),
            |h, buf| h.data.write(buf).is_ok(),
            |h| h.data.position().map_or(-1, |p| p as i64),
        )
        .with_set_position(|h, pos| h.data.set_position(pos).is_ok())
        .with_element_start_notify(|h, id, _| h.notified.push(id));

        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);
        segment.add_frame(v, &[0], 0, true).unwrap();
        segment.finalize(None).unwrap();
        drop(segment);

        let notified: Vec<u32> = writer
            .into_context()
            .notified
            .into_iter()
            .map(|id| id as u32)
            .collect();
        assert_eq!(
            notified,
            vec![ids::SEGMENT, ids::INFO, ids::TRACKS, ids::CLUSTER, ids::CUES]
        );
    }

    #[test]
    fn test_定位失败时完成报错且进入终态() {
        let mut writer = CallbackWriter::new(
            MemoryBuffer::new(),
            |m, buf| m.write(buf).is_ok(),
            |m| m.position().map_or(-1, |p| p as i64),
        )
        .with_set_position(|_, _| false);

        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);
        segment.add_frame(v, &[0], 0, true).unwrap();
        assert!(matches!(segment.finalize(None), Err(WebmError::SeekFailed(_))));
        assert_eq!(segment.state(), SegmentState::Finalized);
    }

    #[test]
    fn test_头部写入失败后不再重写头部() {
        // 第 1 次写入 EBML Header 成功, 第 2 次写入 Segment 失败
        let mut writer = flaky_writer(2);
        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);

        assert!(matches!(
            segment.add_frame(v, &[0; 16], 0, true),
            Err(WebmError::WriteFailed(_))
        ));
        assert_eq!(segment.state(), SegmentState::Failed);
        for i in 1..3u64 {
            assert!(matches!(
                segment.add_frame(v, &[0; 16], i * 33_000_000, false),
                Err(WebmError::InvalidState(_))
            ));
        }
        assert!(matches!(segment.finalize(None), Err(WebmError::InvalidState(_))));
        assert_eq!(segment.frames_written(), 0);
        drop(segment);

        let host = writer.into_context();
        assert_eq!(host.writes, 2);
        assert_eq!(count_id(host.data.data(), [0x1A, 0x45, 0xDF, 0xA3]), 1);
    }

    #[test]
    fn test_cluster_写出失败后进入失败终态() {
        // 可定位写入端的头部占 5 次写入, 第 6 次为 Cluster 头
        let mut writer = flaky_writer(6);
        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);

        segment.add_frame(v, &[1; 16], 0, true).unwrap();
        segment.add_frame(v, &[2; 16], 100_000_000, false).unwrap();
        assert!(matches!(
            segment.add_frame(v, &[3; 16], 200_000_000, true),
            Err(WebmError::WriteFailed(_))
        ));
        assert_eq!(segment.state(), SegmentState::Failed);
        assert!(segment.add_frame(v, &[4; 16], 300_000_000, false).is_err());
        assert!(matches!(segment.finalize(None), Err(WebmError::InvalidState(_))));
        assert_eq!(segment.frames_written(), 2);
        drop(segment);

        let host = writer.into_context();
        assert_eq!(host.writes, 6);
        assert_eq!(count_id(host.data.data(), [0x1F, 0x43, 0xB6, 0x75]), 0);
    }

    #[test]
    fn test_cues_写出失败时完成报错() {
        // 头部 5 次, Cluster 2 次, 第 8 次为 Cues
        let mut writer = flaky_writer(8);
        let mut segment = Segment::new();
        segment.init(&mut writer).unwrap();
        let v = vp9_segment(&mut segment);
        segment.add_frame(v, &[1; 16], 0, true).unwrap();

        assert!(matches!(segment.finalize(None), Err(WebmError::WriteFailed(_))));
        assert_eq!(segment.state(), SegmentState::Finalized);
        assert!(matches!(segment.finalize(None), Err(WebmError::InvalidState(_))));
        assert!(segment.add_frame(v, &[2; 16], 40_000_000, false).is_err());
        drop(segment);

        // 失败后不再回填任何字段
        let host = writer.into_context();
        assert_eq!(host.writes, 8);
        let data = host.data.into_data();
        let (size, _) = segment_payload(&data);
        assert_eq!(size, None);
    }

    #[test]
    fn test_seek_head_填满预留空间() {
        let seek_head = build_seek_head(&[(ids::INFO, 128), (ids::TRACKS, 300)]).unwrap();
        assert_eq!(seek_head.len(), SEEK_HEAD_RESERVED);
        let header = read_header(&seek_head).unwrap();
        assert_eq!(header.id, ids::SEEK_HEAD);
        let positions: Vec<u64> = Elements::new(&seek_head[header.header_len..][..header.size.unwrap() as usize])
            .map_while(Result::ok)
            .filter_map(|(_, seek)| find_child(seek, ids::SEEK_POSITION))
            .map(|p| read_uint(p).unwrap())
            .collect();
        assert_eq!(positions, vec![128, 300]);
    }
}

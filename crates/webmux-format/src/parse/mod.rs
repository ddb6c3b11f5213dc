//! WebM Segment 解析器.
//!
//! 通过 [`MkvReader`] 按绝对位置读取, 不假设数据已全部到达:
//! 读取越过当前可用长度时返回 [`WebmError::NeedMoreData`], 解析位置保持不变,
//! 调用方可以在更多数据到达后重试.
//!
//! # 解析范围
//! ```text
//! EBML Header        DocType 必须为 "webm" 或 "matroska"
//! Segment
//! ├── SeekHead/Void  跳过
//! ├── Info           TimecodeScale, Duration, DateUTC, Title, MuxingApp, WritingApp
//! ├── Tracks         TrackEntry (含 Video/Colour, Audio)
//! ├── Cluster        Timecode + SimpleBlock / BlockGroup
//! └── Cues           索引点
//! ```

mod track;

pub use track::{AudioInfo, TrackInfo, VideoInfo};

use bytes::Bytes;
use log::debug;
use webmux_core::timecode::timecode_to_ns;
use webmux_core::{BlockFlags, WebmError, WebmResult};

use crate::ebml::ElementHeader;
use crate::ebml::ids;
use crate::ebml::read::{
    Elements, read_float, read_id, read_sint, read_size, read_string, read_uint,
    vint_len_from_first,
};
use crate::io::MkvReader;
use crate::mux::{CuePoint, SegmentInfo, TrackNumber};

/// 解析得到的一帧
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub track_number: u64,
    /// 绝对时间戳 (纳秒)
    pub timestamp_ns: u64,
    pub keyframe: bool,
    pub data: Bytes,
}

/// WebM Segment 解析器
pub struct WebmReader<R> {
    reader: R,
    doc_type: String,
    info: SegmentInfo,
    tracks: Vec<TrackInfo>,
    cue_points: Vec<CuePoint>,
    cues_parsed: bool,
    segment_start: u64,
    segment_end: Option<u64>,
    /// 第一个 Cluster 的位置
    first_cluster: u64,
    /// 下一个待读元素的位置
    next_pos: u64,
    cluster_timecode: u64,
}

impl<R: MkvReader> WebmReader<R> {
    /// 解析 EBML 头部与 Segment 头部信息, 停在第一个 Cluster 处
    pub fn open(reader: R) -> WebmResult<Self> {
        let mut this = Self {
            reader,
            doc_type: String::new(),
            info: SegmentInfo {
                muxing_app: String::new(),
                writing_app: String::new(),
                ..SegmentInfo::default()
            },
            tracks: Vec::new(),
            cue_points: Vec::new(),
            cues_parsed: false,
            segment_start: 0,
            segment_end: None,
            first_cluster: 0,
            next_pos: 0,
            cluster_timecode: 0,
        };
        this.parse_headers()?;
        Ok(this)
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    /// 时长 (纳秒)
    pub fn duration_ns(&self) -> Option<u64> {
        self.info
            .duration
            .map(|d| (d * self.info.timecode_scale as f64) as u64)
    }

    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    pub fn track(&self, number: u64) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.number == number)
    }

    /// 已解析到的索引点; Cues 位于文件末尾时需读完全部帧后才可用
    pub fn cue_points(&self) -> &[CuePoint] {
        &self.cue_points
    }

    /// Segment 数据起点的绝对位置
    pub fn segment_start(&self) -> u64 {
        self.segment_start
    }

    /// 回到第一个 Cluster
    pub fn rewind(&mut self) {
        self.next_pos = self.first_cluster;
        self.cluster_timecode = 0;
    }

    /// 消耗自身, 返回字节源
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// 读取下一帧, 到达 Segment 末尾时返回 `None`
    pub fn next_frame(&mut self) -> WebmResult<Option<Frame>> {
        loop {
            if self.segment_end.is_some_and(|end| self.next_pos >= end) {
                return Ok(None);
            }
            let pos = self.next_pos;
            let header = match self.read_header_at(pos) {
                Ok(h) => h,
                Err(WebmError::Eof) => return Ok(None),
                Err(e) => return Err(e),
            };
            let payload_pos = pos + header.header_len as u64;

            // Cluster 不整体读入, 直接进入其子元素
            if header.id == ids::CLUSTER {
                self.next_pos = payload_pos;
                continue;
            }

            let size = header.size.ok_or_else(|| {
                WebmError::InvalidData(format!("元素 0x{:X} 大小未知", header.id))
            })?;
            let next = payload_pos + size;
            match header.id {
                ids::CLUSTER_TIMECODE => {
                    let payload = self.fetch(payload_pos, size)?;
                    self.cluster_timecode = read_uint(&payload)?;
                }
                ids::SIMPLE_BLOCK => {
                    let payload = self.fetch(payload_pos, size)?;
                    let frame = self.parse_block(&payload, None)?;
                    self.next_pos = next;
                    return Ok(Some(frame));
                }
                ids::BLOCK_GROUP => {
                    let payload = self.fetch(payload_pos, size)?;
                    let frame = self.parse_block_group(&payload)?;
                    self.next_pos = next;
                    if frame.is_some() {
                        return Ok(frame);
                    }
                    continue;
                }
                ids::CUES if !self.cues_parsed => {
                    let payload = self.fetch(payload_pos, size)?;
                    self.parse_cues(&payload)?;
                }
                _ => {}
            }
            self.next_pos = next;
        }
    }

    /// 从第一个 Cluster 起统计帧数, 结束后解析位置停在末尾
    pub fn count_frames(&mut self) -> WebmResult<u64> {
        self.rewind();
        let mut count = 0;
        while self.next_frame()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    // ========================
    // 头部解析
    // ========================

    fn parse_headers(&mut self) -> WebmResult<()> {
        // EBML Header
        let header = self.read_header_at(0)?;
        if header.id != ids::EBML_HEADER {
            return Err(WebmError::InvalidData("不是有效的 EBML 文件".into()));
        }
        let size = header
            .size
            .ok_or_else(|| WebmError::InvalidData("EBML 头部大小未知".into()))?;
        let payload = self.fetch(header.header_len as u64, size)?;
        for child in Elements::new(&payload) {
            let (id, data) = child?;
            if id == ids::EBML_DOC_TYPE {
                self.doc_type = read_string(data);
            }
        }
        if self.doc_type != "webm" && self.doc_type != "matroska" {
            return Err(WebmError::InvalidData(format!(
                "不支持的 DocType: {:?}",
                self.doc_type
            )));
        }

        // Segment
        let segment_pos = header.header_len as u64 + size;
        let segment = self.read_header_at(segment_pos)?;
        if segment.id != ids::SEGMENT {
            return Err(WebmError::InvalidData("未找到 Segment 元素".into()));
        }
        self.segment_start = segment_pos + segment.header_len as u64;
        self.segment_end = segment.size.map(|s| self.segment_start + s);

        // 扫描顶层元素直到第一个 Cluster
        let mut pos = self.segment_start;
        let mut found_tracks = false;
        loop {
            if self.segment_end.is_some_and(|end| pos >= end) {
                break;
            }
            let element = match self.read_header_at(pos) {
                Ok(h) => h,
                Err(WebmError::Eof) => break,
                Err(e) => return Err(e),
            };
            if element.id == ids::CLUSTER {
                break;
            }
            let size = element.size.ok_or_else(|| {
                WebmError::InvalidData(format!("顶层元素 0x{:X} 大小未知", element.id))
            })?;
            let payload_pos = pos + element.header_len as u64;
            match element.id {
                ids::INFO => {
                    let payload = self.fetch(payload_pos, size)?;
                    self.parse_info(&payload)?;
                }
                ids::TRACKS => {
                    let payload = self.fetch(payload_pos, size)?;
                    self.parse_tracks(&payload)?;
                    found_tracks = true;
                }
                ids::CUES => {
                    let payload = self.fetch(payload_pos, size)?;
                    self.parse_cues(&payload)?;
                }
                // SeekHead, Void, Tags 等 → 跳过
                _ => {}
            }
            pos = payload_pos + size;
        }

        if !found_tracks {
            return Err(WebmError::InvalidData("未找到 Tracks 元素".into()));
        }
        self.first_cluster = pos;
        self.next_pos = pos;
        debug!(
            "打开 WebM: DocType={}, {} 个轨道, TimecodeScale={}",
            self.doc_type,
            self.tracks.len(),
            self.info.timecode_scale
        );
        Ok(())
    }

    fn parse_info(&mut self, data: &[u8]) -> WebmResult<()> {
        for child in Elements::new(data) {
            let (id, payload) = child?;
            match id {
                ids::TIMECODE_SCALE => {
                    let scale = read_uint(payload)?;
                    if scale > 0 {
                        self.info.timecode_scale = scale;
                    }
                }
                ids::DURATION => self.info.duration = Some(read_float(payload)?),
                ids::DATE_UTC => self.info.date_utc = Some(read_sint(payload)?),
                ids::TITLE => self.info.title = Some(read_string(payload)),
                ids::MUXING_APP => self.info.muxing_app = read_string(payload),
                ids::WRITING_APP => self.info.writing_app = read_string(payload),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_tracks(&mut self, data: &[u8]) -> WebmResult<()> {
        for child in Elements::new(data) {
            let (id, payload) = child?;
            if id == ids::TRACK_ENTRY {
                let track = track::parse_track_entry(payload)?;
                debug!(
                    "WebM: 轨道 #{} type={:?} codec={}",
                    track.number, track.track_type, track.codec_id
                );
                self.tracks.push(track);
            }
        }
        Ok(())
    }

    fn parse_cues(&mut self, data: &[u8]) -> WebmResult<()> {
        for point in Elements::new(data) {
            let (id, point) = point?;
            if id != ids::CUE_POINT {
                continue;
            }
            let mut time = 0;
            let mut positions = Vec::new();
            for child in Elements::new(point) {
                let (id, payload) = child?;
                match id {
                    ids::CUE_TIME => time = read_uint(payload)?,
                    ids::CUE_TRACK_POSITIONS => positions.push(payload),
                    _ => {}
                }
            }
            for payload in positions {
                let mut track = 0;
                let mut cluster_position = 0;
                let mut block_number = 1;
                for child in Elements::new(payload) {
                    let (id, value) = child?;
                    match id {
                        ids::CUE_TRACK => track = read_uint(value)?,
                        ids::CUE_CLUSTER_POSITION => cluster_position = read_uint(value)?,
                        ids::CUE_BLOCK_NUMBER => block_number = read_uint(value)?,
                        _ => {}
                    }
                }
                if let Some(track) = TrackNumber::new(track) {
                    self.cue_points.push(CuePoint {
                        time,
                        track,
                        cluster_position,
                        block_number,
                    });
                }
            }
        }
        self.cues_parsed = true;
        Ok(())
    }

    // ========================
    // 块解析
    // ========================

    /// 解析 SimpleBlock / Block 负载
    ///
    /// `keyframe` 为 `None` 时取标志字节中的关键帧位 (SimpleBlock).
    fn parse_block(&self, data: &[u8], keyframe: Option<bool>) -> WebmResult<Frame> {
        let (track, vint_len) = read_size(data)?;
        let track_number =
            track.ok_or_else(|| WebmError::InvalidData("块的轨道号无效".into()))?;
        let header = data
            .get(vint_len..vint_len + 3)
            .ok_or_else(|| WebmError::InvalidData("块太小".into()))?;
        let relative = i16::from_be_bytes([header[0], header[1]]);
        let flags = BlockFlags::from_bits_retain(header[2]);
        if flags.is_laced() {
            return Err(WebmError::Unsupported("分包 (lacing) 的块".into()));
        }

        let timecode = self
            .cluster_timecode
            .saturating_add_signed(i64::from(relative));
        Ok(Frame {
            track_number,
            timestamp_ns: timecode_to_ns(timecode, self.info.timecode_scale),
            keyframe: keyframe.unwrap_or(flags.is_keyframe()),
            data: Bytes::copy_from_slice(&data[vint_len + 3..]),
        })
    }

    /// 解析 BlockGroup; 没有 ReferenceBlock 的 Block 视为关键帧
    fn parse_block_group(&self, data: &[u8]) -> WebmResult<Option<Frame>> {
        let mut block = None;
        let mut referenced = false;
        for child in Elements::new(data) {
            let (id, payload) = child?;
            match id {
                ids::BLOCK => block = Some(payload),
                ids::REFERENCE_BLOCK => referenced = true,
                _ => {}
            }
        }
        block
            .map(|payload| self.parse_block(payload, Some(!referenced)))
            .transpose()
    }

    // ========================
    // 底层读取
    // ========================

    /// 检查 `[position, position + len)` 是否可读
    fn ensure_available(&mut self, position: u64, len: u64) -> WebmResult<()> {
        let end = position
            .checked_add(len)
            .ok_or_else(|| WebmError::InvalidData("元素大小溢出".into()))?;
        let length = self.reader.length()?;
        if end <= length.available {
            return Ok(());
        }
        match length.total {
            Some(total) if end > total => Err(WebmError::Eof),
            _ => Err(WebmError::NeedMoreData),
        }
    }

    fn fetch(&mut self, position: u64, len: u64) -> WebmResult<Vec<u8>> {
        self.ensure_available(position, len)?;
        let len = usize::try_from(len)
            .map_err(|_| WebmError::InvalidData(format!("元素过大: {len} 字节")))?;
        let mut buf = vec![0u8; len];
        self.reader.read(position, &mut buf)?;
        Ok(buf)
    }

    fn fetch_byte(&mut self, position: u64) -> WebmResult<u8> {
        self.ensure_available(position, 1)?;
        let mut byte = [0u8; 1];
        self.reader.read(position, &mut byte)?;
        Ok(byte[0])
    }

    fn read_header_at(&mut self, position: u64) -> WebmResult<ElementHeader> {
        let id_len = vint_len_from_first(self.fetch_byte(position)?)?;
        if id_len > 4 {
            return Err(WebmError::InvalidData("EBML: 元素 ID 超过 4 字节".into()));
        }
        let (id, _) = read_id(&self.fetch(position, id_len as u64)?)?;

        let size_pos = position + id_len as u64;
        let size_len = vint_len_from_first(self.fetch_byte(size_pos)?)?;
        let (size, _) = read_size(&self.fetch(size_pos, size_len as u64)?)?;
        Ok(ElementHeader {
            id,
            size,
            header_len: id_len + size_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::write;
    use crate::io::MemoryBuffer;

    /// 构造一个最小的 WebM 文件 (Segment 未知大小)
    fn build_minimal_webm() -> Vec<u8> {
        let mut data = Vec::new();

        let mut ebml = Vec::new();
        write::write_string(&mut ebml, ids::EBML_DOC_TYPE, "webm");
        write::write_master(&mut data, ids::EBML_HEADER, &ebml);

        write::write_id(&mut data, ids::SEGMENT);
        data.extend_from_slice(&write::UNKNOWN_SIZE_8);

        let mut info = Vec::new();
        write::write_uint(&mut info, ids::TIMECODE_SCALE, 1_000_000);
        write::write_float(&mut info, ids::DURATION, 5000.0);
        write::write_master(&mut data, ids::INFO, &info);

        let mut tracks = Vec::new();
        {
            let mut video = Vec::new();
            write::write_uint(&mut video, ids::PIXEL_WIDTH, 1280);
            write::write_uint(&mut video, ids::PIXEL_HEIGHT, 720);
            let mut entry = Vec::new();
            write::write_uint(&mut entry, ids::TRACK_NUMBER, 1);
            write::write_uint(&mut entry, ids::TRACK_TYPE, 1);
            write::write_string(&mut entry, ids::CODEC_ID, "V_VP9");
            write::write_master(&mut entry, ids::VIDEO, &video);
            write::write_master(&mut tracks, ids::TRACK_ENTRY, &entry);
        }
        {
            let mut audio = Vec::new();
            write::write_float(&mut audio, ids::SAMPLING_FREQUENCY, 48_000.0);
            write::write_uint(&mut audio, ids::CHANNELS, 2);
            let mut entry = Vec::new();
            write::write_uint(&mut entry, ids::TRACK_NUMBER, 2);
            write::write_uint(&mut entry, ids::TRACK_TYPE, 2);
            write::write_string(&mut entry, ids::CODEC_ID, "A_OPUS");
            write::write_master(&mut entry, ids::AUDIO, &audio);
            write::write_master(&mut tracks, ids::TRACK_ENTRY, &entry);
        }
        write::write_master(&mut data, ids::TRACKS, &tracks);

        let mut cluster = Vec::new();
        write::write_uint(&mut cluster, ids::CLUSTER_TIMECODE, 100);
        // 视频关键帧, 相对时间码 0
        write::write_binary(&mut cluster, ids::SIMPLE_BLOCK, &[0x81, 0x00, 0x00, 0x80, 0xDE, 0xAD]);
        // 音频帧放在 BlockGroup 中, 相对时间码 20
        let mut group = Vec::new();
        write::write_binary(&mut group, ids::BLOCK, &[0x82, 0x00, 0x14, 0x00, 0xBE, 0xEF]);
        write::write_master(&mut cluster, ids::BLOCK_GROUP, &group);
        write::write_master(&mut data, ids::CLUSTER, &cluster);

        data
    }

    #[test]
    fn test_解析最小文件() {
        let mut buf = MemoryBuffer::from_data(build_minimal_webm());
        let reader = WebmReader::open(&mut buf).unwrap();
        assert_eq!(reader.doc_type(), "webm");
        assert_eq!(reader.tracks().len(), 2);
        assert_eq!(reader.duration_ns(), Some(5_000_000_000));

        let video = reader.track(1).unwrap();
        assert_eq!(video.codec_id, "V_VP9");
        let v = video.video.as_ref().unwrap();
        assert_eq!((v.width, v.height), (1280, 720));

        let audio = reader.track(2).unwrap().audio.as_ref().unwrap();
        assert_eq!(audio.channels, 2);
    }

    #[test]
    fn test_读取帧() {
        let mut buf = MemoryBuffer::from_data(build_minimal_webm());
        let mut reader = WebmReader::open(&mut buf).unwrap();

        let f0 = reader.next_frame().unwrap().unwrap();
        assert_eq!(f0.track_number, 1);
        assert!(f0.keyframe);
        assert_eq!(f0.timestamp_ns, 100_000_000);
        assert_eq!(f0.data.as_ref(), &[0xDE, 0xAD]);

        let f1 = reader.next_frame().unwrap().unwrap();
        assert_eq!(f1.track_number, 2);
        assert!(f1.keyframe, "没有 ReferenceBlock 的 Block 是关键帧");
        assert_eq!(f1.timestamp_ns, 120_000_000);

        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.count_frames().unwrap(), 2);
    }

    #[test]
    fn test_数据不足时可重试() {
        let data = build_minimal_webm();
        let total = data.len() as u64;
        let mut buf = MemoryBuffer::from_data(data);
        buf.set_available(Some(20));
        assert!(matches!(
            WebmReader::open(&mut buf),
            Err(WebmError::NeedMoreData)
        ));

        // 头部完整但 Cluster 只到达一部分
        buf.set_available(Some(total - 4));
        let mut reader = WebmReader::open(&mut buf).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
        assert!(matches!(reader.next_frame(), Err(WebmError::NeedMoreData)));

        reader.into_inner().set_available(None);
        let mut reader = WebmReader::open(&mut buf).unwrap();
        assert_eq!(reader.count_frames().unwrap(), 2);
    }

    #[test]
    fn test_读取封装器输出() {
        use crate::mux::Segment;
        use webmux_core::{AudioCodec, VideoCodec};

        let _ = env_logger::builder().is_test(true).try_init();
        let mut buf = MemoryBuffer::new();
        {
            let mut segment = Segment::new();
            segment.init(&mut buf).unwrap();
            segment.set_title("往返");
            let v = segment.add_video_track(320, 240, 0, VideoCodec::Vp8).unwrap();
            let a = segment.add_audio_track(44_100, 1, 0, AudioCodec::Vorbis).unwrap();
            segment.set_codec_private(a, &[0x02, 0x01, 0x00]).unwrap();
            segment.add_frame(v, &[1; 16], 0, true).unwrap();
            segment.add_frame(a, &[2; 4], 10_000_000, false).unwrap();
            segment.add_frame(v, &[3; 8], 33_000_000, false).unwrap();
            segment.add_frame(v, &[4; 16], 1_000_000_000, true).unwrap();
            segment.finalize(None).unwrap();
        }

        let mut reader = WebmReader::open(&mut buf).unwrap();
        assert_eq!(reader.info().title.as_deref(), Some("往返"));
        assert_eq!(reader.tracks().len(), 2);
        assert_eq!(reader.track(2).unwrap().codec_private.as_deref(), Some(&[2u8, 1, 0][..]));

        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            frames.push(frame);
        }
        let stamps: Vec<_> = frames.iter().map(|f| (f.track_number, f.timestamp_ns)).collect();
        assert_eq!(
            stamps,
            vec![(1, 0), (2, 10_000_000), (1, 33_000_000), (1, 1_000_000_000)]
        );
        assert!(frames[0].keyframe && !frames[2].keyframe && frames[3].keyframe);
        // Cues 位于末尾, 读完后可用
        assert!(!reader.cue_points().is_empty());
        assert_eq!(reader.cue_points()[0].track.get(), 1);
    }

    #[test]
    fn test_非_ebml_数据() {
        let mut buf = MemoryBuffer::from_data(b"RIFF\x00\x00\x00\x00WAVE".to_vec());
        assert!(matches!(
            WebmReader::open(&mut buf),
            Err(WebmError::InvalidData(_))
        ));
    }

    #[test]
    fn test_分包块不支持() {
        let mut data = build_minimal_webm();
        // 把第一个 SimpleBlock 的标志改为 Xiph 分包
        let pos = data
            .windows(4)
            .position(|w| w == [0x81, 0x00, 0x00, 0x80])
            .unwrap();
        data[pos + 3] = 0x82;
        let mut buf = MemoryBuffer::from_data(data);
        let mut reader = WebmReader::open(&mut buf).unwrap();
        assert!(matches!(reader.next_frame(), Err(WebmError::Unsupported(_))));
    }
}

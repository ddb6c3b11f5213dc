//! Cluster 缓冲与 Cues 索引.

use log::debug;
use webmux_core::{BlockFlags, WebmResult};

use super::track::TrackNumber;
use crate::ebml::{ids, write};
use crate::io::MkvWriter;

/// 索引点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuePoint {
    /// 时间码 (TimecodeScale 单位)
    pub time: u64,
    pub track: TrackNumber,
    /// Cluster 相对 Segment 数据起点的偏移
    pub cluster_position: u64,
    /// 块在 Cluster 中的序号 (从 1 开始)
    pub block_number: u64,
}

/// 尚未确定 Cluster 位置的索引点
#[derive(Debug, Clone, Copy)]
struct PendingCue {
    time: u64,
    track: TrackNumber,
    block_number: u64,
}

/// 正在组装的 Cluster
///
/// 块先追加到内存, 整个 Cluster 一次性写出.
#[derive(Debug)]
pub(crate) struct ClusterBuilder {
    timecode: u64,
    buf: Vec<u8>,
    blocks: u64,
    cues: Vec<PendingCue>,
}

impl ClusterBuilder {
    pub fn new(timecode: u64) -> Self {
        let mut buf = Vec::new();
        write::write_uint(&mut buf, ids::CLUSTER_TIMECODE, timecode);
        Self {
            timecode,
            buf,
            blocks: 0,
            cues: Vec::new(),
        }
    }

    pub fn timecode(&self) -> u64 {
        self.timecode
    }

    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    /// 相对时间码; 早于 Cluster 或超出 i16 时返回 `None`
    pub fn relative_timecode(&self, timecode: u64) -> Option<i16> {
        timecode
            .checked_sub(self.timecode)
            .and_then(|delta| i16::try_from(delta).ok())
    }

    /// 追加 SimpleBlock, 返回块序号
    ///
    /// SimpleBlock 格式:
    /// track_number (VINT) + timestamp_delta (2 bytes BE) + flags (1 byte) + frame_data
    pub fn push_simple_block(
        &mut self,
        track: TrackNumber,
        relative: i16,
        flags: BlockFlags,
        payload: &[u8],
    ) -> u64 {
        write::write_id(&mut self.buf, ids::SIMPLE_BLOCK);
        write::write_size(&mut self.buf, 4 + payload.len() as u64);
        // 轨道号不超过 126, 1 字节 VINT 足够
        self.buf.push(0x80 | track.get() as u8);
        self.buf.extend_from_slice(&relative.to_be_bytes());
        self.buf.push(flags.bits());
        self.buf.extend_from_slice(payload);
        self.blocks += 1;
        self.blocks
    }

    /// 登记一个待定位的索引点
    pub fn add_cue(&mut self, track: TrackNumber, timecode: u64, block_number: u64) {
        self.cues.push(PendingCue {
            time: timecode,
            track,
            block_number,
        });
    }

    /// 写出 Cluster, 返回其索引点
    ///
    /// `segment_data_start` 用于把绝对位置换算为 Segment 相对偏移.
    pub fn flush(
        self,
        writer: &mut dyn MkvWriter,
        segment_data_start: u64,
    ) -> WebmResult<Vec<CuePoint>> {
        let position = writer.position()?;
        writer.element_start_notify(u64::from(ids::CLUSTER), position as i64);

        let mut header = Vec::with_capacity(12);
        write::write_id(&mut header, ids::CLUSTER);
        write::write_size(&mut header, self.buf.len() as u64);
        writer.write(&header)?;
        writer.write(&self.buf)?;

        debug!(
            "WebM: 写出 Cluster, 时间码 {}, {} 个块, {} 字节",
            self.timecode,
            self.blocks,
            header.len() + self.buf.len()
        );

        let cluster_position = position.saturating_sub(segment_data_start);
        Ok(self
            .cues
            .into_iter()
            .map(|cue| CuePoint {
                time: cue.time,
                track: cue.track,
                cluster_position,
                block_number: cue.block_number,
            })
            .collect())
    }
}

/// 构建 Cues 元素
pub(crate) fn write_cues(buf: &mut Vec<u8>, cues: &[CuePoint]) {
    let mut content = Vec::new();
    for cue in cues {
        let mut positions = Vec::new();
        write::write_uint(&mut positions, ids::CUE_TRACK, cue.track.get());
        write::write_uint(&mut positions, ids::CUE_CLUSTER_POSITION, cue.cluster_position);
        if cue.block_number > 1 {
            write::write_uint(&mut positions, ids::CUE_BLOCK_NUMBER, cue.block_number);
        }

        let mut point = Vec::new();
        write::write_uint(&mut point, ids::CUE_TIME, cue.time);
        write::write_master(&mut point, ids::CUE_TRACK_POSITIONS, &positions);
        write::write_master(&mut content, ids::CUE_POINT, &point);
    }
    write::write_master(buf, ids::CUES, &content);
}

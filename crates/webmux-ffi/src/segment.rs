//! Segment 与轨道的生命周期导出.
//!
//! Segment 以 `Box` 形式交给宿主. 轨道句柄分配在 Segment 内部的堆上,
//! 地址在 Segment 释放前保持不变, 并记录所属 Segment 以拒绝跨 Segment 使用.

use std::os::raw::{c_char, c_int};

use log::{debug, warn};
use webmux_core::{AudioCodec, Colour, TrackType, VideoCodec, WebmResult};
use webmux_format::{Segment, TrackNumber};

use crate::writer::FfiWriter;
use crate::{c_str, guard};

/// Segment 句柄
pub struct FfiSegment {
    segment: Segment<'static>,
    tracks: Vec<Box<MuxTrack>>,
}

/// 轨道句柄, 归所属 Segment 所有
pub struct MuxTrack {
    owner: *mut Segment<'static>,
    number: TrackNumber,
    track_type: TrackType,
}

impl MuxTrack {
    /// 在所属 Segment 上执行轨道操作
    ///
    /// # Safety
    ///
    /// 所属 Segment 仍然存活, 且没有其他活跃的可变借用.
    unsafe fn with_segment<T>(&self, op: impl FnOnce(&mut Segment<'static>, TrackNumber) -> T) -> T {
        // 安全: 轨道句柄与 Segment 同生共死
        op(unsafe { &mut *self.owner }, self.number)
    }
}

fn report(operation: &str, result: WebmResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("{operation} 失败: {e}");
            false
        }
    }
}

/// 创建 Segment
#[unsafe(no_mangle)]
pub extern "C" fn mux_new_segment() -> *mut FfiSegment {
    Box::into_raw(Box::new(FfiSegment {
        segment: Segment::new(),
        tracks: Vec::new(),
    }))
}

/// 释放 Segment 及其全部轨道句柄
///
/// 释放前未完成的 Segment 不会补写结尾.
///
/// # Safety
///
/// `segment` 为空或来自 [`mux_new_segment`] 且未被释放.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_delete_segment(segment: *mut FfiSegment) {
    if !segment.is_null() {
        drop(unsafe { Box::from_raw(segment) });
    }
}

/// 把 Segment 绑定到写入端
///
/// # Safety
///
/// 两个句柄为空或有效; 写入端必须比 Segment 活得久.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_initialize_segment(
    segment: *mut FfiSegment,
    writer: *mut FfiWriter,
) -> bool {
    let Some(segment) = (unsafe { segment.as_mut() }) else {
        return false;
    };
    if writer.is_null() {
        return false;
    }
    // 安全: 调用方保证写入端比 Segment 活得久
    let writer: &'static mut FfiWriter = unsafe { &mut *writer };
    guard(false, move || {
        report("mux_initialize_segment", segment.segment.init(writer))
    })
}

macro_rules! segment_setter {
    ($(#[$doc:meta])* $name:ident($value:ident: $ty:ty) => $setter:ident) => {
        $(#[$doc])*
        ///
        /// # Safety
        ///
        /// `segment` 为空或为有效的 Segment.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(segment: *mut FfiSegment, $value: $ty) {
            if let Some(segment) = unsafe { segment.as_mut() } {
                guard((), || segment.segment.$setter($value));
            }
        }
    };
}

macro_rules! segment_string_setter {
    ($(#[$doc:meta])* $name:ident => $setter:ident) => {
        $(#[$doc])*
        ///
        /// 空指针或非 UTF-8 字符串被忽略.
        ///
        /// # Safety
        ///
        /// `segment` 为空或为有效的 Segment; `value` 为空或为有效的 C 字符串.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name(segment: *mut FfiSegment, value: *const c_char) {
            let Some(segment) = (unsafe { segment.as_mut() }) else {
                return;
            };
            match unsafe { c_str(value) } {
                Some(value) => guard((), || segment.segment.$setter(value)),
                None => warn!("{}: 字符串无效, 忽略", stringify!($name)),
            }
        }
    };
}

segment_setter! {
    /// 设置时长 (时间码单位)
    mux_set_duration(duration: f64) => set_duration
}
segment_setter! {
    /// 设置时间码刻度 (纳秒/单位)
    mux_set_timecode_scale(scale: u64) => set_timecode_scale
}
segment_setter! {
    /// 设置创建时间 (相对 2001-01-01 的纳秒数)
    mux_set_date_utc(date_utc: i64) => set_date_utc
}
segment_string_setter! {
    /// 设置 MuxingApp
    mux_set_muxing_app => set_muxing_app
}
segment_string_setter! {
    /// 设置 WritingApp
    mux_set_writing_app => set_writing_app
}
segment_string_setter! {
    /// 设置标题
    mux_set_title => set_title
}

/// 完成 Segment
///
/// `duration` 非 0 时以时间码单位覆盖总时长. 无论成功与否 Segment 都不能再写入.
///
/// # Safety
///
/// `segment` 为空或为有效的 Segment, 其写入端仍然存活.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_finalize_segment(segment: *mut FfiSegment, duration: u64) -> bool {
    let Some(segment) = (unsafe { segment.as_mut() }) else {
        return false;
    };
    let duration = (duration != 0).then_some(duration);
    guard(false, || {
        report("mux_finalize_segment", segment.segment.finalize(duration))
    })
}

// ========================
// 轨道
// ========================

impl FfiSegment {
    fn register_track(&mut self, number: TrackNumber, track_type: TrackType) -> *mut MuxTrack {
        let owner: *mut Segment<'static> = &mut self.segment;
        let mut track = Box::new(MuxTrack {
            owner,
            number,
            track_type,
        });
        let handle: *mut MuxTrack = &mut *track;
        self.tracks.push(track);
        handle
    }

    fn owns(&self, track: &MuxTrack) -> bool {
        std::ptr::eq(track.owner.cast_const(), &self.segment)
    }
}

/// 添加视频轨道
///
/// `number` 为 0 时自动分配. 尺寸或轨道号为负、编解码器未知或轨道号冲突时返回空指针.
///
/// # Safety
///
/// `segment` 为空或为有效的 Segment.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_segment_add_video_track(
    segment: *mut FfiSegment,
    width: i32,
    height: i32,
    number: i32,
    codec_id: u32,
) -> *mut MuxTrack {
    let Some(segment) = (unsafe { segment.as_mut() }) else {
        return std::ptr::null_mut();
    };
    let (Ok(width), Ok(height), Ok(number)) =
        (u32::try_from(width), u32::try_from(height), u64::try_from(number))
    else {
        debug!("mux_segment_add_video_track: 参数为负");
        return std::ptr::null_mut();
    };
    let Ok(codec) = VideoCodec::try_from(codec_id) else {
        debug!("mux_segment_add_video_track: 未知编解码器 {codec_id}");
        return std::ptr::null_mut();
    };
    guard(std::ptr::null_mut(), || {
        match segment.segment.add_video_track(width, height, number, codec) {
            Ok(number) => segment.register_track(number, TrackType::Video),
            Err(e) => {
                debug!("mux_segment_add_video_track 失败: {e}");
                std::ptr::null_mut()
            }
        }
    })
}

/// 添加音频轨道
///
/// `number` 为 0 时自动分配. 参数为负、编解码器未知或轨道号冲突时返回空指针.
///
/// # Safety
///
/// `segment` 为空或为有效的 Segment.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_segment_add_audio_track(
    segment: *mut FfiSegment,
    sample_rate: i32,
    channels: i32,
    number: i32,
    codec_id: u32,
) -> *mut MuxTrack {
    let Some(segment) = (unsafe { segment.as_mut() }) else {
        return std::ptr::null_mut();
    };
    let (Ok(sample_rate), Ok(channels), Ok(number)) = (
        u32::try_from(sample_rate),
        u32::try_from(channels),
        u64::try_from(number),
    ) else {
        debug!("mux_segment_add_audio_track: 参数为负");
        return std::ptr::null_mut();
    };
    let Ok(codec) = AudioCodec::try_from(codec_id) else {
        debug!("mux_segment_add_audio_track: 未知编解码器 {codec_id}");
        return std::ptr::null_mut();
    };
    guard(std::ptr::null_mut(), || {
        match segment
            .segment
            .add_audio_track(sample_rate, channels, number, codec)
        {
            Ok(number) => segment.register_track(number, TrackType::Audio),
            Err(e) => {
                debug!("mux_segment_add_audio_track 失败: {e}");
                std::ptr::null_mut()
            }
        }
    })
}

fn base_of(track: *mut MuxTrack, expected: TrackType) -> *mut MuxTrack {
    // 安全: 非空的轨道句柄由调用方保证有效
    match unsafe { track.as_ref() } {
        Some(t) if t.track_type == expected => track,
        _ => std::ptr::null_mut(),
    }
}

/// 视频轨道 → 通用轨道句柄, 类型不符时返回空指针
///
/// # Safety
///
/// `video` 为空或为有效的轨道句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_video_track_base_mut(video: *mut MuxTrack) -> *mut MuxTrack {
    base_of(video, TrackType::Video)
}

/// 音频轨道 → 通用轨道句柄, 类型不符时返回空指针
///
/// # Safety
///
/// `audio` 为空或为有效的轨道句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_audio_track_base_mut(audio: *mut MuxTrack) -> *mut MuxTrack {
    base_of(audio, TrackType::Audio)
}

/// 只读版本的 [`mux_video_track_base_mut`]
///
/// # Safety
///
/// `video` 为空或为有效的轨道句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_video_track_base_const(video: *const MuxTrack) -> *const MuxTrack {
    base_of(video.cast_mut(), TrackType::Video).cast_const()
}

/// 只读版本的 [`mux_audio_track_base_mut`]
///
/// # Safety
///
/// `audio` 为空或为有效的轨道句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_audio_track_base_const(audio: *const MuxTrack) -> *const MuxTrack {
    base_of(audio.cast_mut(), TrackType::Audio).cast_const()
}

/// 轨道号, 空句柄返回 0
///
/// # Safety
///
/// `track` 为空或为有效的轨道句柄.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_track_number(track: *const MuxTrack) -> u64 {
    unsafe { track.as_ref() }.map_or(0, |t| t.number.get())
}

/// 设置视频轨道色彩描述, 成功返回 1, 失败返回 0
///
/// `full_range` 非 0 表示完整范围, 否则为广播范围.
///
/// # Safety
///
/// `video` 为空或为有效的轨道句柄, 且所属 Segment 仍然存活.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_set_color(
    video: *mut MuxTrack,
    bits: c_int,
    sampling_horiz: c_int,
    sampling_vert: c_int,
    full_range: c_int,
) -> c_int {
    let Some(video) = (unsafe { video.as_ref() }) else {
        return 0;
    };
    let (Ok(bits), Ok(horz), Ok(vert)) = (
        u64::try_from(bits),
        u64::try_from(sampling_horiz),
        u64::try_from(sampling_vert),
    ) else {
        return 0;
    };
    let colour = Colour::new(bits, horz, vert, full_range != 0);
    let ok = guard(false, || unsafe {
        video.with_segment(|segment, number| {
            report("mux_set_color", segment.set_colour(number, colour))
        })
    });
    c_int::from(ok)
}

/// 设置视频轨道色彩矩阵系数
///
/// # Safety
///
/// `video` 为空或为有效的轨道句柄, 且所属 Segment 仍然存活.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_set_colour_matrix_coefficients_id(
    video: *mut MuxTrack,
    matrix_coefficients: u64,
) -> bool {
    let Some(video) = (unsafe { video.as_ref() }) else {
        return false;
    };
    guard(false, || unsafe {
        video.with_segment(|segment, number| {
            report(
                "mux_set_colour_matrix_coefficients_id",
                segment.set_colour_matrix_coefficients(number, matrix_coefficients),
            )
        })
    })
}

/// 设置编解码器私有数据
///
/// # Safety
///
/// `track` 为空或为有效的轨道句柄; `data` 为空 (此时 `len` 须为 0)
/// 或指向至少 `len` 字节.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_set_codec_private(
    track: *mut MuxTrack,
    data: *const u8,
    len: usize,
) -> bool {
    let Some(track) = (unsafe { track.as_ref() }) else {
        return false;
    };
    let data: &[u8] = match (data.is_null(), len) {
        (true, 0) => &[],
        (true, _) => return false,
        (false, _) => unsafe { std::slice::from_raw_parts(data, len) },
    };
    guard(false, || unsafe {
        track.with_segment(|segment, number| {
            report("mux_set_codec_private", segment.set_codec_private(number, data))
        })
    })
}

/// 写入一帧
///
/// 空句柄、轨道不属于该 Segment 或写入失败时返回 false.
///
/// # Safety
///
/// 句柄为空或有效; `frame` 为空 (此时 `length` 须为 0) 或指向至少 `length` 字节.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mux_segment_add_frame(
    segment: *mut FfiSegment,
    track: *const MuxTrack,
    frame: *const u8,
    length: usize,
    timestamp_ns: u64,
    keyframe: bool,
) -> bool {
    let (Some(segment), Some(track)) = (unsafe { segment.as_mut() }, unsafe { track.as_ref() })
    else {
        return false;
    };
    if !segment.owns(track) {
        debug!("mux_segment_add_frame: 轨道 #{} 不属于该 Segment", track.number);
        return false;
    }
    let payload: &[u8] = match (frame.is_null(), length) {
        (true, 0) => &[],
        (true, _) => return false,
        (false, _) => unsafe { std::slice::from_raw_parts(frame, length) },
    };
    let number = track.number;
    guard(false, || {
        report(
            "mux_segment_add_frame",
            segment.segment.add_frame(number, payload, timestamp_ns, keyframe),
        )
    })
}

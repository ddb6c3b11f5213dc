//! webmux-probe - WebM 信息探测工具
//!
//! 通过读取适配器打开 WebM 文件, 输出 Segment 信息、轨道、帧统计与索引.

use std::collections::BTreeMap;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use webmux::core::timecode::date_utc_to_unix_ns;
use webmux::core::{Timecode, TrackType, WebmError};
use webmux::format::io::IoReader;
use webmux::format::{TrackInfo, WebmReader};
use webmux::logging::{self, LoggingConfig};

/// webmux WebM 信息探测工具
#[derive(Parser, Debug)]
#[command(name = "webmux-probe", version, about = "纯 Rust WebM 信息探测工具")]
struct Cli {
    /// 输入文件路径
    input: String,

    /// 显示帧统计 (会读取全部帧)
    #[arg(long)]
    show_frames: bool,

    /// 显示索引点 (Cues)
    #[arg(long)]
    show_cues: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 日志级别
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// 输出结构体
// ============================================================

#[derive(Serialize)]
struct ProbeOutput {
    format: FormatInfo,
    tracks: Vec<TrackOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<FrameSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cues: Option<Vec<CueOutput>>,
}

#[derive(Serialize)]
struct FormatInfo {
    filename: String,
    doc_type: String,
    timecode_scale: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    muxing_app: String,
    writing_app: String,
}

#[derive(Serialize)]
struct TrackOutput {
    number: u64,
    codec_type: String,
    codec_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    codec_private_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

/// 单轨道帧统计
#[derive(Serialize, Default)]
struct FrameSummary {
    track: u64,
    frames: u64,
    keyframes: u64,
    bytes: u64,
    first_ns: Option<u64>,
    last_ns: Option<u64>,
}

#[derive(Serialize)]
struct CueOutput {
    time: u64,
    /// 索引时间 (秒)
    seconds: f64,
    #[serde(skip)]
    timecode: Timecode,
    track: u64,
    cluster_position: u64,
    block_number: u64,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    logging::init(LoggingConfig {
        level: cli.log_level.clone(),
        ..LoggingConfig::default()
    })?;

    if !cli.quiet {
        eprintln!("webmux-probe 版本 {}", env!("CARGO_PKG_VERSION"));
        eprintln!("输入文件: {}", cli.input);
    }

    let source = IoReader::open(&cli.input)
        .with_context(|| format!("无法打开文件 '{}'", cli.input))?;
    let mut reader = WebmReader::open(source).context("无法解析 WebM 头部")?;

    let info = reader.info();
    let format = FormatInfo {
        filename: cli.input.clone(),
        doc_type: reader.doc_type().to_string(),
        timecode_scale: info.timecode_scale,
        duration: reader.duration_ns().map(|ns| ns as f64 / 1e9),
        date: info.date_utc.and_then(format_date),
        title: info.title.clone(),
        muxing_app: info.muxing_app.clone(),
        writing_app: info.writing_app.clone(),
    };
    let tracks = reader.tracks().iter().map(build_track_output).collect();

    // Cues 可能位于文件末尾, 需要先读完全部帧
    let frames = if cli.show_frames || cli.show_cues {
        Some(summarize_frames(&mut reader)?)
    } else {
        None
    };
    let timecode_scale = reader.info().timecode_scale;
    let cues = cli.show_cues.then(|| {
        reader
            .cue_points()
            .iter()
            .map(|c| {
                let timecode = Timecode {
                    value: c.time,
                    scale: timecode_scale,
                };
                CueOutput {
                    time: c.time,
                    seconds: timecode.to_seconds(),
                    timecode,
                    track: c.track.get(),
                    cluster_position: c.cluster_position,
                    block_number: c.block_number,
                }
            })
            .collect::<Vec<_>>()
    });

    let output = ProbeOutput {
        format,
        tracks,
        frames: frames.filter(|_| cli.show_frames),
        cues,
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

fn format_date(date_utc: i64) -> Option<String> {
    let unix_ns = date_utc_to_unix_ns(date_utc);
    let secs = unix_ns.div_euclid(1_000_000_000);
    let nanos = unix_ns.rem_euclid(1_000_000_000) as u32;
    chrono::DateTime::from_timestamp(secs, nanos).map(|t| t.to_rfc3339())
}

fn build_track_output(track: &TrackInfo) -> TrackOutput {
    let codec_type = match track.track_type {
        Some(TrackType::Video) => "video",
        Some(TrackType::Audio) => "audio",
        None => "unknown",
    }
    .to_string();
    TrackOutput {
        number: track.number,
        codec_type,
        codec_id: track.codec_id.clone(),
        codec_private_size: track.codec_private.as_ref().map(Vec::len),
        width: track.video.as_ref().map(|v| v.width),
        height: track.video.as_ref().map(|v| v.height),
        sample_rate: track.audio.as_ref().map(|a| a.sample_rate),
        channels: track.audio.as_ref().map(|a| a.channels),
        language: track.language.clone(),
    }
}

fn summarize_frames<R: webmux::format::MkvReader>(
    reader: &mut WebmReader<R>,
) -> Result<Vec<FrameSummary>> {
    let mut per_track: BTreeMap<u64, FrameSummary> = BTreeMap::new();
    loop {
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(WebmError::Unsupported(what)) => {
                log::warn!("停止读取: 不支持 {what}");
                break;
            }
            Err(e) => return Err(e).context("读取帧失败"),
        };
        let summary = per_track.entry(frame.track_number).or_default();
        summary.track = frame.track_number;
        summary.frames += 1;
        summary.bytes += frame.data.len() as u64;
        if frame.keyframe {
            summary.keyframes += 1;
        }
        summary.first_ns.get_or_insert(frame.timestamp_ns);
        summary.last_ns = Some(frame.timestamp_ns);
    }
    Ok(per_track.into_values().collect())
}

// ============================================================
// 文本输出
// ============================================================

fn print_text(output: &ProbeOutput) {
    let format = &output.format;
    println!("[FORMAT]");
    println!("  文件名       : {}", format.filename);
    println!("  DocType      : {}", format.doc_type);
    println!("  时间码刻度   : {} ns", format.timecode_scale);
    if let Some(duration) = format.duration {
        println!("  时长         : {duration:.3} 秒");
    }
    if let Some(ref date) = format.date {
        println!("  创建时间     : {date}");
    }
    if let Some(ref title) = format.title {
        println!("  标题         : {title}");
    }
    println!("  MuxingApp    : {}", format.muxing_app);
    println!("  WritingApp   : {}", format.writing_app);
    println!("[/FORMAT]");
    println!();

    for track in &output.tracks {
        println!("[TRACK #{}]", track.number);
        println!("  类型         : {}", track.codec_type);
        println!("  CodecID      : {}", track.codec_id);
        if let Some(size) = track.codec_private_size {
            println!("  私有数据     : {size} 字节");
        }
        if let (Some(w), Some(h)) = (track.width, track.height) {
            println!("  分辨率       : {w}x{h}");
        }
        if let Some(sr) = track.sample_rate {
            println!("  采样率       : {sr} Hz");
        }
        if let Some(ch) = track.channels {
            println!("  声道数       : {ch}");
        }
        if let Some(ref lang) = track.language {
            println!("  语言         : {lang}");
        }
        println!("[/TRACK]");
        println!();
    }

    if let Some(ref frames) = output.frames {
        println!("[FRAMES]");
        for s in frames {
            println!(
                "  轨道 #{:<3}: {} 帧 ({} 关键帧), {} 字节",
                s.track, s.frames, s.keyframes, s.bytes
            );
        }
        println!("[/FRAMES]");
        println!();
    }

    if let Some(ref cues) = output.cues {
        println!("[CUES]");
        for c in cues {
            println!(
                "  时间码 {:<10} ({}) 轨道 #{} Cluster @{} 块 {}",
                c.time, c.timecode, c.track, c.cluster_position, c.block_number
            );
        }
        println!("[/CUES]");
        println!();
    }
}

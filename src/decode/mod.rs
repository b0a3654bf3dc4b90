//! 解码协作方
//!
//! 播放引擎不直接解析音频文件，而是通过 `DecoderBackend` 打开资源，
//! 从 `DecodeSession` 中按块拉取交错的 f32 样本。
//! 所有时间 ↔ 帧换算都以参考采样率（默认 44100 Hz）为准。

mod decoder;
mod memory;

pub use decoder::{AudioDecoder, AudioInfo, SymphoniaBackend};
pub use memory::MemoryBackend;

/// 参考采样率
pub const REFERENCE_RATE: u32 = 44_100;

/// 帧数 → 秒
pub fn frames_to_secs(frames: u64, rate: u32) -> f64 {
    frames as f64 / rate as f64
}

/// 秒 → 帧数（四舍五入，负值按 0 处理）
pub fn secs_to_frames(secs: f64, rate: u32) -> u64 {
    if !(secs > 0.0) {
        return 0;
    }
    (secs * rate as f64).round() as u64
}

/// 解码错误
#[derive(Debug)]
pub enum DecodeError {
    /// 文件打开失败
    FileOpen(std::io::Error),
    /// 资源不存在（内存解码器）
    UnknownAsset(String),
    /// 格式不支持
    UnsupportedFormat,
    /// 没有找到音频轨道
    NoAudioTrack,
    /// 资源采样率与参考采样率不一致
    SampleRateMismatch { expected: u32, found: u32 },
    /// 解码器创建失败
    DecoderCreation(String),
    /// 解码失败
    DecodeFailed(String),
    /// Seek 失败
    SeekFailed(String),
    /// 流在到达目标位置之前结束
    UnexpectedEnd,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileOpen(e) => write!(f, "Failed to open file: {}", e),
            Self::UnknownAsset(s) => write!(f, "Unknown asset: {}", s),
            Self::UnsupportedFormat => write!(f, "Unsupported audio format"),
            Self::NoAudioTrack => write!(f, "No audio track found"),
            Self::SampleRateMismatch { expected, found } => write!(
                f,
                "Sample rate mismatch: expected {} Hz, found {} Hz",
                expected, found
            ),
            Self::DecoderCreation(s) => write!(f, "Failed to create decoder: {}", s),
            Self::DecodeFailed(s) => write!(f, "Decode failed: {}", s),
            Self::SeekFailed(s) => write!(f, "Seek failed: {}", s),
            Self::UnexpectedEnd => write!(f, "Stream ended before the requested position"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileOpen(e) => Some(e),
            _ => None,
        }
    }
}

/// 一个解码块
///
/// `samples` 为交错样本，声道数由打开会话时的后端配置决定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeBlock<'a> {
    pub samples: &'a [f32],
    /// 块起点（秒）
    pub start: f64,
    /// 块时长（秒）
    pub duration: f64,
}

impl DecodeBlock<'_> {
    pub fn frames(&self, channels: usize) -> usize {
        if channels == 0 {
            0
        } else {
            self.samples.len() / channels
        }
    }
}

/// 打开的解码会话（对应一个资源）
pub trait DecodeSession: Send {
    /// Seek 到指定时间（秒）
    ///
    /// 之后返回的第一个块可能从目标位置之前开始，调用方负责丢弃多余的部分
    fn seek(&mut self, time_secs: f64) -> Result<(), DecodeError>;

    /// 拉取下一块，`None` 表示流结束
    fn next_block(&mut self) -> Result<Option<DecodeBlock<'_>>, DecodeError>;

    /// 释放底层资源，之后不应再调用
    fn close(&mut self) {}
}

/// 解码后端：按资源引用打开会话
pub trait DecoderBackend: Send + Sync {
    fn open(&self, asset: &str) -> Result<Box<dyn DecodeSession>, DecodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_time_conversion() {
        assert_eq!(frames_to_secs(44_100, REFERENCE_RATE), 1.0);
        assert_eq!(secs_to_frames(0.5, REFERENCE_RATE), 22_050);
        assert_eq!(secs_to_frames(-1.0, REFERENCE_RATE), 0);
        assert_eq!(secs_to_frames(f64::NAN, REFERENCE_RATE), 0);

        for frames in [0u64, 1, 999, 44_099, 1_234_567] {
            let secs = frames_to_secs(frames, REFERENCE_RATE);
            assert_eq!(secs_to_frames(secs, REFERENCE_RATE), frames);
        }
    }

    #[test]
    fn test_block_frames() {
        let samples = [0.0f32; 12];
        let block = DecodeBlock {
            samples: &samples,
            start: 0.0,
            duration: 0.0,
        };
        assert_eq!(block.frames(2), 6);
        assert_eq!(block.frames(0), 0);
    }
}

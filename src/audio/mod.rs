//! 音频输出侧模块
//!
//! 包含：
//! - Format: PCM 样本打包
//! - Sink: 帧输出端（文件 / 丢弃）
//! - Stats: 播放统计

pub mod format;
pub mod sink;
pub mod stats;

pub use format::PcmFormat;
pub use sink::{FrameSink, NullSink, PcmFileSink};
pub use stats::{QueueStats, StatsReport};

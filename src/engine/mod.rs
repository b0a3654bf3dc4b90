//! 播放引擎
//!
//! 自底向上：
//! - `SegmentPlayer`: 单个段的采样级精确窗口读取
//! - `GraphPlayer`: 一张图的播放游标与转移状态机
//! - `PlaybackQueue`: 把多张图串接为一条连续输出流
//! - `Renderer`: 输出时钟线程，周期性调用 `process`
//!
//! 实时路径（`process`）不加锁；图通过 crossbeam channel 从控制线程交给实时线程。

mod callbacks;
mod graph_player;
mod queue;
mod renderer;
mod segment_player;

#[cfg(test)]
pub(crate) mod testing;

use std::str::FromStr;

use thiserror::Error;

use crate::decode::{DecodeError, REFERENCE_RATE};
use crate::graph::GraphError;

pub use callbacks::{
    failure_fn, trigger_fn, FailureFn, FailureSink, FixedTrigger, LogFailures, PlaybackContext,
    ScriptedTrigger, TriggerFn, TriggerSource,
};
pub use graph_player::{Cursor, GraphPlayer, PlayerState};
pub use queue::{PlaybackQueue, QueueClosed, QueueHandle};
pub use renderer::{RenderSummary, Renderer, RendererConfig};
pub use segment_player::SegmentPlayer;

/// 触发标签查不到出边时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// 从头重放当前段
    #[default]
    Replay,
    /// 结束这张图
    Stop,
}

impl FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replay" => Ok(Self::Replay),
            "stop" => Ok(Self::Stop),
            _ => Err(format!("unknown policy '{}' (expected replay or stop)", s)),
        }
    }
}

/// 播放器配置
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// 输出声道数
    pub channels: usize,
    /// 参考采样率，所有 时间 ↔ 帧 换算以此为准
    pub reference_rate: u32,
    pub unresolved: UnresolvedPolicy,
    /// 段播放器的块缓冲区预分配大小（帧）
    pub block_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            reference_rate: REFERENCE_RATE,
            unresolved: UnresolvedPolicy::Replay,
            block_capacity: 8192,
        }
    }
}

/// 运行时失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidArgument,
    NotFound,
    DecodeFailure,
    UnresolvedTransition,
}

/// 运行时失败，经由 `FailureSink` 上报
#[derive(Debug, Error)]
pub enum Failure {
    #[error("graph '{graph}': {source}")]
    Graph {
        graph: String,
        #[source]
        source: GraphError,
    },
    #[error("graph '{graph}': decoding '{asset}' failed: {source}")]
    Decode {
        graph: String,
        asset: String,
        #[source]
        source: DecodeError,
    },
    #[error("graph '{graph}': no transition for trigger '{trigger}' from segment '{segment}'")]
    UnresolvedTransition {
        graph: String,
        segment: String,
        trigger: String,
    },
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Graph {
                source: GraphError::InvalidArgument(_),
                ..
            } => FailureKind::InvalidArgument,
            Self::Graph {
                source: GraphError::NotFound(_),
                ..
            } => FailureKind::NotFound,
            Self::Decode { .. } => FailureKind::DecodeFailure,
            Self::UnresolvedTransition { .. } => FailureKind::UnresolvedTransition,
        }
    }
}

//! 播放队列
//!
//! 先进先出地串接多张图，输出一条连续的帧流：
//! - `process` 在实时线程调用，每次恰好产出请求的帧数，不足部分补静音
//! - 控制线程通过 `QueueHandle` 投递命令，`process` 开头用 `try_recv` 取出
//! - 结束或被移除的图经回收通道交还控制线程，在那里关闭解码会话

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::audio::QueueStats;
use crate::decode::DecoderBackend;
use crate::graph::Graph;

use super::callbacks::{FailureSink, LogFailures, PlaybackContext, TriggerSource};
use super::graph_player::{GraphPlayer, PlayerState};
use super::PlayerConfig;

/// 回收通道容量；满了就在实时线程上就地关闭
const RETIRED_CAPACITY: usize = 32;

/// 控制线程 → 实时线程的命令
enum QueueCommand {
    Enqueue(Box<GraphPlayer>),
    /// 移除尚未开始播放的同名图
    RemovePending(String),
    ClearPending,
}

/// 队列已被丢弃，命令无法送达
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("playback queue is closed")]
pub struct QueueClosed;

pub struct PlaybackQueue {
    players: VecDeque<Box<GraphPlayer>>,
    commands: Receiver<QueueCommand>,
    sender: Sender<QueueCommand>,
    retired: Sender<Box<GraphPlayer>>,
    reclaim: Receiver<Box<GraphPlayer>>,
    backend: Arc<dyn DecoderBackend>,
    config: PlayerConfig,
    trigger: Box<dyn TriggerSource>,
    failures: Box<dyn FailureSink>,
    stats: Arc<QueueStats>,
}

impl PlaybackQueue {
    pub fn new(
        backend: Arc<dyn DecoderBackend>,
        mut config: PlayerConfig,
        trigger: impl TriggerSource + 'static,
    ) -> Self {
        config.channels = config.channels.max(1);
        let (sender, commands) = crossbeam_channel::unbounded();
        let (retired, reclaim) = crossbeam_channel::bounded(RETIRED_CAPACITY);
        Self {
            players: VecDeque::new(),
            commands,
            sender,
            retired,
            reclaim,
            backend,
            config,
            trigger: Box::new(trigger),
            failures: Box::new(LogFailures),
            stats: Arc::new(QueueStats::new()),
        }
    }

    pub fn with_failure_sink(mut self, failures: impl FailureSink + 'static) -> Self {
        self.failures = Box::new(failures);
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// 控制句柄（可克隆，可跨线程）
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            sender: self.sender.clone(),
            reclaim: self.reclaim.clone(),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }

    /// 直接入队（调用方持有队列时使用）
    pub fn enqueue(&mut self, graph: Graph) {
        let mut player = GraphPlayer::new(graph, Arc::clone(&self.backend), self.config.clone());
        player.prepare();
        log::debug!("Enqueued graph '{}'", player.graph().id());
        self.players.push_back(Box::new(player));
    }

    /// 队列中（含正在播放）的图数量
    pub fn len(&mut self) -> usize {
        self.drain_commands();
        self.players.len()
    }

    pub fn is_idle(&mut self) -> bool {
        self.len() == 0
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                QueueCommand::Enqueue(player) => {
                    log::debug!("Enqueued graph '{}'", player.graph().id());
                    self.players.push_back(player);
                }
                QueueCommand::RemovePending(id) => {
                    self.remove_pending_where(|player| player.graph().id() == id);
                }
                QueueCommand::ClearPending => {
                    self.remove_pending_where(|_| true);
                }
            }
        }
    }

    /// 移除满足条件且尚未开始播放的图
    fn remove_pending_where(&mut self, pred: impl Fn(&GraphPlayer) -> bool) {
        let mut i = 0;
        while i < self.players.len() {
            let player = &self.players[i];
            if player.state() == PlayerState::Idle && pred(player) {
                if let Some(player) = self.players.remove(i) {
                    log::debug!("Removed pending graph '{}'", player.graph().id());
                    retire(&self.retired, player);
                }
            } else {
                i += 1;
            }
        }
    }

    /// 产出 `output.len() / channels` 帧，返回帧数
    ///
    /// 队列为空或所有图都结束后，剩余部分填充静音
    pub fn process(&mut self, output: &mut [f32]) -> usize {
        self.drain_commands();

        let channels = self.config.channels;
        let frames = output.len() / channels;
        let mut written = 0;

        let mut ctx = PlaybackContext {
            trigger: self.trigger.as_mut(),
            failures: self.failures.as_mut(),
            stats: &self.stats,
        };

        while written < frames {
            let Some(player) = self.players.front_mut() else {
                break;
            };

            written += player.advance(
                &mut output[written * channels..frames * channels],
                frames - written,
                &mut ctx,
            );

            if player.state() == PlayerState::Done {
                ctx.stats.record_graph_completed();
                if let Some(player) = self.players.pop_front() {
                    retire(&self.retired, player);
                }
            } else if written < frames {
                // 图未结束却没有填满，不会发生；避免死循环
                log::warn!("Graph '{}' stalled", player.graph().id());
                break;
            }
        }

        // 尾部静音（含 frames 之外的零头样本）
        output[written * channels..].fill(0.0);
        self.stats
            .record_process(frames as u64, (frames - written) as u64);

        frames
    }
}

/// 把结束的图交给回收通道；没有空位时就地关闭会话
fn retire(retired: &Sender<Box<GraphPlayer>>, player: Box<GraphPlayer>) {
    if let Err(e) = retired.try_send(player) {
        let mut player = e.into_inner();
        log::debug!(
            "Retired queue full, closing graph '{}' in place",
            player.graph().id()
        );
        player.flush();
    }
}

/// 队列的控制句柄
///
/// 在非实时线程使用：入队时预先打开解码会话，实时线程只负责取走
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<QueueCommand>,
    reclaim: Receiver<Box<GraphPlayer>>,
    backend: Arc<dyn DecoderBackend>,
    config: PlayerConfig,
}

impl QueueHandle {
    pub fn enqueue(&self, graph: Graph) -> Result<(), QueueClosed> {
        let mut player = GraphPlayer::new(graph, Arc::clone(&self.backend), self.config.clone());
        player.prepare();
        self.sender
            .send(QueueCommand::Enqueue(Box::new(player)))
            .map_err(|_| QueueClosed)
    }

    /// 移除尚未开始播放的图（已在播放的不受影响）
    pub fn remove_pending(&self, graph_id: impl Into<String>) -> Result<(), QueueClosed> {
        self.sender
            .send(QueueCommand::RemovePending(graph_id.into()))
            .map_err(|_| QueueClosed)
    }

    pub fn clear_pending(&self) -> Result<(), QueueClosed> {
        self.sender
            .send(QueueCommand::ClearPending)
            .map_err(|_| QueueClosed)
    }

    /// 取回已结束（或被移除）的图，并在当前线程关闭它们的解码会话
    ///
    /// 应定期调用，否则回收通道满后会话改在实时线程上关闭
    pub fn collect_finished(&self) -> Vec<Graph> {
        self.reclaim
            .try_iter()
            .map(|player| player.into_graph())
            .collect()
    }
}

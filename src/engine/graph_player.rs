//! 图播放器
//!
//! 状态机：`Idle → Streaming → Done`
//!
//! 段读完时：
//! - 终止段：进入 `Done`
//! - 否则向应用要一个触发标签，按标签解析出边，跳到目标段继续填充
//!   （一次 `advance` 可以连续跨越多个段）
//! - 解析失败：上报一次，再按 `UnresolvedPolicy` 重放当前段或结束

use std::collections::HashMap;
use std::sync::Arc;

use crate::decode::{DecodeError, DecodeSession, DecoderBackend};
use crate::graph::{Graph, GraphError, SegmentKey};

use super::callbacks::PlaybackContext;
use super::segment_player::SegmentPlayer;
use super::{Failure, PlayerConfig, UnresolvedPolicy};

/// 单次 `advance` 内连续出现空段的上限，超过即判定解码器无法前进
const MAX_EMPTY_SEGMENTS: usize = 64;

/// 图播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Streaming,
    Done,
}

/// 某个资源的解码会话缓存
enum SessionSlot {
    Empty,
    Open(Box<dyn DecodeSession>),
    /// `prepare` 时打开失败，激活到该资源的段时上报
    Failed(DecodeError),
}

/// 播放游标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub segment: SegmentKey,
    /// 资源内帧位置
    pub position: u64,
}

pub struct GraphPlayer {
    graph: Graph,
    backend: Arc<dyn DecoderBackend>,
    config: PlayerConfig,
    state: PlayerState,
    current: Option<SegmentPlayer>,
    /// 每个资源一个解码会话，段之间复用
    sessions: Vec<SessionSlot>,
    asset_slots: HashMap<String, usize>,
    /// 已调用过 `prepare`：之后不再在播放路径上打开资源
    prepared: bool,
}

impl GraphPlayer {
    pub fn new(graph: Graph, backend: Arc<dyn DecoderBackend>, mut config: PlayerConfig) -> Self {
        config.channels = config.channels.max(1);
        let asset_slots: HashMap<String, usize> = graph
            .assets()
            .into_iter()
            .enumerate()
            .map(|(slot, asset)| (asset.to_string(), slot))
            .collect();
        let sessions = (0..asset_slots.len()).map(|_| SessionSlot::Empty).collect();

        Self {
            graph,
            backend,
            config,
            state: PlayerState::Idle,
            current: None,
            sessions,
            asset_slots,
            prepared: false,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.current.as_ref().map(|player| Cursor {
            segment: player.segment(),
            position: player.position(),
        })
    }

    /// 预先打开所有资源的解码会话
    ///
    /// 在非实时线程调用。之后播放路径不再打开资源：
    /// 打不开的资源在播放到它时作为解码失败上报。
    /// 未调用 `prepare` 时，段在激活时才打开资源。
    pub fn prepare(&mut self) {
        self.prepared = true;
        for (asset, &slot) in &self.asset_slots {
            if matches!(self.sessions[slot], SessionSlot::Open(_)) {
                continue;
            }
            self.sessions[slot] = match self.backend.open(asset) {
                Ok(session) => SessionSlot::Open(session),
                Err(e) => {
                    log::warn!(
                        "Graph '{}': could not pre-open '{}': {}",
                        self.graph.id(),
                        asset,
                        e
                    );
                    SessionSlot::Failed(e)
                }
            };
        }
    }

    /// 激活：游标指向起始段，定位到段首
    pub fn activate(&mut self, ctx: &mut PlaybackContext<'_>) {
        if self.state != PlayerState::Idle {
            return;
        }

        let initial = match self.graph.validate() {
            Ok(key) => key,
            Err(source) => {
                ctx.report(Failure::Graph {
                    graph: self.graph.id().to_string(),
                    source,
                });
                self.finish();
                return;
            }
        };

        self.state = PlayerState::Streaming;
        self.graph.set_playing(true);
        ctx.stats.record_graph_started();
        log::info!("Graph '{}' started", self.graph.id());

        self.enter(initial, ctx);
    }

    /// 填充至多 `frames` 帧，返回实际写入的帧数
    ///
    /// 返回值少于请求值时图已结束；`Done` 之后调用返回 0
    pub fn advance(
        &mut self,
        output: &mut [f32],
        frames: usize,
        ctx: &mut PlaybackContext<'_>,
    ) -> usize {
        if self.state == PlayerState::Idle {
            self.activate(ctx);
        }
        if self.state != PlayerState::Streaming {
            return 0;
        }

        let channels = self.config.channels;
        let frames = frames.min(output.len() / channels);
        let mut written = 0;
        let mut empty_segments = 0;

        while self.state == PlayerState::Streaming {
            let Some(player) = self.current.as_mut() else {
                self.finish();
                break;
            };

            let n = match player.fill(&mut output[written * channels..], frames - written) {
                Ok(n) => n,
                Err(source) => {
                    self.report_decode(self.current_segment(), source, ctx);
                    self.finish();
                    break;
                }
            };
            written += n;

            // 已写出的帧计入返回值，下一轮 fill 返回错误
            if player.has_pending_error() {
                continue;
            }

            if !player.is_exhausted() {
                break;
            }

            if n == 0 {
                empty_segments += 1;
                if empty_segments > MAX_EMPTY_SEGMENTS {
                    self.report_decode(self.current_segment(), DecodeError::UnexpectedEnd, ctx);
                    self.finish();
                    break;
                }
            } else {
                empty_segments = 0;
            }

            self.on_exhausted(ctx);
        }

        written
    }

    fn current_segment(&self) -> Option<SegmentKey> {
        self.current.as_ref().map(SegmentPlayer::segment)
    }

    /// 当前段读完后的转移协议
    fn on_exhausted(&mut self, ctx: &mut PlaybackContext<'_>) {
        let Some(key) = self.current_segment() else {
            self.finish();
            return;
        };
        let Some(segment) = self.graph.segment(key) else {
            self.finish();
            return;
        };

        if segment.is_terminal() {
            log::debug!(
                "Graph '{}': terminal segment '{}' finished",
                self.graph.id(),
                segment.id()
            );
            self.finish();
            return;
        }

        let trigger = ctx.trigger.choose_trigger(&self.graph, segment);
        let target = match self.graph.resolve(key, &trigger) {
            Some(edge) => match self.graph.segment(edge.to()) {
                Some(destination) => {
                    log::debug!(
                        "Graph '{}': '{}' --{}--> '{}'",
                        self.graph.id(),
                        segment.id(),
                        trigger,
                        destination.id()
                    );
                    Ok(destination.key())
                }
                None => Err(Failure::Graph {
                    graph: self.graph.id().to_string(),
                    source: GraphError::NotFound(format!(
                        "destination of edge '{}'",
                        edge.id()
                    )),
                }),
            },
            None => Err(Failure::UnresolvedTransition {
                graph: self.graph.id().to_string(),
                segment: segment.id().to_string(),
                trigger: trigger.into_owned(),
            }),
        };

        match target {
            Ok(destination) => {
                ctx.stats.record_transition();
                self.enter(destination, ctx);
            }
            Err(failure) => {
                ctx.report(failure);
                match self.config.unresolved {
                    UnresolvedPolicy::Replay => self.enter(key, ctx),
                    UnresolvedPolicy::Stop => self.finish(),
                }
            }
        }
    }

    /// 游标移到 `key`：打开（或复用）会话并定位到段首
    fn enter(&mut self, key: SegmentKey, ctx: &mut PlaybackContext<'_>) {
        self.park_current();

        let Some(segment) = self.graph.segment(key) else {
            ctx.report(Failure::Graph {
                graph: self.graph.id().to_string(),
                source: GraphError::NotFound(format!("segment #{}", key.index())),
            });
            self.finish();
            return;
        };

        let cached = match self.asset_slots.get(segment.asset()) {
            Some(&slot) => std::mem::replace(&mut self.sessions[slot], SessionSlot::Empty),
            None => SessionSlot::Empty,
        };
        let session = match cached {
            SessionSlot::Open(session) => Ok(session),
            SessionSlot::Failed(e) => Err(e),
            SessionSlot::Empty if self.prepared => {
                Err(DecodeError::UnknownAsset(segment.asset().to_string()))
            }
            SessionSlot::Empty => self.backend.open(segment.asset()),
        };

        let result = session.and_then(|session| {
            let gain = segment.gain() * self.graph.gain() * self.graph.mix_volume();
            let mut player = SegmentPlayer::open(
                segment,
                session,
                self.config.channels,
                self.config.reference_rate,
                gain,
                self.config.block_capacity,
            );
            player.seek_to_start().map(|()| player)
        });

        match result {
            Ok(player) => self.current = Some(player),
            Err(source) => {
                self.report_decode(Some(key), source, ctx);
                self.finish();
            }
        }
    }

    /// 把当前段的会话放回缓存
    fn park_current(&mut self) {
        let Some(player) = self.current.take() else {
            return;
        };
        let slot = self
            .graph
            .segment(player.segment())
            .and_then(|segment| self.asset_slots.get(segment.asset()).copied());
        match slot {
            Some(slot) => self.sessions[slot] = SessionSlot::Open(player.into_session()),
            None => player.close(),
        }
    }

    #[track_caller]
    fn report_decode(
        &self,
        segment: Option<SegmentKey>,
        source: DecodeError,
        ctx: &mut PlaybackContext<'_>,
    ) {
        let asset = segment
            .and_then(|key| self.graph.segment(key))
            .map(|segment| segment.asset().to_string())
            .unwrap_or_default();
        ctx.report(Failure::Decode {
            graph: self.graph.id().to_string(),
            asset,
            source,
        });
    }

    fn finish(&mut self) {
        if self.state == PlayerState::Done {
            return;
        }
        if self.state == PlayerState::Streaming {
            log::info!("Graph '{}' finished", self.graph.id());
        }
        self.park_current();
        self.graph.set_playing(false);
        self.state = PlayerState::Done;
    }

    /// 关闭所有解码会话
    pub fn flush(&mut self) {
        self.park_current();
        for slot in self.sessions.iter_mut() {
            if let SessionSlot::Open(mut session) = std::mem::replace(slot, SessionSlot::Empty) {
                session.close();
            }
        }
    }

    pub fn into_graph(mut self) -> Graph {
        self.flush();
        self.graph.set_playing(false);
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{flaky_backend, ramp_backend, Recorder};
    use crate::engine::{FailureKind, FixedTrigger, ScriptedTrigger};
    use crate::graph::{EdgeAttributes, GraphAttributes, SegmentAttributes};

    /// a(0..100) -next-> b(500..550, terminal)
    fn two_segment_graph() -> Graph {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(SegmentAttributes::new("a", "ramp").with_window(0, 100))
            .unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("b", "ramp")
                    .with_window(500, 50)
                    .with_terminal(true),
            )
            .unwrap();
        graph
            .create_edge(EdgeAttributes::new("ab", "a", "b", "next"))
            .unwrap();
        graph
    }

    fn mono_config(unresolved: UnresolvedPolicy) -> PlayerConfig {
        PlayerConfig {
            channels: 1,
            unresolved,
            block_capacity: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_traverses_segments_in_one_call() {
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(two_segment_graph(), backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 200];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 200, ctx));

        assert_eq!(written, 150);
        assert_eq!(out[99], 99.0);
        assert_eq!(out[100], 500.0);
        assert_eq!(out[149], 549.0);
        assert_eq!(player.state(), PlayerState::Done);
        assert!(recorder.failures().is_empty());
        assert!(!player.graph().is_playing());

        let report = recorder.stats().report(44_100);
        assert_eq!(report.graphs_started, 1);
        assert_eq!(report.transitions, 1);
    }

    #[test]
    fn test_advance_after_done_is_inert() {
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(two_segment_graph(), backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 200];
        recorder.with_context(|ctx| player.advance(&mut out, 200, ctx));
        let cursor = player.cursor();

        let mut out = vec![7.0; 10];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 10, ctx));
        assert_eq!(written, 0);
        assert_eq!(out, vec![7.0; 10]);
        assert_eq!(player.cursor(), cursor);
    }

    #[test]
    fn test_unresolved_trigger_replays_segment() {
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(two_segment_graph(), backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(ScriptedTrigger::new(["boss"]).with_fallback("next"));

        let mut out = vec![0.0; 260];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 260, ctx));

        // a, a（重放）, b 前 50 帧
        assert_eq!(written, 250);
        assert_eq!(out[99], 99.0);
        assert_eq!(out[100], 0.0);
        assert_eq!(out[199], 99.0);
        assert_eq!(out[200], 500.0);
        assert_eq!(recorder.failure_kinds(), [FailureKind::UnresolvedTransition]);
    }

    #[test]
    fn test_unresolved_trigger_stop_policy() {
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(two_segment_graph(), backend, mono_config(UnresolvedPolicy::Stop));
        let recorder = Recorder::new(FixedTrigger::new("boss"));

        let mut out = vec![0.0; 300];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 300, ctx));
        assert_eq!(written, 100);
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(recorder.failure_kinds(), [FailureKind::UnresolvedTransition]);
    }

    #[test]
    fn test_dangling_edge_reports_not_found() {
        let mut graph = two_segment_graph();
        graph.remove_segment("b").unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Stop));
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 300];
        recorder.with_context(|ctx| player.advance(&mut out, 300, ctx));
        assert_eq!(recorder.failure_kinds(), [FailureKind::NotFound]);
    }

    #[test]
    fn test_missing_initial_segment() {
        let graph = Graph::new(GraphAttributes::new("g", "nowhere")).unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 10];
        assert_eq!(recorder.with_context(|ctx| player.advance(&mut out, 10, ctx)), 0);
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(recorder.failure_kinds(), [FailureKind::InvalidArgument]);
    }

    #[test]
    fn test_missing_asset_is_decode_failure() {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(SegmentAttributes::new("a", "nope").with_window(0, 10))
            .unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Replay));
        player.prepare();
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 10];
        assert_eq!(recorder.with_context(|ctx| player.advance(&mut out, 10, ctx)), 0);
        assert_eq!(recorder.failure_kinds(), [FailureKind::DecodeFailure]);
    }

    #[test]
    fn test_decode_error_mid_segment_keeps_written_frames() {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("a", "flaky")
                    .with_window(50, 400)
                    .with_terminal(true),
            )
            .unwrap();
        let backend = Arc::new(flaky_backend(1, 100, 1000, 2));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new(""));

        let mut out = vec![0.0; 400];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 400, ctx));

        // 两个好块覆盖 [50, 200)
        assert_eq!(written, 150);
        assert_eq!(out[0], 50.0);
        assert_eq!(out[149], 199.0);
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(recorder.failure_kinds(), [FailureKind::DecodeFailure]);
    }

    #[test]
    fn test_transition_target_seek_failure() {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(SegmentAttributes::new("a", "ramp").with_window(0, 100))
            .unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("b", "ramp")
                    .with_window(5000, 10)
                    .with_terminal(true),
            )
            .unwrap();
        graph
            .create_edge(EdgeAttributes::new("ab", "a", "b", "next"))
            .unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new("next"));

        let mut out = vec![0.0; 200];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 200, ctx));
        assert_eq!(written, 100);
        assert_eq!(out[99], 99.0);
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(recorder.failure_kinds(), [FailureKind::DecodeFailure]);
    }

    #[test]
    fn test_prepared_player_never_opens_during_playback() {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(SegmentAttributes::new("a", "ramp").with_window(0, 10))
            .unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("b", "nope")
                    .with_window(0, 10)
                    .with_terminal(true),
            )
            .unwrap();
        graph
            .create_edge(EdgeAttributes::new("ab", "a", "b", "next"))
            .unwrap();
        let backend = Arc::new(flaky_backend(1, 32, 1000, 1));
        let mut player = GraphPlayer::new(graph, backend.clone(), mono_config(UnresolvedPolicy::Replay));
        player.prepare();
        assert_eq!(backend.opens(), 2);

        let recorder = Recorder::new(FixedTrigger::new("next"));
        let mut out = vec![0.0; 40];
        let written = recorder.with_context(|ctx| player.advance(&mut out, 40, ctx));
        assert_eq!(written, 10);
        assert_eq!(recorder.failure_kinds(), [FailureKind::DecodeFailure]);
        assert_eq!(backend.opens(), 2);
    }

    #[test]
    fn test_zero_channels_is_clamped() {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("a", "ramp")
                    .with_window(0, 4)
                    .with_terminal(true),
            )
            .unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let config = PlayerConfig {
            channels: 0,
            ..mono_config(UnresolvedPolicy::Replay)
        };
        let mut player = GraphPlayer::new(graph, backend, config);
        let recorder = Recorder::new(FixedTrigger::new(""));

        let mut out = vec![0.0; 8];
        assert_eq!(recorder.with_context(|ctx| player.advance(&mut out, 8, ctx)), 4);
        assert_eq!(out[..4], [0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_gain_chain() {
        let mut graph = Graph::new(
            GraphAttributes::new("g", "a")
                .with_gain(0.5)
                .with_mix_volume(0.5),
        )
        .unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("a", "ramp")
                    .with_window(8, 4)
                    .with_gain(2.0)
                    .with_terminal(true),
            )
            .unwrap();
        let backend = Arc::new(ramp_backend(1, 32, 1000));
        let mut player = GraphPlayer::new(graph, backend, mono_config(UnresolvedPolicy::Replay));
        let recorder = Recorder::new(FixedTrigger::new(""));

        let mut out = vec![0.0; 4];
        recorder.with_context(|ctx| player.advance(&mut out, 4, ctx));
        assert_eq!(out, [4.0, 4.5, 5.0, 5.5]);
    }
}

//! 渲染线程
//!
//! 充当输出时钟：周期性调用 `PlaybackQueue::process`，把产出的块交给 `FrameSink`。
//! 实时模式下按块时长节拍休眠，否则尽快渲染（离线导出）。

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::FrameSink;

use super::queue::PlaybackQueue;

/// 渲染配置
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// 每次 process 的帧数
    pub block_frames: usize,
    /// 按实时节拍输出
    pub realtime: bool,
    /// 队列空闲时停止
    pub stop_when_idle: bool,
    /// 最多渲染的帧数
    pub max_frames: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            block_frames: 512,
            realtime: false,
            stop_when_idle: true,
            max_frames: None,
        }
    }
}

/// 渲染线程共享状态
///
/// 完全基于原子操作
struct RendererState {
    running: AtomicBool,
    idle: AtomicBool,
    frames_rendered: AtomicU64,
}

/// 渲染结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames_rendered: u64,
    pub blocks: u64,
}

pub struct Renderer {
    state: Arc<RendererState>,
    thread: Option<JoinHandle<io::Result<RenderSummary>>>,
}

impl Renderer {
    /// 启动渲染线程；队列和输出端的所有权移入线程
    pub fn start(
        queue: PlaybackQueue,
        sink: Box<dyn FrameSink>,
        config: RendererConfig,
    ) -> io::Result<Self> {
        let state = Arc::new(RendererState {
            running: AtomicBool::new(true),
            idle: AtomicBool::new(false),
            frames_rendered: AtomicU64::new(0),
        });

        let thread_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name("renderer".to_string())
            .spawn(move || Self::render_thread_main(queue, sink, config, thread_state))?;

        Ok(Self {
            state,
            thread: Some(thread),
        })
    }

    fn render_thread_main(
        mut queue: PlaybackQueue,
        mut sink: Box<dyn FrameSink>,
        config: RendererConfig,
        state: Arc<RendererState>,
    ) -> io::Result<RenderSummary> {
        let channels = queue.config().channels;
        let rate = queue.config().reference_rate;
        let block_frames = config.block_frames.max(1);
        let mut buffer = vec![0.0f32; block_frames * channels];
        let block_period = Duration::from_secs_f64(block_frames as f64 / rate as f64);

        let mut summary = RenderSummary {
            frames_rendered: 0,
            blocks: 0,
        };
        let started = Instant::now();

        log::info!(
            "Render thread started: {} frames/block, {} ch, {}",
            block_frames,
            channels,
            if config.realtime { "realtime" } else { "offline" }
        );

        while state.running.load(Ordering::Acquire) {
            if config.stop_when_idle && queue.is_idle() {
                state.idle.store(true, Ordering::Release);
                break;
            }

            let frames = match config.max_frames {
                Some(max) if summary.frames_rendered >= max => break,
                Some(max) => (max - summary.frames_rendered).min(block_frames as u64) as usize,
                None => block_frames,
            };

            let out = &mut buffer[..frames * channels];
            queue.process(out);
            sink.write_frames(out)?;

            summary.frames_rendered += frames as u64;
            summary.blocks += 1;
            state
                .frames_rendered
                .store(summary.frames_rendered, Ordering::Relaxed);

            if config.realtime {
                // 以起点为基准计算下一个截止时间，避免误差累积
                let deadline = started + block_period.mul_f64(summary.blocks as f64);
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
        }

        sink.finish()?;
        state.idle.store(queue.is_idle(), Ordering::Release);

        log::info!(
            "Render thread finished: {} frames in {} blocks",
            summary.frames_rendered,
            summary.blocks
        );

        Ok(summary)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.state.frames_rendered.load(Ordering::Relaxed)
    }

    /// 渲染线程已退出
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// 线程结束时队列是否已空
    pub fn is_idle(&self) -> bool {
        self.state.idle.load(Ordering::Acquire)
    }

    /// 请求停止（不等待）
    pub fn request_stop(&self) {
        self.state.running.store(false, Ordering::Release);
    }

    /// 等待线程结束
    pub fn wait(mut self) -> io::Result<RenderSummary> {
        self.join()
    }

    /// 停止并等待线程结束
    pub fn stop(mut self) -> io::Result<RenderSummary> {
        self.request_stop();
        self.join()
    }

    fn join(&mut self) -> io::Result<RenderSummary> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "render thread panicked"))?,
            None => Ok(RenderSummary {
                frames_rendered: self.frames_rendered(),
                blocks: 0,
            }),
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.request_stop();
        let _ = self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{NullSink, PcmFileSink, PcmFormat};
    use crate::engine::testing::ramp_backend;
    use crate::engine::{FixedTrigger, PlayerConfig};
    use crate::graph::{Graph, GraphAttributes, SegmentAttributes};

    fn queue_with_segment(frames: u64) -> PlaybackQueue {
        let mut graph = Graph::new(GraphAttributes::new("g", "a")).unwrap();
        graph
            .create_segment(
                SegmentAttributes::new("a", "ramp")
                    .with_window(0, frames)
                    .with_terminal(true),
            )
            .unwrap();
        let mut queue = PlaybackQueue::new(
            Arc::new(ramp_backend(2, 128, 4000)),
            PlayerConfig::default(),
            FixedTrigger::new(""),
        );
        queue.enqueue(graph);
        queue
    }

    #[test]
    fn test_offline_render_stops_when_idle() {
        let queue = queue_with_segment(1000);
        let config = RendererConfig {
            block_frames: 256,
            ..Default::default()
        };
        let renderer = Renderer::start(queue, Box::new(NullSink::new()), config).unwrap();
        let summary = renderer.wait().unwrap();

        // 1000 帧需要 4 块，最后一块尾部为静音
        assert_eq!(summary.blocks, 4);
        assert_eq!(summary.frames_rendered, 1024);
    }

    #[test]
    fn test_max_frames_limit() {
        let queue = queue_with_segment(1000);
        let config = RendererConfig {
            block_frames: 256,
            stop_when_idle: false,
            max_frames: Some(300),
            ..Default::default()
        };
        let renderer = Renderer::start(
            queue,
            Box::new(PcmFileSink::new(Vec::new(), PcmFormat::S16)),
            config,
        )
        .unwrap();
        let summary = renderer.wait().unwrap();
        assert_eq!(summary.frames_rendered, 300);
        assert_eq!(summary.blocks, 2);
    }

    #[test]
    fn test_stop_interrupts_endless_render() {
        let queue = queue_with_segment(10);
        let config = RendererConfig {
            block_frames: 64,
            realtime: true,
            stop_when_idle: false,
            max_frames: None,
        };
        let renderer = Renderer::start(queue, Box::new(NullSink::new()), config).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!renderer.is_finished());

        let summary = renderer.stop().unwrap();
        assert!(summary.frames_rendered > 0);
    }
}

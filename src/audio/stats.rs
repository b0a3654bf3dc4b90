//! 播放统计模块
//!
//! 计数器在实时线程（`process`）中更新，任意线程读取

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// 播放队列统计
///
/// 所有操作都是 lock-free 的；高频计数器按缓存行对齐，避免与读取线程伪共享
#[derive(Debug, Default)]
pub struct QueueStats {
    process_calls: CachePadded<AtomicU64>,
    frames_rendered: CachePadded<AtomicU64>,
    silent_frames: AtomicU64,
    graphs_started: AtomicU64,
    graphs_completed: AtomicU64,
    transitions: AtomicU64,
    failures: AtomicU64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一次 process 调用结束时记录
    #[inline]
    pub fn record_process(&self, frames: u64, silent: u64) {
        self.process_calls.fetch_add(1, Ordering::Relaxed);
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
        if silent > 0 {
            self.silent_frames.fetch_add(silent, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_graph_started(&self) {
        self.graphs_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_graph_completed(&self) {
        self.graphs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// 生成报告
    pub fn report(&self, reference_rate: u32) -> StatsReport {
        StatsReport {
            process_calls: self.process_calls.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            silent_frames: self.silent_frames.load(Ordering::Relaxed),
            graphs_started: self.graphs_started.load(Ordering::Relaxed),
            graphs_completed: self.graphs_completed.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            reference_rate,
        }
    }

    /// 重置统计
    pub fn reset(&self) {
        self.process_calls.store(0, Ordering::Relaxed);
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.silent_frames.store(0, Ordering::Relaxed);
        self.graphs_started.store(0, Ordering::Relaxed);
        self.graphs_completed.store(0, Ordering::Relaxed);
        self.transitions.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

/// 统计报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    pub process_calls: u64,
    pub frames_rendered: u64,
    pub silent_frames: u64,
    pub graphs_started: u64,
    pub graphs_completed: u64,
    pub transitions: u64,
    pub failures: u64,
    pub reference_rate: u32,
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = |frames: u64| frames as f64 / self.reference_rate.max(1) as f64;

        writeln!(f, "Playback Statistics")?;
        writeln!(f, "===================")?;
        writeln!(f, "Process calls: {}", self.process_calls)?;
        writeln!(
            f,
            "Frames rendered: {} ({:.2} s)",
            self.frames_rendered,
            secs(self.frames_rendered)
        )?;
        writeln!(
            f,
            "  Silence: {} ({:.2} s)",
            self.silent_frames,
            secs(self.silent_frames)
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Graphs: {} started, {} completed",
            self.graphs_started, self.graphs_completed
        )?;
        writeln!(f, "Transitions: {}", self.transitions)?;
        writeln!(f, "Failures: {}", self.failures)?;

        Ok(())
    }
}

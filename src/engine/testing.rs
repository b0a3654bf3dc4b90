//! 测试辅助：斜坡资源与记录型协作方

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::QueueStats;
use crate::decode::{DecodeBlock, DecodeError, DecodeSession, DecoderBackend, MemoryBackend};

use super::callbacks::{FailureSink, PlaybackContext, TriggerSource};
use super::{Failure, FailureKind};

/// 资源 "ramp"：每帧的样本值等于帧序号（所有声道相同）
pub(crate) fn ramp_backend(channels: usize, block_frames: usize, frames: usize) -> MemoryBackend {
    let samples: Vec<f32> = (0..frames)
        .flat_map(|frame| std::iter::repeat(frame as f32).take(channels))
        .collect();
    MemoryBackend::new(channels, block_frames).with_asset("ramp", samples)
}

/// 在 `ramp_backend` 之上多出资源 "flaky"：内容同 "ramp"，
/// 但每次 seek 之后只给出 `good_blocks` 块，再往后解码失败
pub(crate) fn flaky_backend(
    channels: usize,
    block_frames: usize,
    frames: usize,
    good_blocks: usize,
) -> TestBackend {
    TestBackend {
        inner: ramp_backend(channels, block_frames, frames),
        good_blocks,
        opens: AtomicUsize::new(0),
    }
}

pub(crate) struct TestBackend {
    inner: MemoryBackend,
    good_blocks: usize,
    opens: AtomicUsize,
}

impl TestBackend {
    /// `open` 被调用的次数（含失败的）
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for TestBackend {
    fn open(&self, asset: &str) -> Result<Box<dyn DecodeSession>, DecodeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match asset {
            "flaky" => Ok(Box::new(FlakySession {
                inner: self.inner.open("ramp")?,
                good_blocks: self.good_blocks,
                remaining: self.good_blocks,
            })),
            _ => self.inner.open(asset),
        }
    }
}

struct FlakySession {
    inner: Box<dyn DecodeSession>,
    good_blocks: usize,
    remaining: usize,
}

impl DecodeSession for FlakySession {
    fn seek(&mut self, time_secs: f64) -> Result<(), DecodeError> {
        self.remaining = self.good_blocks;
        self.inner.seek(time_secs)
    }

    fn next_block(&mut self) -> Result<Option<DecodeBlock<'_>>, DecodeError> {
        if self.remaining == 0 {
            return Err(DecodeError::DecodeFailed("corrupt packet".to_string()));
        }
        self.remaining -= 1;
        self.inner.next_block()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// 记录所有上报的失败
#[derive(Clone, Default)]
pub(crate) struct RecordingFailures(Arc<Mutex<Vec<(FailureKind, String)>>>);

impl RecordingFailures {
    pub(crate) fn entries(&self) -> Vec<(FailureKind, String)> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<FailureKind> {
        self.entries().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl FailureSink for RecordingFailures {
    fn report_failure(&mut self, _location: &'static std::panic::Location<'static>, failure: &Failure) {
        self.0
            .lock()
            .unwrap()
            .push((failure.kind(), failure.to_string()));
    }
}

/// 为直接驱动 `GraphPlayer` 的测试提供 `PlaybackContext`
pub(crate) struct Recorder<T> {
    trigger: RefCell<T>,
    failures: RecordingFailures,
    stats: QueueStats,
}

impl<T: TriggerSource> Recorder<T> {
    pub(crate) fn new(trigger: T) -> Self {
        Self {
            trigger: RefCell::new(trigger),
            failures: RecordingFailures::default(),
            stats: QueueStats::new(),
        }
    }

    pub(crate) fn with_context<R>(&self, f: impl FnOnce(&mut PlaybackContext<'_>) -> R) -> R {
        let mut trigger = self.trigger.borrow_mut();
        let mut failures = self.failures.clone();
        let mut ctx = PlaybackContext {
            trigger: &mut *trigger,
            failures: &mut failures,
            stats: &self.stats,
        };
        f(&mut ctx)
    }

    pub(crate) fn failures(&self) -> Vec<(FailureKind, String)> {
        self.failures.entries()
    }

    pub(crate) fn failure_kinds(&self) -> Vec<FailureKind> {
        self.failures.kinds()
    }

    pub(crate) fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

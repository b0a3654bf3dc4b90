//! 应用侧协作方：触发标签选择与失败上报

use std::borrow::Cow;
use std::collections::VecDeque;
use std::panic::Location;

use crate::audio::QueueStats;
use crate::graph::{Graph, Segment};

use super::Failure;

/// 段播放完毕时，由应用决定走哪条出边
pub trait TriggerSource: Send {
    fn choose_trigger(&mut self, graph: &Graph, segment: &Segment) -> Cow<'static, str>;
}

impl<T: TriggerSource + ?Sized> TriggerSource for Box<T> {
    fn choose_trigger(&mut self, graph: &Graph, segment: &Segment) -> Cow<'static, str> {
        (**self).choose_trigger(graph, segment)
    }
}

/// 始终返回同一个标签
#[derive(Debug, Clone)]
pub struct FixedTrigger(Cow<'static, str>);

impl FixedTrigger {
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Self(label.into())
    }
}

impl TriggerSource for FixedTrigger {
    fn choose_trigger(&mut self, _graph: &Graph, _segment: &Segment) -> Cow<'static, str> {
        self.0.clone()
    }
}

/// 按脚本依次返回标签，用完后返回 fallback（或循环）
#[derive(Debug, Clone)]
pub struct ScriptedTrigger {
    script: VecDeque<String>,
    fallback: Cow<'static, str>,
    cycle: bool,
}

impl ScriptedTrigger {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: labels.into_iter().map(Into::into).collect(),
            fallback: Cow::Borrowed(""),
            cycle: false,
        }
    }

    pub fn with_fallback(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.fallback = label.into();
        self
    }

    /// 脚本用完后从头再来
    pub fn cycled(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl TriggerSource for ScriptedTrigger {
    fn choose_trigger(&mut self, _graph: &Graph, _segment: &Segment) -> Cow<'static, str> {
        match self.script.pop_front() {
            Some(label) => {
                if self.cycle {
                    self.script.push_back(label.clone());
                }
                Cow::Owned(label)
            }
            None => self.fallback.clone(),
        }
    }
}

/// 闭包形式的触发源，见 [`trigger_fn`]
pub struct TriggerFn<F>(F);

pub fn trigger_fn<F>(f: F) -> TriggerFn<F>
where
    F: FnMut(&Graph, &Segment) -> Cow<'static, str> + Send,
{
    TriggerFn(f)
}

impl<F> TriggerSource for TriggerFn<F>
where
    F: FnMut(&Graph, &Segment) -> Cow<'static, str> + Send,
{
    fn choose_trigger(&mut self, graph: &Graph, segment: &Segment) -> Cow<'static, str> {
        (self.0)(graph, segment)
    }
}

/// 失败上报通道
///
/// `location` 是上报点的源码位置
pub trait FailureSink: Send {
    fn report_failure(&mut self, location: &'static Location<'static>, failure: &Failure);
}

/// 默认实现：写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailures;

impl FailureSink for LogFailures {
    fn report_failure(&mut self, location: &'static Location<'static>, failure: &Failure) {
        log::error!("{}:{}: {}", location.file(), location.line(), failure);
    }
}

/// 闭包形式的失败通道，见 [`failure_fn`]
pub struct FailureFn<F>(F);

pub fn failure_fn<F>(f: F) -> FailureFn<F>
where
    F: FnMut(&'static Location<'static>, &Failure) + Send,
{
    FailureFn(f)
}

impl<F> FailureSink for FailureFn<F>
where
    F: FnMut(&'static Location<'static>, &Failure) + Send,
{
    fn report_failure(&mut self, location: &'static Location<'static>, failure: &Failure) {
        (self.0)(location, failure)
    }
}

/// 一次 `process` 调用期间借给图播放器的协作方
pub struct PlaybackContext<'a> {
    pub trigger: &'a mut dyn TriggerSource,
    pub failures: &'a mut dyn FailureSink,
    pub stats: &'a QueueStats,
}

impl PlaybackContext<'_> {
    /// 上报失败，位置取调用点
    #[track_caller]
    pub fn report(&mut self, failure: Failure) {
        self.stats.record_failure();
        self.failures.report_failure(Location::caller(), &failure);
    }
}

//! 段播放器
//!
//! 从解码会话中按块拉取样本，裁掉窗口 `[offset, offset + duration)` 之外的部分：
//! - 块起点早于游标：丢弃块头（skip）
//! - 块终点越过窗口终点：丢弃块尾（truncate）
//! - 块起点晚于游标（解码器跳帧）：用静音补齐
//!
//! 解码块被复制进预分配的缓冲区，避免在输出路径上持有会话的借用。

use crate::decode::{frames_to_secs, secs_to_frames, DecodeError, DecodeSession};
use crate::graph::{Segment, SegmentKey};

pub struct SegmentPlayer {
    segment: SegmentKey,
    /// 窗口起点 / 终点（资源内帧位置）
    start: u64,
    end: u64,
    /// 下一个要输出的帧
    position: u64,
    gain: f32,
    channels: usize,
    reference_rate: u32,
    session: Box<dyn DecodeSession>,
    /// 当前块（交错样本）
    block: Vec<f32>,
    block_start: u64,
    block_frames: usize,
    /// 资源在窗口终点之前结束
    ended: bool,
    /// 已写出部分帧后遇到的解码错误，下一次 `fill` 返回
    pending_error: Option<DecodeError>,
}

impl SegmentPlayer {
    /// `gain` 为最终增益（段 × 图 × 混音）
    pub fn open(
        segment: &Segment,
        session: Box<dyn DecodeSession>,
        channels: usize,
        reference_rate: u32,
        gain: f32,
        block_capacity: usize,
    ) -> Self {
        let channels = channels.max(1);
        Self {
            segment: segment.key(),
            start: segment.sample_offset(),
            end: segment.sample_end(),
            position: segment.sample_offset(),
            gain,
            channels,
            reference_rate,
            session,
            block: Vec::with_capacity(block_capacity * channels),
            block_start: 0,
            block_frames: 0,
            ended: false,
            pending_error: None,
        }
    }

    pub fn segment(&self) -> SegmentKey {
        self.segment
    }

    /// 当前游标（资源内帧位置）
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 窗口已读完，或资源提前结束
    pub fn is_exhausted(&self) -> bool {
        self.ended || self.position >= self.end
    }

    /// 上一次 `fill` 写出部分帧后解码失败，错误留到下一次 `fill` 返回
    pub fn has_pending_error(&self) -> bool {
        self.pending_error.is_some()
    }

    /// 定位到窗口起点
    ///
    /// 拉取块直到某块覆盖（或越过）起点；在此之前流结束视为解码失败
    pub fn seek_to_start(&mut self) -> Result<(), DecodeError> {
        self.position = self.start;
        self.ended = false;
        self.pending_error = None;
        self.block.clear();
        self.block_frames = 0;

        self.session
            .seek(frames_to_secs(self.start, self.reference_rate))?;

        loop {
            if !self.pull()? {
                return Err(DecodeError::UnexpectedEnd);
            }
            if self.block_start + self.block_frames as u64 > self.start {
                log::debug!(
                    "Seeked to frame {} (block at {}, {} frames)",
                    self.start,
                    self.block_start,
                    self.block_frames
                );
                return Ok(());
            }
        }
    }

    /// 拉取下一块；流结束返回 false
    fn pull(&mut self) -> Result<bool, DecodeError> {
        match self.session.next_block()? {
            Some(block) => {
                let frames = block.frames(self.channels);
                self.block.clear();
                self.block
                    .extend_from_slice(&block.samples[..frames * self.channels]);
                self.block_start = secs_to_frames(block.start, self.reference_rate);
                self.block_frames = frames;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 向 `output` 写入至多 `frames` 帧，返回实际写入的帧数
    ///
    /// 少于请求值说明段已耗尽，或者解码出错（见 [`Self::has_pending_error`]）。
    /// 已写出的帧总会计入返回值，错误推迟到下一次调用。
    pub fn fill(&mut self, output: &mut [f32], frames: usize) -> Result<usize, DecodeError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }

        let channels = self.channels;
        let frames = frames.min(output.len() / channels);
        let mut written = 0;

        while written < frames && !self.is_exhausted() {
            let block_end = self.block_start + self.block_frames as u64;

            // 当前块已用完
            if self.position >= block_end {
                match self.pull() {
                    Ok(true) => {}
                    Ok(false) => {
                        log::warn!(
                            "Asset ended at frame {} before segment end {}",
                            self.position,
                            self.end
                        );
                        self.ended = true;
                    }
                    Err(e) if written > 0 => {
                        self.pending_error = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            // 解码器跳帧：静音补齐到块起点
            if self.position < self.block_start {
                let gap = (self.block_start - self.position)
                    .min(self.end - self.position)
                    .min((frames - written) as u64) as usize;
                output[written * channels..(written + gap) * channels].fill(0.0);
                written += gap;
                self.position += gap as u64;
                continue;
            }

            let skip = (self.position - self.block_start) as usize;
            let truncate = block_end.saturating_sub(self.end) as usize;
            let available = self.block_frames.saturating_sub(skip + truncate);
            if available == 0 {
                break;
            }

            let count = available.min(frames - written);
            let src = &self.block[skip * channels..(skip + count) * channels];
            let dst = &mut output[written * channels..(written + count) * channels];
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = s * self.gain;
            }

            written += count;
            self.position += count as u64;
        }

        Ok(written)
    }

    /// 交还解码会话（用于同一资源的下一个段）
    pub fn into_session(self) -> Box<dyn DecodeSession> {
        self.session
    }

    pub fn close(mut self) {
        self.session.close();
    }
}

//! 内存 PCM 解码器
//!
//! 资源是预先载入的交错 f32 样本，按固定块大小切分后交给播放引擎。
//! 用于合成素材（提示音、测试信号）以及不依赖文件的测试。

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    frames_to_secs, secs_to_frames, DecodeBlock, DecodeError, DecodeSession, DecoderBackend,
    REFERENCE_RATE,
};

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    assets: HashMap<String, Arc<[f32]>>,
    channels: usize,
    block_frames: usize,
    reference_rate: u32,
}

impl MemoryBackend {
    pub fn new(channels: usize, block_frames: usize) -> Self {
        Self {
            assets: HashMap::new(),
            channels: channels.max(1),
            block_frames: block_frames.max(1),
            reference_rate: REFERENCE_RATE,
        }
    }

    pub fn with_reference_rate(mut self, rate: u32) -> Self {
        self.reference_rate = rate;
        self
    }

    /// 注册资源（交错样本，长度应为声道数的整数倍，多余的尾部样本被丢弃）
    pub fn insert(&mut self, asset: impl Into<String>, samples: impl Into<Vec<f32>>) {
        let mut samples = samples.into();
        let whole = samples.len() - samples.len() % self.channels;
        samples.truncate(whole);
        self.assets.insert(asset.into(), samples.into());
    }

    pub fn with_asset(mut self, asset: impl Into<String>, samples: impl Into<Vec<f32>>) -> Self {
        self.insert(asset, samples);
        self
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 资源长度（帧）
    pub fn asset_frames(&self, asset: &str) -> Option<u64> {
        self.assets
            .get(asset)
            .map(|samples| (samples.len() / self.channels) as u64)
    }
}

impl DecoderBackend for MemoryBackend {
    fn open(&self, asset: &str) -> Result<Box<dyn DecodeSession>, DecodeError> {
        let samples = self
            .assets
            .get(asset)
            .cloned()
            .ok_or_else(|| DecodeError::UnknownAsset(asset.to_string()))?;

        Ok(Box::new(MemorySession {
            samples,
            channels: self.channels,
            block_frames: self.block_frames,
            reference_rate: self.reference_rate,
            position: 0,
        }))
    }
}

/// 内存解码会话；样本由所有会话共享
struct MemorySession {
    samples: Arc<[f32]>,
    channels: usize,
    block_frames: usize,
    reference_rate: u32,
    /// 下一块的起始帧
    position: usize,
}

impl MemorySession {
    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl DecodeSession for MemorySession {
    /// 落在目标位置所在块的起点
    fn seek(&mut self, time_secs: f64) -> Result<(), DecodeError> {
        let target = secs_to_frames(time_secs, self.reference_rate) as usize;
        if target > self.total_frames() {
            return Err(DecodeError::SeekFailed(format!(
                "position {} beyond end of stream ({} frames)",
                target,
                self.total_frames()
            )));
        }
        self.position = target - target % self.block_frames;
        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<DecodeBlock<'_>>, DecodeError> {
        let total = self.total_frames();
        if self.position >= total {
            return Ok(None);
        }

        let start = self.position;
        let end = (start + self.block_frames).min(total);
        self.position = end;

        Ok(Some(DecodeBlock {
            samples: &self.samples[start * self.channels..end * self.channels],
            start: frames_to_secs(start as u64, self.reference_rate),
            duration: frames_to_secs((end - start) as u64, self.reference_rate),
        }))
    }
}

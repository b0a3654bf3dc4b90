//! 音频文件解码器
//!
//! 使用 symphonia 库解码
//! 支持：FLAC, WAV, AIFF, MP3
//!
//! 输出统一为交错 f32，声道数由后端配置决定：
//! - 源声道多于输出声道时丢弃多余声道
//! - 源声道少于输出声道时用最后一个源声道补齐（单声道 → 立体声即复制）

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::core::units::{Time, TimeBase};

use super::{DecodeBlock, DecodeError, DecodeSession, DecoderBackend, REFERENCE_RATE};

/// 音频文件信息
#[derive(Debug, Clone)]
pub struct AudioInfo {
    /// 采样率
    pub sample_rate: u32,
    /// 源声道数
    pub channels: u32,
    /// 位深度（原始格式）
    pub bit_depth: Option<u32>,
    /// 总帧数（如果已知）
    pub total_frames: Option<u64>,
    /// 总时长（秒）
    pub duration_secs: Option<f64>,
    /// 格式名称
    pub format: String,
    /// 编解码器名称
    pub codec: String,
}

/// 基于文件系统的解码后端
///
/// 资源引用按文件路径解释；相对路径以 `base_dir` 为根
#[derive(Debug, Clone)]
pub struct SymphoniaBackend {
    channels: usize,
    reference_rate: u32,
    base_dir: Option<PathBuf>,
}

impl SymphoniaBackend {
    pub fn new(channels: usize, reference_rate: u32) -> Self {
        Self {
            channels: channels.max(1),
            reference_rate,
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, asset: &str) -> PathBuf {
        let path = Path::new(asset);
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for SymphoniaBackend {
    fn default() -> Self {
        Self::new(2, REFERENCE_RATE)
    }
}

impl DecoderBackend for SymphoniaBackend {
    fn open(&self, asset: &str) -> Result<Box<dyn DecodeSession>, DecodeError> {
        let decoder = AudioDecoder::open(self.resolve(asset), self.channels, self.reference_rate)?;
        Ok(Box::new(decoder))
    }
}

/// 音频文件解码会话
pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: TimeBase,
    info: AudioInfo,
    /// 输出声道数
    channels: usize,
    /// 交错 f32 样本缓冲区
    buffer: Vec<f32>,
}

impl AudioDecoder {
    /// 打开音频文件
    ///
    /// 采样率与 `reference_rate` 不一致时拒绝打开（不做重采样）
    pub fn open<P: AsRef<Path>>(
        path: P,
        channels: usize,
        reference_rate: u32,
    ) -> Result<Self, DecodeError> {
        let path = path.as_ref();

        let file = File::open(path).map_err(DecodeError::FileOpen)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // 提示文件扩展名
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|_| DecodeError::UnsupportedFormat)?;

        let reader = probed.format;
        let format_name = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_uppercase())
            .unwrap_or_else(|| "Unknown".to_string());

        // 查找第一个音频轨道
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.ok_or(DecodeError::NoAudioTrack)?;
        if sample_rate != reference_rate {
            return Err(DecodeError::SampleRateMismatch {
                expected: reference_rate,
                found: sample_rate,
            });
        }

        let source_channels = codec_params
            .channels
            .map(|c| c.count() as u32)
            .unwrap_or(2);
        let total_frames = codec_params.n_frames;
        let time_base = codec_params
            .time_base
            .unwrap_or_else(|| TimeBase::new(1, sample_rate));

        let codec_name = symphonia::default::get_codecs()
            .get_codec(codec_params.codec)
            .map(|c| c.short_name.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let info = AudioInfo {
            sample_rate,
            channels: source_channels,
            bit_depth: codec_params.bits_per_sample,
            total_frames,
            duration_secs: total_frames.map(|f| f as f64 / sample_rate as f64),
            format: format_name,
            codec: codec_name,
        };

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecoderCreation(e.to_string()))?;

        log::info!(
            "Opened {} ({} {} Hz, {} ch)",
            path.display(),
            info.codec,
            info.sample_rate,
            info.channels
        );

        let channels = channels.max(1);
        // 预分配：8192 帧覆盖常见格式的单包大小
        let buffer = Vec::with_capacity(8192 * channels);

        Ok(Self {
            reader,
            decoder,
            track_id,
            time_base,
            info,
            channels,
            buffer,
        })
    }

    /// 获取音频信息
    pub fn info(&self) -> &AudioInfo {
        &self.info
    }
}

impl DecodeSession for AudioDecoder {
    fn seek(&mut self, time_secs: f64) -> Result<(), DecodeError> {
        let time_secs = time_secs.max(0.0);
        let seek_to = SeekTo::Time {
            time: Time::new(time_secs as u64, time_secs.fract()),
            track_id: Some(self.track_id),
        };

        self.reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| DecodeError::SeekFailed(e.to_string()))?;

        // 重置解码器状态
        self.decoder.reset();
        self.buffer.clear();

        Ok(())
    }

    fn next_block(&mut self) -> Result<Option<DecodeBlock<'_>>, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
            };

            // 跳过非目标轨道
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    // 跳过损坏的帧
                    log::warn!("Skipping corrupt packet at ts {}: {}", packet.ts(), e);
                    continue;
                }
                Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let total_samples = frames * self.channels;
            if self.buffer.len() < total_samples {
                self.buffer.resize(total_samples, 0.0);
            }

            let output = &mut self.buffer[..total_samples];
            match decoded {
                AudioBufferRef::U8(buf) => interleave(&buf, output),
                AudioBufferRef::U16(buf) => interleave(&buf, output),
                AudioBufferRef::U24(buf) => interleave(&buf, output),
                AudioBufferRef::U32(buf) => interleave(&buf, output),
                AudioBufferRef::S8(buf) => interleave(&buf, output),
                AudioBufferRef::S16(buf) => interleave(&buf, output),
                AudioBufferRef::S24(buf) => interleave(&buf, output),
                AudioBufferRef::S32(buf) => interleave(&buf, output),
                AudioBufferRef::F32(buf) => interleave(&buf, output),
                AudioBufferRef::F64(buf) => interleave(&buf, output),
            }

            let start = self.time_base.calc_time(packet.ts());
            let start = start.seconds as f64 + start.frac;
            let duration = frames as f64 / self.info.sample_rate as f64;

            return Ok(Some(DecodeBlock {
                samples: &self.buffer[..total_samples],
                start,
                duration,
            }));
        }
    }

    fn close(&mut self) {
        self.buffer = Vec::new();
    }
}

/// 平面缓冲 → 交错 f32，按输出声道数映射
#[inline]
fn interleave<S>(buf: &AudioBuffer<S>, output: &mut [f32])
where
    S: Sample + IntoSample<f32>,
{
    let source_channels = buf.spec().channels.count();
    if source_channels == 0 {
        output.fill(0.0);
        return;
    }

    let frames = buf.frames();
    let channels = output.len() / frames.max(1);
    for ch in 0..channels {
        let source = buf.chan(ch.min(source_channels - 1));
        for (frame, &sample) in source.iter().take(frames).enumerate() {
            output[frame * channels + ch] = sample.into_sample();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 写一个 16-bit 单声道 WAV，样本值为帧序号
    fn write_ramp_wav(name: &str, rate: u32, frames: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "audio-graph-{}-{}.wav",
            name,
            std::process::id()
        ));
        let data_len = frames * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            bytes.extend_from_slice(&(i as i16).to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_wav_to_stereo() {
        let path = write_ramp_wav("stereo", REFERENCE_RATE, 3000);
        let mut decoder = AudioDecoder::open(&path, 2, REFERENCE_RATE).unwrap();
        assert_eq!(decoder.info().channels, 1);
        assert_eq!(decoder.info().total_frames, Some(3000));

        let mut total = 0usize;
        let mut expected_start = 0.0;
        while let Some(block) = decoder.next_block().unwrap() {
            assert!((block.start - expected_start).abs() < 1e-9);
            let frames = block.frames(2);
            for frame in 0..frames {
                let value = ((total + frame) as f32) / 32768.0;
                assert_eq!(block.samples[frame * 2], value);
                assert_eq!(block.samples[frame * 2 + 1], value);
            }
            total += frames;
            expected_start += block.duration;
        }
        assert_eq!(total, 3000);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_seek_lands_at_or_before_target() {
        let path = write_ramp_wav("seek", REFERENCE_RATE, 8000);
        let mut decoder = AudioDecoder::open(&path, 1, REFERENCE_RATE).unwrap();

        let target = 5000.0 / REFERENCE_RATE as f64;
        decoder.seek(target).unwrap();
        let block = decoder.next_block().unwrap().unwrap();
        assert!(block.start <= target + 1e-9);
        assert!(block.start + block.duration > target);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_rejects_other_sample_rates() {
        let path = write_ramp_wav("rate", 48_000, 100);
        let result = AudioDecoder::open(&path, 2, REFERENCE_RATE);
        assert!(matches!(
            result,
            Err(DecodeError::SampleRateMismatch {
                expected: 44_100,
                found: 48_000
            })
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_backend_resolves_relative_assets() {
        let backend = SymphoniaBackend::default().with_base_dir("/music");
        assert_eq!(backend.resolve("a.flac"), PathBuf::from("/music/a.flac"));
        assert_eq!(backend.resolve("/abs/b.wav"), PathBuf::from("/abs/b.wav"));
        assert!(matches!(
            backend.open("definitely-missing.wav"),
            Err(DecodeError::FileOpen(_))
        ));
    }
}

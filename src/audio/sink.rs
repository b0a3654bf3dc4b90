//! 帧输出端
//!
//! 渲染线程把 `process` 产出的交错 f32 块交给 `FrameSink`

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::format::PcmFormat;

pub trait FrameSink: Send {
    /// 写入一块交错样本
    fn write_frames(&mut self, samples: &[f32]) -> io::Result<()>;

    /// 渲染结束时调用
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 原始 PCM 文件（无文件头，little-endian 交错样本）
pub struct PcmFileSink<W: Write + Send = BufWriter<File>> {
    writer: W,
    format: PcmFormat,
    scratch: Vec<u8>,
    bytes_written: u64,
}

impl PcmFileSink {
    pub fn create<P: AsRef<Path>>(path: P, format: PcmFormat) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), format))
    }
}

impl<W: Write + Send> PcmFileSink<W> {
    pub fn new(writer: W, format: PcmFormat) -> Self {
        Self {
            writer,
            format,
            scratch: Vec::new(),
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FrameSink for PcmFileSink<W> {
    fn write_frames(&mut self, samples: &[f32]) -> io::Result<()> {
        self.scratch.clear();
        self.format.pack(samples, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.bytes_written += self.scratch.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 丢弃所有样本，只计数
#[derive(Debug, Default)]
pub struct NullSink {
    samples: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl FrameSink for NullSink {
    fn write_frames(&mut self, samples: &[f32]) -> io::Result<()> {
        self.samples += samples.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_sink_packs_blocks() {
        let mut sink = PcmFileSink::new(Vec::new(), PcmFormat::S16);
        sink.write_frames(&[0.0, 0.5]).unwrap();
        sink.write_frames(&[-0.5]).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.bytes_written(), 6);
        let bytes = sink.into_inner();
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -16384);
    }

    #[test]
    fn test_null_sink_counts() {
        let mut sink = NullSink::new();
        sink.write_frames(&[0.0; 64]).unwrap();
        assert_eq!(sink.samples(), 64);
    }
}

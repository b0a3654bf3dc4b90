//! PCM 输出格式和样本打包
//!
//! 内部表示统一为 [-1.0, 1.0] 的 f32，写出时按位深打包为 little-endian：
//! - 16-bit: 有符号整数
//! - 24-bit: 有符号整数，3 字节
//! - 32-bit: IEEE float

use std::str::FromStr;

/// 输出样本格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcmFormat {
    S16,
    S24,
    F32,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::S16
    }
}

impl PcmFormat {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(Self::S16),
            24 => Some(Self::S24),
            32 => Some(Self::F32),
            _ => None,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::S16 => 16,
            Self::S24 => 24,
            Self::F32 => 32,
        }
    }

    /// 每样本的字节数
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// 将 f32 样本打包为字节，追加到 `output`
    ///
    /// 整数格式先 clamp 到 [-1.0, 1.0]
    pub fn pack(&self, samples: &[f32], output: &mut Vec<u8>) {
        output.reserve(samples.len() * self.bytes_per_sample());
        match self {
            Self::S16 => {
                for &sample in samples {
                    let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                    output.extend_from_slice(&v.to_le_bytes());
                }
            }
            Self::S24 => {
                const MAX_24: f32 = 8_388_607.0;
                for &sample in samples {
                    let v = (sample.clamp(-1.0, 1.0) * MAX_24).round() as i32;
                    // little-endian 低 3 字节
                    output.extend_from_slice(&v.to_le_bytes()[..3]);
                }
            }
            Self::F32 => {
                for &sample in samples {
                    output.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
    }
}

impl FromStr for PcmFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .ok()
            .and_then(Self::from_bits)
            .ok_or_else(|| format!("unsupported bit depth '{}' (expected 16, 24 or 32)", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_16bit_pack() {
        let mut bytes = Vec::new();
        PcmFormat::S16.pack(&[0.0, 0.5, -1.0, 2.0], &mut bytes);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 16384);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
        // 超出范围的样本被 clamp
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), 32767);
    }

    #[test]
    fn test_24bit_sign() {
        let mut bytes = Vec::new();
        PcmFormat::S24.pack(&[1.0, -1.0, -0.000_000_1], &mut bytes);
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[0..3], &[0xFF, 0xFF, 0x7F]);
        assert_eq!(&bytes[3..6], &[0x01, 0x00, 0x80]);
        // -1 LSB: 0xFFFFFF
        assert_eq!(&bytes[6..9], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_float_passthrough() {
        let mut bytes = Vec::new();
        PcmFormat::F32.pack(&[1.5], &mut bytes);
        assert_eq!(bytes, 1.5f32.to_le_bytes());
    }

    #[test]
    fn test_parse_bits() {
        assert_eq!("24".parse::<PcmFormat>(), Ok(PcmFormat::S24));
        assert!("8".parse::<PcmFormat>().is_err());
        assert_eq!(PcmFormat::from_bits(32).map(|f| f.bytes_per_sample()), Some(4));
    }
}

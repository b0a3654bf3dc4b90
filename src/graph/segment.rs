//! 段：音频资源中的一个有界窗口

use crate::decode::frames_to_secs;

use super::style::{self, StyleAttributes};
use super::GraphError;

/// 段在所属图 arena 中的稳定索引
///
/// 删除段后索引不会被复用，过期索引只会查不到，不会指向别的段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey(pub(crate) usize);

impl SegmentKey {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 创建段所需的属性
///
/// `id`、`asset`、`sample_offset`、`sample_duration` 为必填项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentAttributes {
    pub id: Option<String>,
    /// 资源引用（由解码器解释，通常是文件路径）
    pub asset: Option<String>,
    pub sample_offset: Option<u64>,
    pub sample_duration: Option<u64>,
    pub terminal: bool,
    pub gain: Option<f32>,
    pub stretch: Option<f32>,
}

impl SegmentAttributes {
    pub fn new(id: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            asset: Some(asset.into()),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, sample_offset: u64, sample_duration: u64) -> Self {
        self.sample_offset = Some(sample_offset);
        self.sample_duration = Some(sample_duration);
        self
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn with_stretch(mut self, stretch: f32) -> Self {
        self.stretch = Some(stretch);
        self
    }

    /// 从样式字符串解析
    ///
    /// 支持的键：`id` `asset`（别名 `file`）`offset` `duration` `terminal` `gain` `stretch`
    pub fn from_style(style: &str) -> Result<Self, GraphError> {
        let parsed = StyleAttributes::parse(style)?;
        let mut attrs = Self::default();

        for (key, value) in parsed.iter() {
            match key {
                "id" => attrs.id = Some(value.to_string()),
                "asset" | "file" => attrs.asset = Some(value.to_string()),
                "offset" => attrs.sample_offset = Some(style::parse_value(key, value)?),
                "duration" => attrs.sample_duration = Some(style::parse_value(key, value)?),
                "terminal" => attrs.terminal = style::parse_bool(key, value)?,
                "gain" => attrs.gain = Some(style::parse_value(key, value)?),
                "stretch" => attrs.stretch = Some(style::parse_value(key, value)?),
                _ => return Err(style::unknown("segment", key)),
            }
        }

        Ok(attrs)
    }

    pub(crate) fn build(self, key: SegmentKey) -> Result<Segment, GraphError> {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(GraphError::invalid("segment requires an id")),
        };
        let asset = match self.asset {
            Some(asset) if !asset.is_empty() => asset,
            _ => {
                return Err(GraphError::invalid(format!(
                    "segment '{}' requires an asset",
                    id
                )))
            }
        };
        let sample_offset = self.sample_offset.ok_or_else(|| {
            GraphError::invalid(format!("segment '{}' requires a sample offset", id))
        })?;
        let sample_duration = match self.sample_duration {
            Some(d) if d > 0 => d,
            Some(_) => {
                return Err(GraphError::invalid(format!(
                    "segment '{}' duration must be positive",
                    id
                )))
            }
            None => {
                return Err(GraphError::invalid(format!(
                    "segment '{}' requires a sample duration",
                    id
                )))
            }
        };
        if sample_offset.checked_add(sample_duration).is_none() {
            return Err(GraphError::invalid(format!(
                "segment '{}' window overflows",
                id
            )));
        }

        let gain = self.gain.unwrap_or(1.0);
        if !gain.is_finite() {
            return Err(GraphError::invalid(format!(
                "segment '{}' gain must be finite",
                id
            )));
        }
        let stretch = self.stretch.unwrap_or(1.0);
        if !(stretch.is_finite() && stretch > 0.0) {
            return Err(GraphError::invalid(format!(
                "segment '{}' stretch must be positive",
                id
            )));
        }

        let style = style::render(&[
            ("id", id.clone()),
            ("asset", asset.clone()),
            ("offset", sample_offset.to_string()),
            ("duration", sample_duration.to_string()),
            ("terminal", self.terminal.to_string()),
            ("gain", gain.to_string()),
            ("stretch", stretch.to_string()),
        ]);

        Ok(Segment {
            key,
            id,
            asset,
            sample_offset,
            sample_duration,
            terminal: self.terminal,
            gain,
            stretch,
            style,
        })
    }
}

/// 段（图中的节点）
///
/// 创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    key: SegmentKey,
    id: String,
    asset: String,
    sample_offset: u64,
    sample_duration: u64,
    terminal: bool,
    gain: f32,
    stretch: f32,
    style: String,
}

impl Segment {
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// 窗口起点（资源内的帧位置）
    pub fn sample_offset(&self) -> u64 {
        self.sample_offset
    }

    pub fn sample_duration(&self) -> u64 {
        self.sample_duration
    }

    /// 窗口终点（不含）
    pub fn sample_end(&self) -> u64 {
        self.sample_offset + self.sample_duration
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// 时间伸缩系数（仅作为元数据保存，播放时不做伸缩）
    pub fn stretch(&self) -> f32 {
        self.stretch
    }

    pub fn time_offset(&self, reference_rate: u32) -> f64 {
        frames_to_secs(self.sample_offset, reference_rate)
    }

    pub fn time_duration(&self, reference_rate: u32) -> f64 {
        frames_to_secs(self.sample_duration, reference_rate)
    }

    pub fn style_string(&self) -> &str {
        &self.style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let segment = SegmentAttributes::new("intro", "intro.flac")
            .with_window(100, 44100)
            .build(SegmentKey(0))
            .unwrap();

        assert_eq!(segment.id(), "intro");
        assert_eq!(segment.sample_end(), 44200);
        assert!(!segment.is_terminal());
        assert_eq!(segment.gain(), 1.0);
        assert_eq!(segment.stretch(), 1.0);
        assert!((segment.time_duration(44100) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_rejects_missing_fields() {
        let missing_window = SegmentAttributes::new("a", "a.wav");
        assert!(missing_window.build(SegmentKey(0)).is_err());

        let zero_duration = SegmentAttributes::new("a", "a.wav").with_window(0, 0);
        assert!(zero_duration.build(SegmentKey(0)).is_err());

        let no_asset = SegmentAttributes {
            id: Some("a".into()),
            sample_offset: Some(0),
            sample_duration: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            no_asset.build(SegmentKey(0)),
            Err(GraphError::InvalidArgument(_))
        ));

        let bad_stretch = SegmentAttributes::new("a", "a.wav")
            .with_window(0, 10)
            .with_stretch(0.0);
        assert!(bad_stretch.build(SegmentKey(0)).is_err());
    }

    #[test]
    fn test_from_style() {
        let attrs = SegmentAttributes::from_style(
            r#"id = outro file = "stems/outro.wav" offset = 5 duration = 500 terminal = true gain = 0.5"#,
        )
        .unwrap();
        assert_eq!(attrs.asset.as_deref(), Some("stems/outro.wav"));
        assert_eq!(attrs.sample_offset, Some(5));
        assert!(attrs.terminal);

        let segment = attrs.build(SegmentKey(3)).unwrap();
        assert_eq!(segment.key().index(), 3);
        assert_eq!(segment.gain(), 0.5);

        // 规范化样式字符串可以再次解析出同样的段
        let again = SegmentAttributes::from_style(segment.style_string())
            .unwrap()
            .build(SegmentKey(3))
            .unwrap();
        assert_eq!(again, segment);
    }

    #[test]
    fn test_from_style_rejects_unknown_key() {
        assert!(SegmentAttributes::from_style("id = a colour = red").is_err());
        assert!(SegmentAttributes::from_style("id = a offset = -1").is_err());
    }
}

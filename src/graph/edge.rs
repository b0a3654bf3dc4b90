//! 转移边：两个段之间带触发标签的有向边

use super::segment::SegmentKey;
use super::style::{self, StyleAttributes};
use super::GraphError;

/// 边在所属图 arena 中的稳定索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey(pub(crate) usize);

impl EdgeKey {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 创建边所需的属性，四项均为必填
///
/// 触发标签可以是空字符串（相当于"默认出口"）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeAttributes {
    pub id: Option<String>,
    pub trigger: Option<String>,
    /// 源段 id
    pub from: Option<String>,
    /// 目标段 id
    pub to: Option<String>,
}

impl EdgeAttributes {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            trigger: Some(trigger.into()),
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    /// 从样式字符串解析，支持的键：`id` `trigger` `from` `to`
    pub fn from_style(style: &str) -> Result<Self, GraphError> {
        let parsed = StyleAttributes::parse(style)?;
        let mut attrs = Self::default();

        for (key, value) in parsed.iter() {
            let slot = match key {
                "id" => &mut attrs.id,
                "trigger" => &mut attrs.trigger,
                "from" => &mut attrs.from,
                "to" => &mut attrs.to,
                _ => return Err(style::unknown("edge", key)),
            };
            *slot = Some(value.to_string());
        }

        Ok(attrs)
    }
}

/// 转移边
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub(crate) key: EdgeKey,
    pub(crate) id: String,
    pub(crate) trigger: String,
    pub(crate) from: SegmentKey,
    pub(crate) to: SegmentKey,
    pub(crate) style: String,
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn from(&self) -> SegmentKey {
        self.from
    }

    pub fn to(&self) -> SegmentKey {
        self.to
    }

    pub fn style_string(&self) -> &str {
        &self.style
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_style() {
        let attrs =
            EdgeAttributes::from_style(r#"id = e1 from = intro to = loop trigger = next"#).unwrap();
        assert_eq!(attrs, EdgeAttributes::new("e1", "intro", "loop", "next"));
    }

    #[test]
    fn test_from_style_partial() {
        // 缺失字段在解析阶段不报错，由 Graph::create_edge 校验
        let attrs = EdgeAttributes::from_style("id = e1 from = intro").unwrap();
        assert!(attrs.trigger.is_none());
        assert!(attrs.to.is_none());

        assert!(EdgeAttributes::from_style("id = e1 weight = 3").is_err());
    }
}

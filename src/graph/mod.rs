//! 播放图
//!
//! 一张图拥有一组段（节点）与转移边，并指定一个起始段：
//! - 段和边存放在 arena（槽位向量）中，以稳定索引 `SegmentKey` / `EdgeKey` 寻址
//! - 边和播放游标只持有索引，不持有所有权
//! - 枚举顺序即插入顺序，按 id 查找走哈希表

mod edge;
mod library;
mod segment;
mod style;
mod transitions;

use std::collections::{HashMap, HashSet};

use thiserror::Error;

pub use edge::{Edge, EdgeAttributes, EdgeKey};
pub use library::GraphLibrary;
pub use segment::{Segment, SegmentAttributes, SegmentKey};
pub use style::StyleAttributes;
pub use transitions::TransitionTable;

/// 图构建错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// 属性缺失或不合法，对象未被创建
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// 按 id 查找的对象不存在
    #[error("not found: {0}")]
    NotFound(String),
}

impl GraphError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// 创建图所需的属性，`id` 与 `initial` 为必填
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphAttributes {
    pub id: Option<String>,
    /// 任意类型标签
    pub kind: Option<String>,
    /// 起始段 id
    pub initial: Option<String>,
    pub gain: Option<f32>,
    pub mix_volume: Option<f32>,
}

impl GraphAttributes {
    pub fn new(id: impl Into<String>, initial: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            initial: Some(initial.into()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn with_mix_volume(mut self, mix_volume: f32) -> Self {
        self.mix_volume = Some(mix_volume);
        self
    }

    /// 支持的键：`id` `type` `initial` `gain` `mix`
    pub fn from_style(style: &str) -> Result<Self, GraphError> {
        let parsed = StyleAttributes::parse(style)?;
        let mut attrs = Self::default();

        for (key, value) in parsed.iter() {
            match key {
                "id" => attrs.id = Some(value.to_string()),
                "type" => attrs.kind = Some(value.to_string()),
                "initial" => attrs.initial = Some(value.to_string()),
                "gain" => attrs.gain = Some(style::parse_value(key, value)?),
                "mix" => attrs.mix_volume = Some(style::parse_value(key, value)?),
                _ => return Err(style::unknown("graph", key)),
            }
        }

        Ok(attrs)
    }
}

/// 播放图
#[derive(Debug, Clone)]
pub struct Graph {
    id: String,
    kind: String,
    initial: String,
    gain: f32,
    mix_volume: f32,
    style: String,
    segments: Vec<Option<Segment>>,
    segment_ids: HashMap<String, SegmentKey>,
    edges: Vec<Option<Edge>>,
    edge_ids: HashMap<String, EdgeKey>,
    transitions: TransitionTable,
    playing: bool,
}

impl Graph {
    /// 创建空图（尚无段和边）
    pub fn new(attributes: GraphAttributes) -> Result<Self, GraphError> {
        let id = match attributes.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(GraphError::invalid("graph requires an id")),
        };
        let initial = match attributes.initial {
            Some(initial) if !initial.is_empty() => initial,
            _ => {
                return Err(GraphError::invalid(format!(
                    "graph '{}' requires an initial segment id",
                    id
                )))
            }
        };
        let gain = attributes.gain.unwrap_or(1.0);
        let mix_volume = attributes.mix_volume.unwrap_or(1.0);
        if !gain.is_finite() || !mix_volume.is_finite() {
            return Err(GraphError::invalid(format!(
                "graph '{}' gain and mix volume must be finite",
                id
            )));
        }
        let kind = attributes.kind.unwrap_or_default();

        let mut graph = Self {
            id,
            kind,
            initial,
            gain,
            mix_volume,
            style: String::new(),
            segments: Vec::new(),
            segment_ids: HashMap::new(),
            edges: Vec::new(),
            edge_ids: HashMap::new(),
            transitions: TransitionTable::new(),
            playing: false,
        };
        graph.refresh_style();
        Ok(graph)
    }

    pub fn from_style(style: &str) -> Result<Self, GraphError> {
        Self::new(GraphAttributes::from_style(style)?)
    }

    fn refresh_style(&mut self) {
        let mut pairs = vec![("id", self.id.clone())];
        if !self.kind.is_empty() {
            pairs.push(("type", self.kind.clone()));
        }
        pairs.push(("initial", self.initial.clone()));
        pairs.push(("gain", self.gain.to_string()));
        pairs.push(("mix", self.mix_volume.to_string()));
        self.style = style::render(&pairs);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 类型标签
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn initial_id(&self) -> &str {
        &self.initial
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// 混音音量：与其他图串接时施加在整张图上的增益
    pub fn mix_volume(&self) -> f32 {
        self.mix_volume
    }

    pub fn set_mix_volume(&mut self, volume: f32) {
        if volume.is_finite() {
            self.mix_volume = volume;
            self.refresh_style();
        } else {
            log::warn!("Ignoring non-finite mix volume for graph '{}'", self.id);
        }
    }

    pub fn style_string(&self) -> &str {
        &self.style
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// 创建段
    ///
    /// 属性不完整或 id 重复时返回 `InvalidArgument`，图保持不变
    pub fn create_segment(&mut self, attributes: SegmentAttributes) -> Result<SegmentKey, GraphError> {
        let key = SegmentKey(self.segments.len());
        let segment = attributes.build(key)?;
        if self.segment_ids.contains_key(segment.id()) {
            return Err(GraphError::invalid(format!(
                "graph '{}' already has a segment '{}'",
                self.id,
                segment.id()
            )));
        }

        self.segment_ids.insert(segment.id().to_string(), key);
        self.segments.push(Some(segment));
        Ok(key)
    }

    /// 创建边
    ///
    /// 两个端点必须已存在于本图中
    pub fn create_edge(&mut self, attributes: EdgeAttributes) -> Result<EdgeKey, GraphError> {
        let id = match attributes.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(GraphError::invalid("edge requires an id")),
        };
        let trigger = attributes
            .trigger
            .ok_or_else(|| GraphError::invalid(format!("edge '{}' requires a trigger", id)))?;
        let from_id = attributes
            .from
            .ok_or_else(|| GraphError::invalid(format!("edge '{}' requires a source", id)))?;
        let to_id = attributes
            .to
            .ok_or_else(|| GraphError::invalid(format!("edge '{}' requires a destination", id)))?;

        if self.edge_ids.contains_key(&id) {
            return Err(GraphError::invalid(format!(
                "graph '{}' already has an edge '{}'",
                self.id, id
            )));
        }
        let from = self.segment_key(&from_id).ok_or_else(|| {
            GraphError::invalid(format!("edge '{}' source '{}' does not exist", id, from_id))
        })?;
        let to = self.segment_key(&to_id).ok_or_else(|| {
            GraphError::invalid(format!("edge '{}' destination '{}' does not exist", id, to_id))
        })?;

        let key = EdgeKey(self.edges.len());
        if let Some(replaced) = self.transitions.attach(from, &trigger, key) {
            log::warn!(
                "Graph '{}': edge '{}' replaces '{}' for trigger '{}' from '{}'",
                self.id,
                id,
                self.edge(replaced).map(Edge::id).unwrap_or("?"),
                trigger,
                from_id
            );
        }

        let style = style::render(&[
            ("id", id.clone()),
            ("trigger", trigger.clone()),
            ("from", from_id),
            ("to", to_id),
        ]);
        self.edge_ids.insert(id.clone(), key);
        self.edges.push(Some(Edge {
            key,
            id,
            trigger,
            from,
            to,
            style,
        }));
        Ok(key)
    }

    /// 删除段
    ///
    /// 该段的出边路由一并摘除；指向它的入边保留，
    /// 播放时走到这样的边会作为 `NotFound` 上报。
    /// 不得删除正在播放的段。
    pub fn remove_segment(&mut self, id: &str) -> Result<Segment, GraphError> {
        let key = self
            .segment_ids
            .remove(id)
            .ok_or_else(|| GraphError::NotFound(format!("segment '{}'", id)))?;
        let detached = self.transitions.detach_source(key);
        if !detached.is_empty() {
            log::debug!(
                "Graph '{}': segment '{}' removed with {} outgoing route(s)",
                self.id,
                id,
                detached.len()
            );
        }
        self.segments[key.0]
            .take()
            .ok_or_else(|| GraphError::NotFound(format!("segment '{}'", id)))
    }

    /// 删除边（端点段不受影响）
    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, GraphError> {
        let key = self
            .edge_ids
            .remove(id)
            .ok_or_else(|| GraphError::NotFound(format!("edge '{}'", id)))?;
        let edge = self.edges[key.0]
            .take()
            .ok_or_else(|| GraphError::NotFound(format!("edge '{}'", id)))?;
        self.transitions.detach(edge.from, &edge.trigger, key);
        Ok(edge)
    }

    pub fn segment(&self, key: SegmentKey) -> Option<&Segment> {
        self.segments.get(key.0).and_then(Option::as_ref)
    }

    pub fn segment_key(&self, id: &str) -> Option<SegmentKey> {
        self.segment_ids.get(id).copied()
    }

    pub fn segment_by_id(&self, id: &str) -> Option<&Segment> {
        self.segment_key(id).and_then(|key| self.segment(key))
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(key.0).and_then(Option::as_ref)
    }

    pub fn edge_by_id(&self, id: &str) -> Option<&Edge> {
        self.edge_ids.get(id).and_then(|&key| self.edge(key))
    }

    /// 按插入顺序枚举段
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().flatten()
    }

    /// 按插入顺序枚举边
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().flatten()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_ids.len()
    }

    /// 某个段可用的出边（按挂接顺序）
    pub fn outgoing(&self, from: SegmentKey) -> impl Iterator<Item = &Edge> {
        self.transitions
            .outgoing(from)
            .iter()
            .filter_map(move |&key| self.edge(key))
    }

    /// 按触发标签查找出边；查不到不是错误
    pub fn resolve(&self, from: SegmentKey, trigger: &str) -> Option<&Edge> {
        self.transitions
            .resolve(from, trigger)
            .and_then(|key| self.edge(key))
    }

    pub fn initial_segment(&self) -> Option<&Segment> {
        self.segment_by_id(&self.initial)
    }

    /// 播放前检查：起始段必须存在
    pub fn validate(&self) -> Result<SegmentKey, GraphError> {
        self.segment_key(&self.initial).ok_or_else(|| {
            GraphError::invalid(format!(
                "graph '{}' initial segment '{}' does not exist",
                self.id, self.initial
            ))
        })
    }

    /// 图中引用到的资源（去重，按首次出现顺序）
    pub fn assets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.segments()
            .map(Segment::asset)
            .filter(|asset| seen.insert(*asset))
            .collect()
    }
}

//! 转移解析表
//!
//! 每个源段维护一张 触发标签 → 出边 的哈希表，在挂接边时建立，
//! 段播放完毕时按标签 O(1) 查找下一条边。

use std::collections::HashMap;

use super::edge::EdgeKey;
use super::segment::SegmentKey;

#[derive(Debug, Clone, Default)]
struct Routes {
    by_trigger: HashMap<String, EdgeKey>,
    /// 挂接顺序，用于枚举出边
    order: Vec<EdgeKey>,
}

#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    routes: HashMap<SegmentKey, Routes>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂接一条出边
    ///
    /// 同一源段上的重复标签以后挂接的为准，返回被替换的边
    pub fn attach(&mut self, from: SegmentKey, trigger: &str, edge: EdgeKey) -> Option<EdgeKey> {
        let routes = self.routes.entry(from).or_default();
        let replaced = routes.by_trigger.insert(trigger.to_string(), edge);
        if let Some(old) = replaced {
            routes.order.retain(|&k| k != old);
        }
        routes.order.push(edge);
        replaced
    }

    /// 摘除一条出边（仅当该标签当前仍指向这条边）
    pub fn detach(&mut self, from: SegmentKey, trigger: &str, edge: EdgeKey) {
        if let Some(routes) = self.routes.get_mut(&from) {
            if routes.by_trigger.get(trigger) == Some(&edge) {
                routes.by_trigger.remove(trigger);
            }
            routes.order.retain(|&k| k != edge);
            if routes.order.is_empty() {
                self.routes.remove(&from);
            }
        }
    }

    /// 摘除某个源段的全部出边，返回被摘除的边
    pub fn detach_source(&mut self, from: SegmentKey) -> Vec<EdgeKey> {
        self.routes
            .remove(&from)
            .map(|routes| routes.order)
            .unwrap_or_default()
    }

    pub fn resolve(&self, from: SegmentKey, trigger: &str) -> Option<EdgeKey> {
        self.routes
            .get(&from)
            .and_then(|routes| routes.by_trigger.get(trigger))
            .copied()
    }

    /// 按挂接顺序枚举出边
    pub fn outgoing(&self, from: SegmentKey) -> &[EdgeKey] {
        self.routes
            .get(&from)
            .map(|routes| routes.order.as_slice())
            .unwrap_or(&[])
    }
}

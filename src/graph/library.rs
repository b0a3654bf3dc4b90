//! 图库：一组按追加顺序保存的图（对应一个图文件）

use super::{Graph, GraphError};

#[derive(Debug, Clone, Default)]
pub struct GraphLibrary {
    graphs: Vec<Graph>,
}

impl GraphLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一张图，id 重复时拒绝
    pub fn append(&mut self, graph: Graph) -> Result<usize, GraphError> {
        if self.graph_by_id(graph.id()).is_some() {
            return Err(GraphError::invalid(format!(
                "library already has a graph '{}'",
                graph.id()
            )));
        }
        self.graphs.push(graph);
        Ok(self.graphs.len() - 1)
    }

    pub fn graph(&self, index: usize) -> Option<&Graph> {
        self.graphs.get(index)
    }

    pub fn graph_by_id(&self, id: &str) -> Option<&Graph> {
        self.graphs.iter().find(|g| g.id() == id)
    }

    pub fn graph_by_id_mut(&mut self, id: &str) -> Option<&mut Graph> {
        self.graphs.iter_mut().find(|g| g.id() == id)
    }

    /// 取出一张图（用于交给播放队列）
    pub fn take(&mut self, id: &str) -> Result<Graph, GraphError> {
        let index = self
            .graphs
            .iter()
            .position(|g| g.id() == id)
            .ok_or_else(|| GraphError::NotFound(format!("graph '{}'", id)))?;
        Ok(self.graphs.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.iter()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn into_graphs(self) -> Vec<Graph> {
        self.graphs
    }
}

//! Audio Graph Library
//!
//! 图驱动的音频段播放引擎：
//! - `graph`: 段、转移边与图的存储
//! - `decode`: 解码协作方（symphonia 文件解码 / 内存 PCM）
//! - `engine`: 段播放器、图播放器、播放队列、渲染线程
//! - `audio`: PCM 打包、输出端、播放统计

pub mod audio;
pub mod decode;
pub mod engine;
pub mod graph;

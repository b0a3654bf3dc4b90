//! audiograph - 图驱动音频段播放器
//!
//! 命令：
//! - inspect: 由样式字符串构建图并打印
//! - render: 播放图，输出原始 PCM（或丢弃）

use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use audio_graph::audio::{FrameSink, NullSink, PcmFileSink, PcmFormat};
use audio_graph::decode::{frames_to_secs, secs_to_frames, SymphoniaBackend};
use audio_graph::engine::{
    trigger_fn, FixedTrigger, PlaybackQueue, PlayerConfig, Renderer, RendererConfig,
    ScriptedTrigger, TriggerSource, UnresolvedPolicy,
};
use audio_graph::graph::{Edge, EdgeAttributes, Graph, Segment, SegmentAttributes};

/// Graph-driven audio segment player
#[derive(Parser)]
#[command(name = "audiograph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph and print its segments and edges
    Inspect {
        #[command(flatten)]
        graph: GraphArgs,
    },

    /// Play a graph through the playback queue
    Render {
        #[command(flatten)]
        graph: GraphArgs,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args)]
struct GraphArgs {
    /// Graph attributes, e.g. "id = battle initial = intro"
    #[arg(long, value_name = "STYLE")]
    graph: String,

    /// Segment attributes, e.g. "id = intro asset = intro.flac offset = 0 duration = 44100"
    #[arg(long = "segment", value_name = "STYLE")]
    segments: Vec<String>,

    /// Edge attributes, e.g. "id = e1 from = intro to = loop trigger = next"
    #[arg(long = "edge", value_name = "STYLE")]
    edges: Vec<String>,
}

#[derive(Args)]
struct RenderArgs {
    /// Output file (raw interleaved little-endian PCM); omit to discard
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output bit depth: 16, 24 (integer) or 32 (float)
    #[arg(long, default_value = "16")]
    bits: PcmFormat,

    /// Trigger label returned at every segment boundary
    #[arg(short, long, default_value = "")]
    trigger: String,

    /// Comma-separated trigger labels, used in order before falling back to --trigger
    #[arg(long, value_delimiter = ',')]
    script: Vec<String>,

    /// Pick a random outgoing edge at every segment boundary
    #[arg(long, conflicts_with = "script")]
    random: bool,

    /// Enqueue the graph this many times
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Pace rendering in real time
    #[arg(long)]
    realtime: bool,

    /// Frames per process call
    #[arg(long, default_value_t = 512)]
    block_frames: usize,

    /// Stop after this many seconds of output
    #[arg(long)]
    max_seconds: Option<f64>,

    /// What to do when no edge matches the trigger: replay or stop
    #[arg(long, default_value = "replay")]
    on_unresolved: UnresolvedPolicy,

    /// Output channel count
    #[arg(long, default_value_t = 2)]
    channels: usize,

    /// Base directory for relative asset paths
    #[arg(long)]
    assets: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match cli.command {
        Commands::Inspect { ref graph } => {
            let graph = build_graph(graph)?;
            print_graph(&graph);
        }
        Commands::Render {
            ref graph,
            ref render,
        } => {
            let graph = build_graph(graph)?;
            render_graph(graph, render)?;
        }
    }

    Ok(())
}

/// 由样式字符串构建图
fn build_graph(args: &GraphArgs) -> anyhow::Result<Graph> {
    let mut graph = Graph::from_style(&args.graph)
        .with_context(|| format!("invalid graph '{}'", args.graph))?;

    for style in &args.segments {
        let attributes = SegmentAttributes::from_style(style)
            .with_context(|| format!("invalid segment '{}'", style))?;
        graph
            .create_segment(attributes)
            .with_context(|| format!("cannot create segment '{}'", style))?;
    }

    for style in &args.edges {
        let attributes =
            EdgeAttributes::from_style(style).with_context(|| format!("invalid edge '{}'", style))?;
        graph
            .create_edge(attributes)
            .with_context(|| format!("cannot create edge '{}'", style))?;
    }

    Ok(graph)
}

/// 打印图结构
fn print_graph(graph: &Graph) {
    let rate = PlayerConfig::default().reference_rate;

    println!("Graph Style String = {}", graph.style_string());
    println!("Graph ID = {}", graph.id());
    println!("Graph Type = {}", graph.kind());
    println!("Graph NumNodes = {}", graph.segment_count());
    println!("Graph NumEdges = {}", graph.edge_count());

    for segment in graph.segments() {
        println!();
        println!("Node Style String = {}", segment.style_string());
        println!("Node ID = {}", segment.id());
        println!("Node Filename = {}", segment.asset());
        println!("Node Sample Offset = {}", segment.sample_offset());
        println!("Node Sample Duration = {}", segment.sample_duration());
        println!(
            "Node Time = {:.3}s + {:.3}s{}",
            segment.time_offset(rate),
            segment.time_duration(rate),
            if segment.is_terminal() { " (terminal)" } else { "" }
        );
        for edge in graph.outgoing(segment.key()) {
            let to = graph.segment(edge.to()).map(Segment::id).unwrap_or("?");
            println!("  --[{}]--> {} ({})", edge.trigger(), to, edge.id());
        }
    }

    println!();
    match graph.validate() {
        Ok(_) => println!("Initial segment '{}' OK", graph.initial_id()),
        Err(e) => println!("Not playable: {}", e),
    }
}

/// 创建播放器配置
fn create_player_config(render: &RenderArgs) -> PlayerConfig {
    PlayerConfig {
        channels: render.channels.max(1),
        unresolved: render.on_unresolved,
        ..Default::default()
    }
}

/// 创建渲染配置
fn create_renderer_config(render: &RenderArgs, reference_rate: u32) -> RendererConfig {
    RendererConfig {
        block_frames: render.block_frames.max(1),
        realtime: render.realtime,
        stop_when_idle: true,
        max_frames: render
            .max_seconds
            .map(|secs| secs_to_frames(secs, reference_rate)),
    }
}

/// 根据命令行选择触发源
fn create_trigger(render: &RenderArgs) -> Box<dyn TriggerSource> {
    if render.random {
        let mut rng = StdRng::from_entropy();
        return Box::new(trigger_fn(move |graph: &Graph, segment: &Segment| {
            let labels: Vec<&str> = graph.outgoing(segment.key()).map(Edge::trigger).collect();
            match labels.choose(&mut rng) {
                Some(label) => Cow::Owned(label.to_string()),
                None => Cow::Borrowed(""),
            }
        }));
    }

    if !render.script.is_empty() {
        return Box::new(
            ScriptedTrigger::new(render.script.iter().cloned()).with_fallback(render.trigger.clone()),
        );
    }

    Box::new(FixedTrigger::new(render.trigger.clone()))
}

/// 渲染模式
fn render_graph(graph: Graph, render: &RenderArgs) -> anyhow::Result<()> {
    if let Err(e) = graph.validate() {
        anyhow::bail!("graph is not playable: {}", e);
    }

    let config = create_player_config(render);
    let renderer_config = create_renderer_config(render, config.reference_rate);
    let channels = config.channels;
    let rate = config.reference_rate;

    let mut backend = SymphoniaBackend::new(channels, rate);
    if let Some(ref dir) = render.assets {
        backend = backend.with_base_dir(dir);
    }

    let mut queue = PlaybackQueue::new(Arc::new(backend), config, create_trigger(render));
    let stats = queue.stats();
    let handle = queue.handle();
    for _ in 0..render.repeat.max(1) {
        queue.enqueue(graph.clone());
    }

    let sink: Box<dyn FrameSink> = match render.output {
        Some(ref path) => Box::new(
            PcmFileSink::create(path, render.bits)
                .with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(NullSink::new()),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    println!(
        "Rendering graph '{}' x{} ({} ch, {} Hz{})",
        graph.id(),
        render.repeat.max(1),
        channels,
        rate,
        if render.realtime { ", realtime" } else { "" }
    );
    println!("Press Ctrl+C to stop.\n");

    let renderer = Renderer::start(queue, sink, renderer_config)?;

    while !renderer.is_finished() {
        if !running.load(Ordering::SeqCst) {
            renderer.request_stop();
            break;
        }

        let report = stats.report(rate);
        let secs = frames_to_secs(report.frames_rendered, rate);
        print!(
            "\r  {:02}:{:05.2}  |  Graphs: {}/{}  |  Transitions: {}  |  Failures: {}  ",
            (secs / 60.0) as u32,
            secs % 60.0,
            report.graphs_completed,
            render.repeat.max(1),
            report.transitions,
            report.failures
        );
        io::stdout().flush()?;

        // 在本线程关闭已结束图的解码会话
        handle.collect_finished();

        std::thread::sleep(Duration::from_millis(50));
    }

    let summary = renderer.wait()?;
    handle.collect_finished();
    println!("\n");
    println!(
        "Rendered {} frames ({:.2} s) in {} blocks",
        summary.frames_rendered,
        frames_to_secs(summary.frames_rendered, rate),
        summary.blocks
    );
    print!("{}", stats.report(rate));

    if let Some(ref path) = render.output {
        let format = match render.bits {
            PcmFormat::S16 => "s16le",
            PcmFormat::S24 => "s24le",
            PcmFormat::F32 => "f32le",
        };
        println!(
            "\nWrote {} (play with: ffplay -f {} -ar {} -ac {} {})",
            path.display(),
            format,
            rate,
            channels,
            path.display()
        );
    }

    Ok(())
}

//! Compiles a small two-stage script and runs it against the headless
//! backend, printing the draw traffic the graph produced.
//!
//! ```sh
//! cargo run --example headless_dry_run
//! ```

use anyhow::{Context, Result};

use pipeforge::format::{ChannelLayout, SampleDepth, TextureFormat};
use pipeforge::gpu::headless::{HeadlessBackend, HeadlessTexture};
use pipeforge::graph::RuntimeGraph;
use pipeforge::script::ScriptCompiler;

const SCRIPT: &str = r#"
FORMAT:frame(640, 360, RGBA, UNSIGNED_BYTE)

SHADER:invert {
    @group(0) @binding(0) var src: texture_2d<f32>;

    @fragment
    fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
        let c = textureLoad(src, vec2<i32>(pos.xy), 0);
        return vec4<f32>(vec3<f32>(1.0) - c.rgb, c.a);
    }
}

SHADER:darken {
    @group(0) @binding(0) var src: texture_2d<f32>;

    @fragment
    fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
        return textureLoad(src, vec2<i32>(pos.xy), 0) * 0.5;
    }
}

FILTER:invert_pass(frame, invert)
FILTER:darken_pass(frame, darken)

MAIN_PIPELINE:effect {
    INPUT(src)
    OUTPUT(color)
    NODE:a(invert_pass)
    NODE:b(darken_pass)
    CONNECT(SELF, src, a, src)
    CONNECT(a, color, b, src)
    CONNECT(b, color, SELF, color)
}
"#;

fn main() -> Result<()> {
    env_logger::init();

    let compiler = ScriptCompiler::new();
    let compilation = compiler.compile_main_text(SCRIPT, "dry_run")?;
    let pipeline = compilation
        .main_pipeline()
        .context("script has no main pipeline")?;

    let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline)?;
    graph.build()?;

    let frame = TextureFormat::new(640, 360, ChannelLayout::Rgba, SampleDepth::UnsignedByte);
    graph.bind_input("src", HeadlessTexture::external("camera", frame))?;

    graph.set_monitoring(true);
    for _ in 0..3 {
        graph.process()?;
    }

    for record in graph.backend().draws() {
        println!(
            "{} -> target {} (inputs {:?}, {} vertices)",
            record.program, record.target, record.inputs, record.vertices
        );
    }
    for name in graph.node_names().collect::<Vec<_>>() {
        if let Some(stats) = graph.stats(name) {
            println!(
                "{name}: {} runs, mean {:.3}ms, stddev {:.3}ms",
                stats.count, stats.mean_ms, stats.stddev_ms
            );
        }
    }

    graph.destroy();
    Ok(())
}

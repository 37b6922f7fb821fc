//! Module system behavior observable through the public compiler surface.

use pipeforge::error::CompileError;
use pipeforge::format::{ChannelLayout, SampleDepth, TextureFormat};
use pipeforge::gpu::headless::{HeadlessBackend, HeadlessTexture};
use pipeforge::graph::RuntimeGraph;
use pipeforge::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use pipeforge::script::{MAX_EXPANSION_DEPTH, Req, ScriptCompiler};

const PASS_WGSL: &str = r#"
    @group(0) @binding(0) var src: texture_2d<f32>;

    @fragment
    fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
        return textureLoad(src, vec2<i32>(pos.xy), 0);
    }
"#;

#[test]
fn fft_pipeline_executes_stage_per_draw() {
    let compilation = ScriptCompiler::new()
        .compile_text("CALL:FFT(freq, 8, HORIZONTAL)", "fft")
        .unwrap();
    let pipeline = compilation.pipeline("freq").unwrap();

    let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
    graph.build().unwrap();
    graph
        .bind_input(
            "src",
            HeadlessTexture::external(
                "signal",
                TextureFormat::new(8, 8, ChannelLayout::Rg, SampleDepth::Float),
            ),
        )
        .unwrap();
    graph.process().unwrap();

    // log2(8) butterfly stages plus the bit-reversal reorder.
    let draws = graph.backend().draws();
    assert_eq!(draws.len(), 4);
    assert!(draws[0].program.starts_with("__fft_freq_stage0"));
    assert!(draws[3].program.starts_with("__fft_freq_reorder"));
}

#[test]
fn shader_pipeline_main_runs_end_to_end() {
    let script = format!(
        "FORMAT:frame(16, 16, RGBA, UNSIGNED_BYTE)\n\
         CALL:SHADER_PIPELINE(tint, frame, MAIN) {{{PASS_WGSL}}}"
    );
    let compilation = ScriptCompiler::new()
        .compile_main_text(&script, "inline")
        .unwrap();
    let pipeline = compilation.main_pipeline().unwrap();

    let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
    graph.build().unwrap();
    graph
        .bind_input(
            "src",
            HeadlessTexture::external(
                "frame",
                TextureFormat::new(16, 16, ChannelLayout::Rgba, SampleDepth::UnsignedByte),
            ),
        )
        .unwrap();
    graph.process().unwrap();
    assert_eq!(graph.backend().draws().len(), 1);
    assert_eq!(graph.backend().draws()[0].program, "__tint_filter");
}

#[test]
fn chain_strict_rejects_port_count_mismatch() {
    // A two-output shader chained into a one-input filter.
    let script = format!(
        r#"
FORMAT:frame(8, 8, RGBA, UNSIGNED_BYTE)

SHADER:pass {{{PASS_WGSL}}}

SHADER:split {{
    @group(0) @binding(0) var src: texture_2d<f32>;

    struct Out {{
        @location(0) low: vec4<f32>,
        @location(1) high: vec4<f32>,
    }}

    @fragment
    fn fs_main(@builtin(position) pos: vec4<f32>) -> Out {{
        var out: Out;
        let c = textureLoad(src, vec2<i32>(pos.xy), 0);
        out.low = c * 0.5;
        out.high = c;
        return out;
    }}
}}

FILTER:copy(frame, pass)
FILTER:splitter(frame, split)

CALL:CHAIN_STRICT(bad, splitter, copy)
"#
    );
    let err = ScriptCompiler::new().compile_text(&script, "chain").unwrap_err();
    let message = err.root_cause().to_string();
    assert!(message.contains("2 outputs"), "unexpected error: {message}");
}

#[test]
fn abort_surfaces_message_and_details() {
    let err = ScriptCompiler::new()
        .compile_text("CALL:ABORT(unsupported host) { needs half-float targets }", "abort")
        .unwrap_err();
    match err.root_cause() {
        CompileError::Aborted { message, .. } => {
            assert!(message.starts_with("unsupported host"));
            assert!(message.contains("needs half-float targets"));
        }
        other => panic!("expected abort, got {other}"),
    }
}

#[test]
fn self_reinvoking_module_hits_the_depth_bound() {
    let mut registry = ModuleRegistry::with_builtins();
    registry
        .register("LOOP", 0, 0, Req::Forbidden, |_: &mut ModuleContext<'_>| {
            Ok(ModuleOutcome::Fragment("CALL:LOOP".into()))
        })
        .unwrap();

    let err = ScriptCompiler::with_registry(registry)
        .compile_text("CALL:LOOP", "loop")
        .unwrap_err();
    match err.root_cause() {
        CompileError::ExpansionDepth { module, depth, .. } => {
            assert_eq!(module, "LOOP");
            assert_eq!(*depth, MAX_EXPANSION_DEPTH);
        }
        other => panic!("expected depth error, got {other}"),
    }
}

#[test]
fn safe_call_keeps_scripts_portable_across_module_sets() {
    let script = "FORMAT:frame(8, 8, RGBA, UNSIGNED_BYTE)\nSAFE_CALL:HOST_EXTRA(frame)";
    // Unknown under the builtin set: skipped with a warning.
    ScriptCompiler::new().compile_text(script, "portable").unwrap();

    // Registered on this host: it runs.
    let mut registry = ModuleRegistry::with_builtins();
    registry
        .register("HOST_EXTRA", 1, 1, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
            let base = *ctx.tables.formats.resolve(ctx.arg(0), ctx.at)?;
            ctx.tables
                .formats
                .insert_local("host_extra_fmt", base.scaled_by(0.5, 0.5), ctx.at)?;
            Ok(ModuleOutcome::Done)
        })
        .unwrap();
    let compilation = ScriptCompiler::with_registry(registry)
        .compile_text(script, "portable")
        .unwrap();
    assert_eq!(
        compilation.tables.formats.lookup("host_extra_fmt").unwrap().width,
        4
    );
}

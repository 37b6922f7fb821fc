//! The pipeline script front end.
//!
//! Scripts are a flat list of elements of the form
//! `KEYWORD[:name][(args)][{ body }]`:
//!
//! ```text
//! FORMAT:quarter(480, 270, RGBA, HALF_FLOAT)
//!
//! SHADER:blur {
//!     @group(0) @binding(0) var src: texture_2d<f32>;
//!     @fragment
//!     fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
//!         return textureLoad(src, vec2<i32>(pos.xy), 0);
//!     }
//! }
//!
//! FILTER:downsample(quarter, blur)
//!
//! MAIN_PIPELINE:main {
//!     INPUT(image)
//!     OUTPUT(result)
//!     NODE:down(downsample)
//!     CONNECT(SELF, image, down, src)
//!     CONNECT(down, color, SELF, result)
//! }
//! ```
//!
//! Declarations bind formats, shaders, geometries, filters and pipelines into
//! the session tables; `CALL`/`SAFE_CALL` invoke registered modules;
//! `REQUIRED_*` re-declare existing (usually host-injected) values under
//! local names; `PATH` and `INCLUDE` pull in other script files.

pub mod compiler;
pub(crate) mod declarations;
pub mod element;
pub mod lexer;

pub use compiler::{Compilation, MAX_EXPANSION_DEPTH, ScriptCompiler};
pub use element::{Body, Element, Req, Shape};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::format::ChannelLayout;
    use crate::layout::ComponentLayout;

    const PASS_WGSL: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(src, vec2<i32>(pos.xy), 0);
}
"#;

    fn script_with_pipeline() -> String {
        format!(
            r#"
FORMAT:fmt(256, 256, RGBA, UNSIGNED_BYTE)
SHADER:pass {{{PASS_WGSL}}}
FILTER:copy(fmt, pass)

MAIN_PIPELINE:main {{
    INPUT(image)
    OUTPUT(result)
    NODE:a(copy)
    CONNECT(SELF, image, a, src)
    CONNECT(a, color, SELF, result)
}}
"#
        )
    }

    #[test]
    fn compiles_declarations_and_main_pipeline() {
        let compiler = ScriptCompiler::new();
        let compilation = compiler
            .compile_main_text(&script_with_pipeline(), "test")
            .unwrap();
        assert_eq!(compilation.main.as_deref(), Some("main"));
        let pipeline = compilation.main_pipeline().unwrap();
        assert!(pipeline.is_finalized());
        assert_eq!(pipeline.instances.len(), 1);
        assert_eq!(pipeline.resolved().unwrap().order, [0]);
    }

    #[test]
    fn missing_main_pipeline_rejected() {
        let compiler = ScriptCompiler::new();
        let err = compiler
            .compile_main_text("FORMAT:fmt(1, 1, R, FLOAT)", "test")
            .unwrap_err();
        assert!(matches!(err, CompileError::MissingMainPipeline { .. }));
    }

    #[test]
    fn duplicate_declaration_reports_line() {
        let compiler = ScriptCompiler::new();
        let err = compiler
            .compile_text(
                "FORMAT:fmt(1, 1, R, FLOAT)\nFORMAT:fmt(2, 2, R, FLOAT)",
                "test",
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "duplicate format symbol fmt (test:2)");
    }

    #[test]
    fn unknown_keyword_rejected() {
        let compiler = ScriptCompiler::new();
        let err = compiler.compile_text("FROBNICATE:x(1)", "test").unwrap_err();
        assert!(matches!(err, CompileError::UnknownKeyword { .. }));
    }

    #[test]
    fn unknown_module_fails_call_but_not_safe_call() {
        let compiler = ScriptCompiler::new();
        let err = compiler.compile_text("CALL:NO_SUCH_MODULE", "test").unwrap_err();
        assert!(matches!(err, CompileError::UnknownModule { .. }));
        compiler.compile_text("SAFE_CALL:NO_SUCH_MODULE", "test").unwrap();
    }

    #[test]
    fn required_format_overrides_fields() {
        let compiler = ScriptCompiler::new();
        let compilation = compiler
            .compile_text(
                "FORMAT:base(640, 360, RGBA, UNSIGNED_BYTE)\n\
                 REQUIRED_FORMAT:half(base, 320, 180, *, HALF_FLOAT)",
                "test",
            )
            .unwrap();
        let half = compilation.tables.formats.lookup("half").unwrap();
        assert_eq!((half.width, half.height), (320, 180));
        assert_eq!(half.channels, ChannelLayout::Rgba);
        assert_eq!(
            half.depth,
            crate::format::SampleDepth::HalfFloat
        );
    }

    #[test]
    fn host_injected_format_visible_to_script() {
        let mut compiler = ScriptCompiler::new();
        compiler
            .required()
            .add_required_format(
                "screen",
                crate::format::TextureFormat::new(
                    1920,
                    1080,
                    ChannelLayout::Rgba,
                    crate::format::SampleDepth::UnsignedByte,
                ),
                false,
            )
            .unwrap();
        let compilation = compiler
            .compile_text("REQUIRED_FORMAT:half(screen, 960, 540)", "test")
            .unwrap();
        assert_eq!(compilation.tables.formats.lookup("half").unwrap().width, 960);
    }

    #[test]
    fn filter_body_sets_render_state() {
        let compiler = ScriptCompiler::new();
        let script = format!(
            r#"
FORMAT:fmt(8, 8, RGBA, UNSIGNED_BYTE)
SHADER:pass {{{PASS_WGSL}}}
FILTER:blend(fmt, pass) {{
    CLEAR(OFF)
    BLEND(SRC_ALPHA, ONE_MINUS_SRC_ALPHA)
    DEPTH(LESS_EQUAL)
}}
"#
        );
        let compilation = compiler.compile_text(&script, "test").unwrap();
        let Some(ComponentLayout::Filter(filter)) = compilation.layout("blend") else {
            panic!("filter not declared");
        };
        assert!(!filter.render_state.clear);
        assert!(filter.render_state.blend.is_some());
        assert!(filter.render_state.depth_test.is_some());
    }

    #[test]
    fn compilation_is_deterministic() {
        let compiler = ScriptCompiler::new();
        let script = script_with_pipeline();
        let a = compiler.compile_main_text(&script, "test").unwrap();
        let b = compiler.compile_main_text(&script, "test").unwrap();
        let wa = a.main_pipeline().unwrap();
        let wb = b.main_pipeline().unwrap();
        assert_eq!(wa.resolved().unwrap().order, wb.resolved().unwrap().order);
        assert_eq!(
            wa.resolved().unwrap().connections,
            wb.resolved().unwrap().connections
        );
    }
}

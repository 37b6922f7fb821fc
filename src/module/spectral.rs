//! `FFT`: a parametric pipeline generator.
//!
//! `FFT(name, size[, HORIZONTAL|VERTICAL][, INVERSE])` emits a script
//! fragment declaring one WGSL shader and filter per radix-2 decimation-in-
//! frequency stage plus a final bit-reversal reorder stage, then a pipeline
//! chaining them under `name`. Complex samples travel in the `rg` channels of
//! an `RG/FLOAT` texture sized `size x size`; the transform runs along the
//! chosen axis independently per row (or column).
//!
//! All generated symbols are prefixed `__fft_<name>_` so several transforms
//! can coexist in one script.

use std::fmt::Write;

use crate::error::CompileError;
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::element::Req;

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.define("FFT", 2, 4, Req::Forbidden, generate);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

fn generate(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let name = ctx.arg(0).to_string();
    let size = ctx.arg_u32(1, "transform size")?;
    if size < 2 || !size.is_power_of_two() {
        return Err(CompileError::InvalidValue {
            what: "transform size",
            value: size.to_string(),
            at: ctx.at.clone(),
        });
    }

    let mut axis = Axis::Horizontal;
    let mut inverse = false;
    for flag in &ctx.args[2..] {
        match flag.as_str() {
            "HORIZONTAL" => axis = Axis::Horizontal,
            "VERTICAL" => axis = Axis::Vertical,
            "INVERSE" => inverse = true,
            other => {
                return Err(CompileError::InvalidValue {
                    what: "transform flag",
                    value: other.to_string(),
                    at: ctx.at.clone(),
                });
            }
        }
    }

    Ok(ModuleOutcome::Fragment(fragment(&name, size, axis, inverse)))
}

const TWO_PI: &str = "6.28318548";

fn vertex_stage() -> &'static str {
    // Oversized triangle covering the whole target.
    "@vertex\n\
     fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {\n\
         let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));\n\
         return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);\n\
     }\n"
}

/// One decimation-in-frequency butterfly pass. `block` halves every stage;
/// the lower half of each block stores sums, the upper half differences
/// rotated by the twiddle factor.
fn stage_wgsl(axis: Axis, block: u32, inverse: bool) -> String {
    let half = block / 2;
    let (lane, offset) = match axis {
        Axis::Horizontal => ("u32(coord.x)", format!("vec2<i32>({half}, 0)")),
        Axis::Vertical => ("u32(coord.y)", format!("vec2<i32>(0, {half})")),
    };
    let sign = if inverse { "" } else { "-" };
    format!(
        "@group(0) @binding(0) var src: texture_2d<f32>;\n\
         \n\
         {vertex}\n\
         @fragment\n\
         fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {{\n\
             let coord = vec2<i32>(position.xy);\n\
             let lane = {lane};\n\
             let j = lane % {block}u;\n\
             var value: vec2<f32>;\n\
             if (j < {half}u) {{\n\
                 let a = textureLoad(src, coord, 0).rg;\n\
                 let b = textureLoad(src, coord + {offset}, 0).rg;\n\
                 value = a + b;\n\
             }} else {{\n\
                 let a = textureLoad(src, coord - {offset}, 0).rg;\n\
                 let b = textureLoad(src, coord, 0).rg;\n\
                 let d = a - b;\n\
                 let angle = {sign}{TWO_PI} * f32(j - {half}u) / {block}.0;\n\
                 let w = vec2<f32>(cos(angle), sin(angle));\n\
                 value = vec2<f32>(d.x * w.x - d.y * w.y, d.x * w.y + d.y * w.x);\n\
             }}\n\
             return vec4<f32>(value, 0.0, 1.0);\n\
         }}\n",
        vertex = vertex_stage(),
    )
}

/// Decimation in frequency leaves results in bit-reversed order; this final
/// pass permutes them back. The inverse transform also normalizes by 1/N.
fn reorder_wgsl(axis: Axis, size: u32, inverse: bool) -> String {
    let bits = size.trailing_zeros();
    let (lane, source) = match axis {
        Axis::Horizontal => ("u32(coord.x)", "vec2<i32>(i32(reversed), coord.y)"),
        Axis::Vertical => ("u32(coord.y)", "vec2<i32>(coord.x, i32(reversed))"),
    };
    let scale = if inverse {
        format!(" / {size}.0")
    } else {
        String::new()
    };
    format!(
        "@group(0) @binding(0) var src: texture_2d<f32>;\n\
         \n\
         {vertex}\n\
         @fragment\n\
         fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {{\n\
             let coord = vec2<i32>(position.xy);\n\
             let lane = {lane};\n\
             var reversed = 0u;\n\
             var remaining = lane;\n\
             for (var k = 0u; k < {bits}u; k = k + 1u) {{\n\
                 reversed = (reversed << 1u) | (remaining & 1u);\n\
                 remaining = remaining >> 1u;\n\
             }}\n\
             let value = textureLoad(src, {source}, 0).rg{scale};\n\
             return vec4<f32>(value, 0.0, 1.0);\n\
         }}\n",
        vertex = vertex_stage(),
    )
}

fn fragment(name: &str, size: u32, axis: Axis, inverse: bool) -> String {
    let prefix = format!("__fft_{name}");
    let stages = size.trailing_zeros();
    let mut out = String::new();

    let _ = writeln!(out, "FORMAT:{prefix}_fmt({size}, {size}, RG, FLOAT, NEAREST)");
    for k in 0..stages {
        let block = size >> k;
        let _ = writeln!(
            out,
            "SHADER:{prefix}_stage{k}_sh {{\n{}}}",
            stage_wgsl(axis, block, inverse)
        );
        let _ = writeln!(out, "FILTER:{prefix}_stage{k}({prefix}_fmt, {prefix}_stage{k}_sh)");
    }
    let _ = writeln!(
        out,
        "SHADER:{prefix}_reorder_sh {{\n{}}}",
        reorder_wgsl(axis, size, inverse)
    );
    let _ = writeln!(out, "FILTER:{prefix}_reorder({prefix}_fmt, {prefix}_reorder_sh)");

    let _ = writeln!(out, "PIPELINE:{name} {{");
    let _ = writeln!(out, "    INPUT(src)");
    let _ = writeln!(out, "    OUTPUT(color)");
    for k in 0..stages {
        let _ = writeln!(out, "    NODE:stage{k}({prefix}_stage{k})");
    }
    let _ = writeln!(out, "    NODE:reorder({prefix}_reorder)");
    let _ = writeln!(out, "    CONNECT(SELF, src, stage0, src)");
    for k in 1..stages {
        let _ = writeln!(out, "    CONNECT(stage{}, color, stage{k}, src)", k - 1);
    }
    let _ = writeln!(
        out,
        "    CONNECT(stage{}, color, reorder, src)",
        stages - 1
    );
    let _ = writeln!(out, "    CONNECT(reorder, color, SELF, color)");
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use crate::error::CompileError;
    use crate::script::ScriptCompiler;

    #[test]
    fn generates_one_filter_per_stage_plus_reorder() {
        let compilation = ScriptCompiler::new()
            .compile_text("CALL:FFT(f, 8)", "test")
            .unwrap();
        let pipeline = compilation.pipeline("f").unwrap();
        // log2(8) = 3 butterfly stages + bit-reversal reorder.
        assert_eq!(pipeline.instances.len(), 4);
        assert!(pipeline.is_finalized());
        assert_eq!(pipeline.resolved().unwrap().order.len(), 4);
        let fmt = compilation.tables.formats.lookup("__fft_f_fmt").unwrap();
        assert_eq!((fmt.width, fmt.height), (8, 8));
    }

    #[test]
    fn generated_shaders_pass_full_validation() {
        let compilation = ScriptCompiler::new()
            .compile_text("CALL:FFT(f, 4, VERTICAL, INVERSE)", "test")
            .unwrap();
        for k in 0..2 {
            let shader = compilation
                .tables
                .shaders
                .lookup(&format!("__fft_f_stage{k}_sh"))
                .unwrap();
            shader.validate().unwrap();
        }
        let reorder = compilation
            .tables
            .shaders
            .lookup("__fft_f_reorder_sh")
            .unwrap();
        reorder.validate().unwrap();
        assert!(reorder.text.contains("/ 4.0"));
    }

    #[test]
    fn forward_and_inverse_disagree_on_twiddle_sign() {
        let forward = ScriptCompiler::new()
            .compile_text("CALL:FFT(f, 4)", "test")
            .unwrap();
        let stage = forward.tables.shaders.lookup("__fft_f_stage0_sh").unwrap();
        assert!(stage.text.contains("-6.28318548"));

        let inverse = ScriptCompiler::new()
            .compile_text("CALL:FFT(f, 4, INVERSE)", "test")
            .unwrap();
        let stage = inverse.tables.shaders.lookup("__fft_f_stage0_sh").unwrap();
        assert!(stage.text.contains("= 6.28318548"));
    }

    #[test]
    fn non_power_of_two_size_rejected() {
        let err = ScriptCompiler::new()
            .compile_text("CALL:FFT(f, 6)", "test")
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidValue {
                what: "transform size",
                ..
            }
        ));
    }

    #[test]
    fn two_transforms_coexist() {
        let compilation = ScriptCompiler::new()
            .compile_text("CALL:FFT(rows, 4)\nCALL:FFT(cols, 4, VERTICAL)", "test")
            .unwrap();
        assert!(compilation.pipeline("rows").is_some());
        assert!(compilation.pipeline("cols").is_some());
    }
}

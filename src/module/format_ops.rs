//! Format algebra and aggregate selection modules.
//!
//! Every operation derives a new format from existing table entries and
//! registers it under the first argument; dimensions always clamp to at
//! least 1.

use crate::error::{CompileError, SourcePos};
use crate::format::{self, TextureFormat};
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::element::Req;

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.define("FORMAT_RESIZE", 4, 4, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let width = ctx.arg_u32(2, "format width")?;
        let height = ctx.arg_u32(3, "format height")?;
        insert(ctx, src.resized(width, height))
    });
    registry.define("FORMAT_SCALE", 3, 4, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let fx = ctx.arg_f64(2, "scale factor")?;
        let fy = if ctx.args.len() > 3 {
            ctx.arg_f64(3, "scale factor")?
        } else {
            fx
        };
        insert(ctx, src.scaled_by(fx, fy))
    });
    registry.define("FORMAT_SCALE_TO", 3, 3, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let reference = *ctx.tables.formats.resolve(ctx.arg(2), ctx.at)?;
        insert(ctx, src.scaled_to(&reference))
    });
    registry.define("FORMAT_CHANNELS", 3, 3, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let channels = format::parse_channels(ctx.arg(2), ctx.at)?;
        insert(ctx, src.with_channels(channels))
    });
    registry.define("FORMAT_DEPTH", 3, 3, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let depth = format::parse_depth(ctx.arg(2), ctx.at)?;
        insert(ctx, src.with_depth(depth))
    });
    registry.define("FORMAT_FILTERING", 3, 4, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let filter = format::parse_filter(ctx.arg(2), ctx.at)?;
        let wrap = if ctx.args.len() > 3 {
            format::parse_wrap(ctx.arg(3), ctx.at)?
        } else {
            src.wrap
        };
        insert(ctx, src.with_filtering(filter, wrap))
    });
    registry.define("FORMAT_MIPS", 3, 3, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        let src = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
        let mips = ctx.arg_u32(2, "format mip levels")?;
        insert(ctx, src.with_mip_levels(mips))
    });
    registry.define("FORMAT_SELECT", 4, usize::MAX, Req::Forbidden, format_select);
}

fn insert(ctx: &mut ModuleContext<'_>, format: TextureFormat) -> Result<ModuleOutcome, CompileError> {
    let name = ctx.arg(0).to_string();
    ctx.tables.formats.insert_local(&name, format, ctx.at)?;
    Ok(ModuleOutcome::Done)
}

/// Value of one numeric format field, shared with the conditional operands.
pub(crate) fn format_field(
    format: &TextureFormat,
    field: &str,
    at: &SourcePos,
) -> Result<u64, CompileError> {
    match field {
        "WIDTH" => Ok(u64::from(format.width)),
        "HEIGHT" => Ok(u64::from(format.height)),
        "PIXELS" => Ok(format.pixel_count()),
        "ELEMENTS" => Ok(format.element_count()),
        "MIPS" => Ok(u64::from(format.mip_levels)),
        other => Err(CompileError::InvalidValue {
            what: "format field",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

/// `FORMAT_SELECT(new, MIN|MAX, FIELD, f...)`: register the candidate with
/// the smallest/largest field value. Ties keep the earliest candidate.
fn format_select(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let want_max = match ctx.arg(1) {
        "MIN" => false,
        "MAX" => true,
        other => {
            return Err(CompileError::InvalidValue {
                what: "selection mode",
                value: other.to_string(),
                at: ctx.at.clone(),
            });
        }
    };
    let field = ctx.arg(2);

    let mut best: Option<(u64, TextureFormat)> = None;
    for candidate_name in &ctx.args[3..] {
        let candidate = *ctx.tables.formats.resolve(candidate_name, ctx.at)?;
        let value = format_field(&candidate, field, ctx.at)?;
        let better = match &best {
            None => true,
            Some((best_value, _)) => {
                if want_max {
                    value > *best_value
                } else {
                    value < *best_value
                }
            }
        };
        if better {
            best = Some((value, candidate));
        }
    }
    // min_args = 4 guarantees at least one candidate.
    let (_, chosen) = best.ok_or_else(|| CompileError::InvalidValue {
        what: "format selection",
        value: "no candidates".into(),
        at: ctx.at.clone(),
    })?;
    insert(ctx, chosen)
}

#[cfg(test)]
mod tests {
    use crate::format::{ChannelLayout, FilterMode, SampleDepth};
    use crate::script::ScriptCompiler;

    fn compile(script: &str) -> crate::tables::CompilerTables {
        ScriptCompiler::new()
            .compile_text(script, "test")
            .unwrap()
            .tables
    }

    #[test]
    fn scale_clamps_to_one() {
        let tables = compile(
            "FORMAT:base(64, 64, RGBA, UNSIGNED_BYTE)\n\
             CALL:FORMAT_SCALE(tiny, base, 0.001)",
        );
        let tiny = tables.formats.lookup("tiny").unwrap();
        assert_eq!((tiny.width, tiny.height), (1, 1));
    }

    #[test]
    fn resize_and_field_ops_keep_other_fields() {
        let tables = compile(
            "FORMAT:base(64, 32, RGBA, HALF_FLOAT, NEAREST)\n\
             CALL:FORMAT_RESIZE(small, base, 8, 4)\n\
             CALL:FORMAT_CHANNELS(gray, small, R)\n\
             CALL:FORMAT_DEPTH(precise, gray, FLOAT)\n\
             CALL:FORMAT_MIPS(mipped, precise, 3)",
        );
        let mipped = tables.formats.lookup("mipped").unwrap();
        assert_eq!((mipped.width, mipped.height), (8, 4));
        assert_eq!(mipped.channels, ChannelLayout::R);
        assert_eq!(mipped.depth, SampleDepth::Float);
        assert_eq!(mipped.filter, FilterMode::Nearest);
        assert_eq!(mipped.mip_levels, 3);
    }

    #[test]
    fn scale_to_adopts_reference_dimensions() {
        let tables = compile(
            "FORMAT:a(64, 64, RGBA, UNSIGNED_BYTE)\n\
             FORMAT:b(320, 180, R, FLOAT)\n\
             CALL:FORMAT_SCALE_TO(fit, a, b)",
        );
        let fit = tables.formats.lookup("fit").unwrap();
        assert_eq!((fit.width, fit.height), (320, 180));
        assert_eq!(fit.channels, ChannelLayout::Rgba);
    }

    #[test]
    fn select_min_pixels_keeps_first_on_tie() {
        let tables = compile(
            "FORMAT:a(8, 8, RGBA, UNSIGNED_BYTE)\n\
             FORMAT:b(4, 16, R, FLOAT)\n\
             FORMAT:c(4, 4, R, FLOAT)\n\
             CALL:FORMAT_SELECT(pick, MIN, PIXELS, a, b, c)",
        );
        let pick = tables.formats.lookup("pick").unwrap();
        assert_eq!((pick.width, pick.height), (4, 4));

        // a and b tie on PIXELS; the earlier candidate wins.
        let tables = compile(
            "FORMAT:a(8, 8, RGBA, UNSIGNED_BYTE)\n\
             FORMAT:b(4, 16, R, FLOAT)\n\
             CALL:FORMAT_SELECT(pick, MIN, PIXELS, a, b)",
        );
        assert_eq!(tables.formats.lookup("pick").unwrap().width, 8);
    }

    #[test]
    fn select_max_elements_accounts_for_channels() {
        let tables = compile(
            "FORMAT:wide(16, 16, R, FLOAT)\n\
             FORMAT:deep(8, 8, RGBA, FLOAT)\n\
             CALL:FORMAT_SELECT(pick, MAX, ELEMENTS, wide, deep)",
        );
        // 16*16*1 = 256 equals 8*8*4 = 256; first candidate wins the tie.
        assert_eq!(tables.formats.lookup("pick").unwrap().width, 16);

        let tables = compile(
            "FORMAT:wide(16, 16, R, FLOAT)\n\
             FORMAT:deep(16, 8, RGBA, FLOAT)\n\
             CALL:FORMAT_SELECT(pick, MAX, ELEMENTS, wide, deep)",
        );
        assert_eq!(tables.formats.lookup("pick").unwrap().channels, ChannelLayout::Rgba);
    }

    #[test]
    fn derived_name_collision_rejected() {
        let err = ScriptCompiler::new()
            .compile_text(
                "FORMAT:base(8, 8, RGBA, UNSIGNED_BYTE)\n\
                 CALL:FORMAT_RESIZE(base, base, 4, 4)",
                "test",
            )
            .unwrap_err();
        assert!(err.to_string().contains("duplicate format symbol base"));
    }
}

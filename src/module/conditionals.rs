//! Conditional modules: `IF_DEFINED`, `IF_EQUAL`, `IF_GREATER`.
//!
//! The invocation body holds a `THEN { ... }` block and an optional
//! `ELSE { ... }` block; the selected block is returned as a fragment and
//! compiled in place of the invocation. Numeric operands are integer literals
//! or `format.FIELD` references resolved against the format table.

use crate::error::{CompileError, SourcePos};
use crate::module::format_ops::format_field;
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::element::{Req, Shape, check_shape};
use crate::script::lexer;

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.define("IF_DEFINED", 2, 2, Req::Mandatory, if_defined);
    registry.define("IF_EQUAL", 2, 2, Req::Mandatory, if_equal);
    registry.define("IF_GREATER", 2, 2, Req::Mandatory, if_greater);
}

struct Branches {
    then_text: String,
    else_text: Option<String>,
}

const BRANCH_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Mandatory, 0, 0);

fn split_branches(ctx: &ModuleContext<'_>) -> Result<Branches, CompileError> {
    // Shape check guarantees the body is present.
    let body = ctx.body.ok_or_else(|| CompileError::Shape {
        message: "conditional must have a body".into(),
        at: ctx.at.clone(),
    })?;
    let mut then_text: Option<String> = None;
    let mut else_text: Option<String> = None;
    for item in lexer::lex(&body.text, &ctx.at.source, body.line)? {
        let slot = match item.keyword.as_str() {
            "THEN" => &mut then_text,
            "ELSE" => &mut else_text,
            other => {
                return Err(CompileError::UnknownKeyword {
                    keyword: other.to_string(),
                    at: item.at.clone(),
                });
            }
        };
        check_shape(&item, &item.keyword, &BRANCH_SHAPE)?;
        if slot.is_some() {
            return Err(CompileError::Shape {
                message: format!("conditional has more than one {} block", item.keyword),
                at: item.at.clone(),
            });
        }
        *slot = item.body.map(|b| b.text);
    }
    let Some(then_text) = then_text else {
        return Err(CompileError::Shape {
            message: "conditional has no THEN block".into(),
            at: ctx.at.clone(),
        });
    };
    Ok(Branches {
        then_text,
        else_text,
    })
}

fn pick(branches: Branches, condition: bool) -> ModuleOutcome {
    let chosen = if condition {
        Some(branches.then_text)
    } else {
        branches.else_text
    };
    match chosen {
        Some(text) => ModuleOutcome::Fragment(text),
        None => ModuleOutcome::Done,
    }
}

/// Evaluate a numeric operand: an integer literal or `format.FIELD`.
fn operand(ctx: &ModuleContext<'_>, index: usize) -> Result<u64, CompileError> {
    let raw = ctx.arg(index);
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }
    let Some((format_name, field)) = raw.split_once('.') else {
        return Err(invalid_operand(raw, ctx.at));
    };
    let format = ctx.tables.formats.resolve(format_name, ctx.at)?;
    format_field(format, field, ctx.at)
}

fn invalid_operand(value: &str, at: &SourcePos) -> CompileError {
    CompileError::InvalidValue {
        what: "conditional operand",
        value: value.to_string(),
        at: at.clone(),
    }
}

fn if_defined(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let branches = split_branches(ctx)?;
    let name = ctx.arg(1);
    let defined = match ctx.arg(0) {
        "FORMAT" => ctx.tables.formats.contains(name),
        "SHADER" => ctx.tables.shaders.contains(name),
        "GEOMETRY" => ctx.tables.geometries.contains(name),
        "LAYOUT" => ctx.tables.layouts.contains(name),
        other => {
            return Err(CompileError::InvalidValue {
                what: "symbol table",
                value: other.to_string(),
                at: ctx.at.clone(),
            });
        }
    };
    Ok(pick(branches, defined))
}

fn if_equal(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let branches = split_branches(ctx)?;
    let condition = operand(ctx, 0)? == operand(ctx, 1)?;
    Ok(pick(branches, condition))
}

fn if_greater(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let branches = split_branches(ctx)?;
    let condition = operand(ctx, 0)? > operand(ctx, 1)?;
    Ok(pick(branches, condition))
}

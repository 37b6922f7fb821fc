//! Structural generator modules: geometry derivation, pipeline chaining and
//! inline single-shader pipelines.

use std::sync::Arc;

use crate::error::{CompileError, LayoutError};
use crate::geometry::GeometryModel;
use crate::layout::shader::ShaderSource;
use crate::layout::{ComponentLayout, FilterLayout, PipelineLayout, SELF_ID};
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::element::Req;

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.define("GEOMETRY_FROM_FORMAT", 2, 3, Req::Forbidden, geometry_from_format);
    registry.define("CHAIN", 2, usize::MAX, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        chain(ctx, false)
    });
    registry.define("CHAIN_STRICT", 2, usize::MAX, Req::Forbidden, |ctx: &mut ModuleContext<'_>| {
        chain(ctx, true)
    });
    registry.define("SHADER_PIPELINE", 2, 3, Req::Mandatory, shader_pipeline);
}

/// `GEOMETRY_FROM_FORMAT(name, format[, QUAD|POINTS])`: derive a geometry
/// sized to a format. Defaults to one point per texel.
fn geometry_from_format(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let format = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
    let model = match ctx.args.get(2).map(String::as_str) {
        None | Some("POINTS") => GeometryModel::points(format.width, format.height),
        Some("QUAD") => GeometryModel::quad(),
        Some(other) => {
            return Err(CompileError::InvalidValue {
                what: "geometry primitive",
                value: other.to_string(),
                at: ctx.at.clone(),
            });
        }
    };
    let name = ctx.arg(0).to_string();
    ctx.tables.geometries.insert_local(&name, model, ctx.at)?;
    Ok(ModuleOutcome::Done)
}

fn wrap_layout(ctx: &ModuleContext<'_>, module: &str, error: LayoutError) -> CompileError {
    CompileError::from(error).with_context(format!("in module {module} ({})", ctx.at))
}

/// `CHAIN(name, p...)`: build a pipeline wiring the listed components
/// output-to-input in order. The new pipeline exposes the first component's
/// inputs and the last component's outputs under their original names.
///
/// Stage boundaries are paired positionally. Strict mode requires the
/// producer's output count to equal the consumer's input count; lax mode
/// wires `min(outputs, inputs)` pairs and leaves the rest to auto-connect
/// completeness checking (surplus consumer inputs fail there).
fn chain(ctx: &mut ModuleContext<'_>, strict: bool) -> Result<ModuleOutcome, CompileError> {
    let module = if strict { "CHAIN_STRICT" } else { "CHAIN" };
    let name = ctx.arg(0).to_string();

    let mut stages: Vec<Arc<ComponentLayout>> = Vec::with_capacity(ctx.args.len() - 1);
    for stage_name in &ctx.args[1..] {
        let component = ctx.tables.layouts.resolve(stage_name, ctx.at)?.clone();
        stages.push(Arc::new(component));
    }

    let mut pipeline = PipelineLayout::new(&name);
    let wrap = |e: LayoutError, ctx: &ModuleContext<'_>| wrap_layout(ctx, module, e);

    for port in stages[0].input_ports() {
        pipeline.add_input(&port.name).map_err(|e| wrap(e, ctx))?;
    }
    let last = stages.len() - 1;
    for port in stages[last].output_ports() {
        pipeline.add_output(&port.name).map_err(|e| wrap(e, ctx))?;
    }
    for (index, stage) in stages.iter().enumerate() {
        pipeline
            .add(Arc::clone(stage), format!("stage{index}"))
            .map_err(|e| wrap(e, ctx))?;
    }

    for port in stages[0].input_ports() {
        pipeline
            .connect(SELF_ID, &port.name, "stage0", &port.name)
            .map_err(|e| wrap(e, ctx))?;
    }
    for index in 0..last {
        let from = stages[index].output_ports();
        let to = stages[index + 1].input_ports();
        if strict && from.len() != to.len() {
            return Err(CompileError::Shape {
                message: format!(
                    "module {module}: {} has {} outputs but {} has {} inputs",
                    stages[index].name(),
                    from.len(),
                    stages[index + 1].name(),
                    to.len(),
                ),
                at: ctx.at.clone(),
            });
        }
        for (src, dst) in from.iter().zip(to.iter()) {
            pipeline
                .connect(
                    &format!("stage{index}"),
                    &src.name,
                    &format!("stage{}", index + 1),
                    &dst.name,
                )
                .map_err(|e| wrap(e, ctx))?;
        }
    }
    for port in stages[last].output_ports() {
        pipeline
            .connect(&format!("stage{last}"), &port.name, SELF_ID, &port.name)
            .map_err(|e| wrap(e, ctx))?;
    }

    pipeline.finalize().map_err(|e| wrap(e, ctx))?;
    ctx.tables
        .layouts
        .insert_local(&name, ComponentLayout::Pipeline(pipeline), ctx.at)?;
    Ok(ModuleOutcome::Done)
}

/// `SHADER_PIPELINE(name, format[, MAIN]) { wgsl }`: wrap one inline shader
/// into a shader + filter + single-node pipeline. Ports come from reflection;
/// the pipeline re-exports them under the same names. The intermediate shader
/// and filter are registered under `__<name>_shader` / `__<name>_filter`.
fn shader_pipeline(ctx: &mut ModuleContext<'_>) -> Result<ModuleOutcome, CompileError> {
    let name = ctx.arg(0).to_string();
    let format = *ctx.tables.formats.resolve(ctx.arg(1), ctx.at)?;
    let main = match ctx.args.get(2).map(String::as_str) {
        None => false,
        Some("MAIN") => true,
        Some(other) => {
            return Err(CompileError::InvalidValue {
                what: "pipeline flag",
                value: other.to_string(),
                at: ctx.at.clone(),
            });
        }
    };
    let body = ctx.body.ok_or_else(|| CompileError::Shape {
        message: "module SHADER_PIPELINE must have a body".into(),
        at: ctx.at.clone(),
    })?;

    let wrap = |e: LayoutError, ctx: &ModuleContext<'_>| wrap_layout(ctx, "SHADER_PIPELINE", e);

    let shader_name = format!("__{name}_shader");
    let filter_name = format!("__{name}_filter");
    let shader = ShaderSource::new(&shader_name, &body.text);
    let filter = FilterLayout::new(&filter_name, format, vec![shader.clone()])
        .map_err(|e| wrap(e, ctx))?;

    let mut pipeline = PipelineLayout::new(&name);
    for port in &filter.inputs {
        pipeline.add_input(&port.name).map_err(|e| wrap(e, ctx))?;
    }
    for port in &filter.outputs {
        pipeline.add_output(&port.name).map_err(|e| wrap(e, ctx))?;
    }
    let inputs: Vec<String> = filter.inputs.iter().map(|p| p.name.clone()).collect();
    let outputs: Vec<String> = filter.outputs.iter().map(|p| p.name.clone()).collect();
    pipeline
        .add(Arc::new(ComponentLayout::Filter(filter.clone())), "node")
        .map_err(|e| wrap(e, ctx))?;
    for port in &inputs {
        pipeline
            .connect(SELF_ID, port, "node", port)
            .map_err(|e| wrap(e, ctx))?;
    }
    for port in &outputs {
        pipeline
            .connect("node", port, SELF_ID, port)
            .map_err(|e| wrap(e, ctx))?;
    }
    pipeline.finalize().map_err(|e| wrap(e, ctx))?;

    ctx.tables.shaders.insert_local(&shader_name, shader, ctx.at)?;
    ctx.tables
        .layouts
        .insert_local(&filter_name, ComponentLayout::Filter(filter), ctx.at)?;
    ctx.tables
        .layouts
        .insert_local(&name, ComponentLayout::Pipeline(pipeline), ctx.at)?;

    if main {
        if let Some(existing) = ctx.main_pipeline.as_deref() {
            return Err(CompileError::DuplicateSymbol {
                kind: "main pipeline",
                name: format!("{existing} / {name}"),
                at: ctx.at.clone(),
            });
        }
        *ctx.main_pipeline = Some(name);
    }
    Ok(ModuleOutcome::Done)
}

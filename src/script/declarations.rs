//! Declaration builders: one function per declaration keyword, translating a
//! shape-checked element into a table entry.

use std::sync::Arc;

use crate::error::{CompileError, LayoutError, SourcePos};
use crate::format::{self, TextureFormat};
use crate::geometry::GeometryModel;
use crate::layout::filter::{BlendFactor, DepthCompare, FilterLayout, RenderState};
use crate::layout::shader::ShaderSource;
use crate::layout::{ComponentLayout, PipelineLayout};
use crate::script::compiler::Session;
use crate::script::element::{Element, Req, Shape, check_shape};
use crate::script::lexer;

const FORMAT_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Forbidden, 4, 7);
const SHADER_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Mandatory, 0, 0);
const GEOMETRY_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Forbidden, 1, 3);
const FILTER_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Optional, 2, usize::MAX);
const PIPELINE_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Mandatory, 0, 0);
const REQUIRED_FORMAT_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Forbidden, 1, 8);
const REQUIRED_REF_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Forbidden, 1, 1);

fn element_name(element: &Element) -> &str {
    // Shape checks run first, so Mandatory names are always present here.
    element.name.as_deref().unwrap_or_default()
}

fn layout_err(error: LayoutError, context: String) -> CompileError {
    CompileError::from(error).with_context(context)
}

pub(crate) fn declare_format(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "FORMAT", &FORMAT_SHAPE)?;
    let format = build_format(element)?;
    session
        .tables
        .formats
        .insert_local(element_name(element), format, &element.at)
}

fn build_format(element: &Element) -> Result<TextureFormat, CompileError> {
    let width = element.arg_u32(0, "format width")?;
    let height = element.arg_u32(1, "format height")?;
    let channels = format::parse_channels(element.arg(2), &element.at)?;
    let depth = format::parse_depth(element.arg(3), &element.at)?;
    let mut format = TextureFormat::new(width, height, channels, depth);
    if element.args.len() > 4 {
        format.filter = format::parse_filter(element.arg(4), &element.at)?;
    }
    if element.args.len() > 5 {
        format.wrap = format::parse_wrap(element.arg(5), &element.at)?;
    }
    if element.args.len() > 6 {
        format.mip_levels = element.arg_u32(6, "format mip levels")?.max(1);
    }
    Ok(format)
}

pub(crate) fn declare_shader(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "SHADER", &SHADER_SHAPE)?;
    let name = element_name(element);
    let body = element.body.as_ref().ok_or_else(|| CompileError::Shape {
        message: "SHADER must have a body".into(),
        at: element.at.clone(),
    })?;
    let shader = ShaderSource::new(name, &body.text);
    // Reflect at declaration time so a malformed shader is reported at its
    // own line, not when a filter first uses it.
    shader
        .reflect()
        .map_err(|e| layout_err(e, format!("in shader {name} ({})", element.at)))?;
    session.tables.shaders.insert_local(name, shader, &element.at)
}

pub(crate) fn declare_geometry(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "GEOMETRY", &GEOMETRY_SHAPE)?;
    let model = match element.arg(0) {
        "QUAD" => {
            if element.args.len() != 1 {
                return Err(CompileError::Shape {
                    message: "GEOMETRY QUAD must have 1 arguments".into(),
                    at: element.at.clone(),
                });
            }
            GeometryModel::quad()
        }
        "POINTS" => {
            if element.args.len() != 3 {
                return Err(CompileError::Shape {
                    message: "GEOMETRY POINTS must have 3 arguments".into(),
                    at: element.at.clone(),
                });
            }
            let width = element.arg_u32(1, "point grid width")?;
            let height = element.arg_u32(2, "point grid height")?;
            GeometryModel::points(width, height)
        }
        other => {
            return Err(CompileError::InvalidValue {
                what: "geometry primitive",
                value: other.to_string(),
                at: element.at.clone(),
            });
        }
    };
    session
        .tables
        .geometries
        .insert_local(element_name(element), model, &element.at)
}

pub(crate) fn declare_filter(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "FILTER", &FILTER_SHAPE)?;
    let name = element_name(element);

    let format = *session.tables.formats.resolve(element.arg(0), &element.at)?;
    let mut shaders = Vec::with_capacity(element.args.len() - 1);
    for shader_name in &element.args[1..] {
        shaders.push(session.tables.shaders.resolve(shader_name, &element.at)?.clone());
    }

    let mut filter = FilterLayout::new(name, format, shaders)
        .map_err(|e| layout_err(e, format!("in filter {name} ({})", element.at)))?;

    if let Some(body) = &element.body {
        let (state, geometries) = parse_filter_body(session, body, &element.at)?;
        filter = filter.with_render_state(state).with_geometries(geometries);
    }

    session.tables.layouts.insert_local(
        name,
        ComponentLayout::Filter(filter),
        &element.at,
    )
}

const CLEAR_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, 1);
const BLEND_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 2, 2);
const DEPTH_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, 1);
const DRAW_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, usize::MAX);

fn parse_filter_body(
    session: &Session<'_>,
    body: &crate::script::element::Body,
    at: &SourcePos,
) -> Result<(RenderState, Vec<GeometryModel>), CompileError> {
    let mut state = RenderState::default();
    let mut geometries = Vec::new();
    for item in lexer::lex(&body.text, &at.source, body.line)? {
        match item.keyword.as_str() {
            "CLEAR" => {
                check_shape(&item, "CLEAR", &CLEAR_SHAPE)?;
                state.clear = match item.arg(0) {
                    "ON" => true,
                    "OFF" => false,
                    other => {
                        return Err(CompileError::InvalidValue {
                            what: "clear flag",
                            value: other.to_string(),
                            at: item.at.clone(),
                        });
                    }
                };
            }
            "BLEND" => {
                check_shape(&item, "BLEND", &BLEND_SHAPE)?;
                state.blend = Some((
                    parse_blend_factor(item.arg(0), &item.at)?,
                    parse_blend_factor(item.arg(1), &item.at)?,
                ));
            }
            "DEPTH" => {
                check_shape(&item, "DEPTH", &DEPTH_SHAPE)?;
                state.depth_test = Some(parse_depth_compare(item.arg(0), &item.at)?);
            }
            "DRAW" => {
                check_shape(&item, "DRAW", &DRAW_SHAPE)?;
                for geometry_name in &item.args {
                    geometries.push(
                        session
                            .tables
                            .geometries
                            .resolve(geometry_name, &item.at)?
                            .clone(),
                    );
                }
            }
            other => {
                return Err(CompileError::UnknownKeyword {
                    keyword: other.to_string(),
                    at: item.at.clone(),
                });
            }
        }
    }
    Ok((state, geometries))
}

fn parse_blend_factor(value: &str, at: &SourcePos) -> Result<BlendFactor, CompileError> {
    match value {
        "ZERO" => Ok(BlendFactor::Zero),
        "ONE" => Ok(BlendFactor::One),
        "SRC_ALPHA" => Ok(BlendFactor::SrcAlpha),
        "ONE_MINUS_SRC_ALPHA" => Ok(BlendFactor::OneMinusSrcAlpha),
        other => Err(CompileError::InvalidValue {
            what: "blend factor",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

fn parse_depth_compare(value: &str, at: &SourcePos) -> Result<DepthCompare, CompileError> {
    match value {
        "LESS" => Ok(DepthCompare::Less),
        "LESS_EQUAL" => Ok(DepthCompare::LessEqual),
        "EQUAL" => Ok(DepthCompare::Equal),
        "GREATER" => Ok(DepthCompare::Greater),
        "GREATER_EQUAL" => Ok(DepthCompare::GreaterEqual),
        "ALWAYS" => Ok(DepthCompare::Always),
        other => Err(CompileError::InvalidValue {
            what: "depth comparison",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

const INPUT_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, usize::MAX);
const OUTPUT_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 1, usize::MAX);
const NODE_SHAPE: Shape = Shape::new(Req::Mandatory, Req::Forbidden, 1, 1);
const CONNECT_SHAPE: Shape = Shape::new(Req::Forbidden, Req::Forbidden, 4, 4);

pub(crate) fn declare_pipeline(
    session: &mut Session<'_>,
    element: &Element,
    is_main: bool,
) -> Result<(), CompileError> {
    let what = if is_main { "MAIN_PIPELINE" } else { "PIPELINE" };
    check_shape(element, what, &PIPELINE_SHAPE)?;
    let name = element_name(element);
    let body = element.body.as_ref().ok_or_else(|| CompileError::Shape {
        message: format!("{what} must have a body"),
        at: element.at.clone(),
    })?;

    let mut pipeline = PipelineLayout::new(name);
    for item in lexer::lex(&body.text, &element.at.source, body.line)? {
        let wrap = |e: LayoutError, at: &SourcePos| {
            layout_err(e, format!("in pipeline {name} ({at})"))
        };
        match item.keyword.as_str() {
            "INPUT" => {
                check_shape(&item, "INPUT", &INPUT_SHAPE)?;
                for port in &item.args {
                    pipeline.add_input(port).map_err(|e| wrap(e, &item.at))?;
                }
            }
            "OUTPUT" => {
                check_shape(&item, "OUTPUT", &OUTPUT_SHAPE)?;
                for port in &item.args {
                    pipeline.add_output(port).map_err(|e| wrap(e, &item.at))?;
                }
            }
            "NODE" => {
                check_shape(&item, "NODE", &NODE_SHAPE)?;
                let component = session
                    .tables
                    .layouts
                    .resolve(item.arg(0), &item.at)?
                    .clone();
                pipeline
                    .add(Arc::new(component), element_name(&item))
                    .map_err(|e| wrap(e, &item.at))?;
            }
            "CONNECT" => {
                check_shape(&item, "CONNECT", &CONNECT_SHAPE)?;
                pipeline
                    .connect(item.arg(0), item.arg(1), item.arg(2), item.arg(3))
                    .map_err(|e| wrap(e, &item.at))?;
            }
            other => {
                return Err(CompileError::UnknownKeyword {
                    keyword: other.to_string(),
                    at: item.at.clone(),
                });
            }
        }
    }

    pipeline
        .finalize()
        .map_err(|e| layout_err(e, format!("while finalizing pipeline {name} ({})", element.at)))?;

    session.tables.layouts.insert_local(
        name,
        ComponentLayout::Pipeline(pipeline),
        &element.at,
    )?;

    if is_main {
        if let Some(existing) = &session.main {
            return Err(CompileError::DuplicateSymbol {
                kind: "main pipeline",
                name: format!("{existing} / {name}"),
                at: element.at.clone(),
            });
        }
        session.main = Some(name.to_string());
    }
    Ok(())
}

/// `REQUIRED_FORMAT:name(base, [w, h, channels, depth, filter, wrap, mips])`
/// re-declares a (usually host-injected) format under a new local name with
/// positional field overrides; `*` keeps the base value for that field.
pub(crate) fn required_format(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "REQUIRED_FORMAT", &REQUIRED_FORMAT_SHAPE)?;
    let mut format = *session.tables.formats.resolve(element.arg(0), &element.at)?;

    let field = |index: usize| -> Option<&str> {
        element.args.get(index).map(String::as_str).filter(|a| *a != "*")
    };
    if field(1).is_some() {
        format.width = element.arg_u32(1, "format width")?.max(1);
    }
    if field(2).is_some() {
        format.height = element.arg_u32(2, "format height")?.max(1);
    }
    if let Some(channels) = field(3) {
        format.channels = format::parse_channels(channels, &element.at)?;
    }
    if let Some(depth) = field(4) {
        format.depth = format::parse_depth(depth, &element.at)?;
    }
    if let Some(filter) = field(5) {
        format.filter = format::parse_filter(filter, &element.at)?;
    }
    if let Some(wrap) = field(6) {
        format.wrap = format::parse_wrap(wrap, &element.at)?;
    }
    if field(7).is_some() {
        format.mip_levels = element.arg_u32(7, "format mip levels")?.max(1);
    }

    session
        .tables
        .formats
        .insert_local(element_name(element), format, &element.at)
}

pub(crate) fn required_shader(session: &mut Session<'_>, element: &Element) -> Result<(), CompileError> {
    check_shape(element, "REQUIRED_SHADER", &REQUIRED_REF_SHAPE)?;
    let shader = session.tables.shaders.resolve(element.arg(0), &element.at)?.clone();
    session
        .tables
        .shaders
        .insert_local(element_name(element), shader, &element.at)
}

pub(crate) fn required_geometry(
    session: &mut Session<'_>,
    element: &Element,
) -> Result<(), CompileError> {
    check_shape(element, "REQUIRED_GEOMETRY", &REQUIRED_REF_SHAPE)?;
    let geometry = session
        .tables
        .geometries
        .resolve(element.arg(0), &element.at)?
        .clone();
    session
        .tables
        .geometries
        .insert_local(element_name(element), geometry, &element.at)
}

pub(crate) fn required_pipeline(
    session: &mut Session<'_>,
    element: &Element,
) -> Result<(), CompileError> {
    check_shape(element, "REQUIRED_PIPELINE", &REQUIRED_REF_SHAPE)?;
    let layout = session.tables.layouts.resolve(element.arg(0), &element.at)?.clone();
    session
        .tables
        .layouts
        .insert_local(element_name(element), layout, &element.at)
}

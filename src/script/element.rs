//! Script elements and centralized shape preconditions.
//!
//! Every declaration builder validates its element against a [`Shape`] before
//! touching any table, so malformed scripts always produce one uniform
//! diagnostic: `"<what> must/must not have a name/body/N arguments"`.

use crate::error::{CompileError, SourcePos};

/// Raw body block of an element, kept as text and re-lexed by its consumer
/// (pipeline builder, module handler, conditional splice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub text: String,
    /// Line of the opening brace, for diagnostics in recursive lexing.
    pub line: usize,
}

/// One parsed element: `KEYWORD[:name][(arg0, arg1, ...)][{ body }]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub keyword: String,
    pub name: Option<String>,
    pub args: Vec<String>,
    pub body: Option<Body>,
    pub at: SourcePos,
}

impl Element {
    pub fn arg(&self, index: usize) -> &str {
        &self.args[index]
    }

    /// Parse argument `index` as an unsigned integer.
    pub fn arg_u32(&self, index: usize, what: &'static str) -> Result<u32, CompileError> {
        self.args[index]
            .parse::<u32>()
            .map_err(|_| CompileError::InvalidValue {
                what,
                value: self.args[index].clone(),
                at: self.at.clone(),
            })
    }

    /// Parse argument `index` as a positive factor.
    pub fn arg_f64(&self, index: usize, what: &'static str) -> Result<f64, CompileError> {
        match self.args[index].parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
            _ => Err(CompileError::InvalidValue {
                what,
                value: self.args[index].clone(),
                at: self.at.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Req {
    Forbidden,
    Optional,
    Mandatory,
}

/// Shape contract of one element kind.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: Req,
    pub body: Req,
    pub min_args: usize,
    pub max_args: usize,
}

impl Shape {
    pub const fn new(name: Req, body: Req, min_args: usize, max_args: usize) -> Self {
        Self {
            name,
            body,
            min_args,
            max_args,
        }
    }
}

fn shape_error(what: &str, detail: &str, at: &SourcePos) -> CompileError {
    CompileError::Shape {
        message: format!("{what} {detail}"),
        at: at.clone(),
    }
}

/// Validate `element` against `shape`; `what` names the construct in the
/// uniform diagnostic ("FORMAT", "module FFT", ...).
pub fn check_shape(element: &Element, what: &str, shape: &Shape) -> Result<(), CompileError> {
    match (shape.name, element.name.is_some()) {
        (Req::Mandatory, false) => return Err(shape_error(what, "must have a name", &element.at)),
        (Req::Forbidden, true) => {
            return Err(shape_error(what, "must not have a name", &element.at));
        }
        _ => {}
    }
    match (shape.body, element.body.is_some()) {
        (Req::Mandatory, false) => return Err(shape_error(what, "must have a body", &element.at)),
        (Req::Forbidden, true) => {
            return Err(shape_error(what, "must not have a body", &element.at));
        }
        _ => {}
    }
    let count = element.args.len();
    if count < shape.min_args || count > shape.max_args {
        let detail = if shape.min_args == shape.max_args {
            format!("must have {} arguments", shape.min_args)
        } else {
            format!("must have {}..{} arguments", shape.min_args, shape.max_args)
        };
        return Err(shape_error(what, &detail, &element.at));
    }
    Ok(())
}

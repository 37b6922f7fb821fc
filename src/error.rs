//! Error taxonomy for the three engine tiers: script compilation, layout
//! validation and runtime graph execution.
//!
//! Every error is raised at the point of detection and carries enough context
//! to be reported without access to engine internals. Errors raised while
//! processing an included file or a module-generated fragment are wrapped in
//! [`CompileError::Context`], keeping the original condition reachable through
//! `std::error::Error::source`.

use std::fmt;

use thiserror::Error;

/// Position of a script element, used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    /// Script name (file path, or a caller-chosen label for inline text).
    pub source: String,
    /// 1-based line of the element's keyword.
    pub line: usize,
}

impl SourcePos {
    pub fn new(source: impl Into<String>, line: usize) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// Errors raised while compiling script text into resource tables and layouts.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Element shape violation. `message` follows the uniform
    /// "<what> must/must not have ..." phrasing produced by the shape checks.
    #[error("{message} ({at})")]
    Shape { message: String, at: SourcePos },

    #[error("unknown keyword {keyword} ({at})")]
    UnknownKeyword { keyword: String, at: SourcePos },

    #[error("unknown module {module} ({at})")]
    UnknownModule { module: String, at: SourcePos },

    #[error("unresolved {kind} symbol {name} ({at})")]
    UnresolvedSymbol {
        kind: &'static str,
        name: String,
        at: SourcePos,
    },

    #[error("duplicate {kind} symbol {name} ({at})")]
    DuplicateSymbol {
        kind: &'static str,
        name: String,
        at: SourcePos,
    },

    #[error("invalid {what}: {value} ({at})")]
    InvalidValue {
        what: &'static str,
        value: String,
        at: SourcePos,
    },

    #[error("script {source_name} declares no main pipeline")]
    MissingMainPipeline { source_name: String },

    #[error("aborted: {message} ({at})")]
    Aborted { message: String, at: SourcePos },

    #[error("module expansion exceeded depth {depth} in {module} ({at})")]
    ExpansionDepth {
        module: String,
        depth: usize,
        at: SourcePos,
    },

    #[error("failed to read include {path}")]
    Include {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Layout(#[from] LayoutError),

    /// Wraps an error raised inside an included file or a module-generated
    /// fragment with the enclosing context.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Wrap `self` with an outer context message ("while including x", ...).
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CompileError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error of a context chain.
    pub fn root_cause(&self) -> &CompileError {
        match self {
            CompileError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised while assembling or finalizing component layouts.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("pipeline {pipeline} has no sub-component {instance}")]
    UnknownInstance { pipeline: String, instance: String },

    #[error("component {component} has no port {port}")]
    UnknownPort { component: String, port: String },

    #[error("pipeline {pipeline} already contains a sub-component {instance}")]
    DuplicateInstance { pipeline: String, instance: String },

    #[error("component {component} already declares a port {port}")]
    DuplicatePort { component: String, port: String },

    #[error("input {instance}.{port} is connected twice")]
    AlreadyConnected { instance: String, port: String },

    #[error("incomplete graph in pipeline {pipeline}: port {instance}.{port} is unconnected")]
    Unconnected {
        pipeline: String,
        instance: String,
        port: String,
    },

    #[error("cyclic graph in pipeline {pipeline}: component {instance} depends on its own output")]
    Cycle { pipeline: String, instance: String },

    #[error("shader {name} failed reflection: {message}")]
    Reflection { name: String, message: String },

    #[error("filter {filter} declares no shader source")]
    EmptyFilter { filter: String },
}

/// Phase of a node's first-run probe that detected a GPU error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecPhase {
    Init,
    Draw,
    Teardown,
}

impl fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecPhase::Init => "init",
            ExecPhase::Draw => "draw",
            ExecPhase::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Errors raised while building or executing a runtime graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph is not built")]
    NotBuilt,

    #[error("graph is already built")]
    AlreadyBuilt,

    #[error("graph was destroyed")]
    Destroyed,

    #[error("node {node} failed during {phase}: {message}")]
    NodeFailed {
        node: String,
        phase: ExecPhase,
        message: String,
    },

    #[error("node {node} is broken (first-run {phase} error); graph will not re-execute it")]
    BrokenNode { node: String, phase: ExecPhase },

    #[error("input {input} expects {expected}, got {actual}")]
    IncompatibleInput {
        input: String,
        expected: String,
        actual: String,
    },

    #[error("pipeline input {input} has no bound texture")]
    MissingInput { input: String },

    #[error("pipeline has no input named {input}")]
    NoSuchInput { input: String },

    #[error("pipeline {pipeline} is not finalized")]
    UnfinalizedLayout { pipeline: String },

    #[error("backend error: {message}")]
    Backend { message: String },
}

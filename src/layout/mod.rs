//! Static component layout model: ports, connections and the two concrete
//! component kinds (filter and pipeline layouts).

pub mod filter;
pub mod pipeline;
pub(crate) mod resolve;
pub mod shader;

use serde::Serialize;
use std::sync::Arc;

pub use filter::{BlendFactor, DepthCompare, FilterLayout, RenderState};
pub use pipeline::PipelineLayout;

/// Reserved component id denoting the enclosing pipeline's own ports.
pub const SELF_ID: &str = "SELF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// A named slot on a component. Stable order within its owning component;
/// addressable by declaration index or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Instance name within the pipeline, or [`SELF_ID`].
    pub component: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
        }
    }

    pub fn is_self(&self) -> bool {
        self.component == SELF_ID
    }
}

/// Directed edge from an output port to an input port (or to/from the
/// enclosing pipeline's own ports via [`SELF_ID`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

/// A component blueprint: either a shader-bound leaf or a composite graph.
#[derive(Debug, Clone)]
pub enum ComponentLayout {
    Filter(FilterLayout),
    Pipeline(PipelineLayout),
}

impl ComponentLayout {
    pub fn name(&self) -> &str {
        match self {
            ComponentLayout::Filter(f) => &f.name,
            ComponentLayout::Pipeline(p) => &p.name,
        }
    }

    pub fn input_ports(&self) -> &[Port] {
        match self {
            ComponentLayout::Filter(f) => &f.inputs,
            ComponentLayout::Pipeline(p) => &p.inputs,
        }
    }

    pub fn output_ports(&self) -> &[Port] {
        match self {
            ComponentLayout::Filter(f) => &f.outputs,
            ComponentLayout::Pipeline(p) => &p.outputs,
        }
    }

    pub fn input_index(&self, port: &str) -> Option<usize> {
        self.input_ports().iter().position(|p| p.name == port)
    }

    pub fn output_index(&self, port: &str) -> Option<usize> {
        self.output_ports().iter().position(|p| p.name == port)
    }
}

/// A typed sub-component instance inside a pipeline layout.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub layout: Arc<ComponentLayout>,
}

//! Filter layouts: leaf nodes binding one shader program to an output format,
//! render-state flags and the geometry it draws.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::format::TextureFormat;
use crate::geometry::GeometryModel;
use crate::layout::shader::ShaderSource;
use crate::layout::Port;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthCompare {
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    Always,
}

/// Fixed-function state applied when a filter node draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderState {
    /// Clear the target before drawing.
    pub clear: bool,
    /// Blending factors, or `None` for opaque overwrite.
    pub blend: Option<(BlendFactor, BlendFactor)>,
    /// Depth test comparison, or `None` to disable the test.
    pub depth_test: Option<DepthCompare>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            clear: true,
            blend: None,
            depth_test: None,
        }
    }
}

/// Blueprint for one shader-bound processing node. Ports are derived from the
/// shader sources; duplicate names across sources merge into one port,
/// keeping first-seen order.
#[derive(Debug, Clone)]
pub struct FilterLayout {
    pub name: String,
    pub output_format: TextureFormat,
    pub render_state: RenderState,
    pub shaders: Vec<ShaderSource>,
    pub geometries: Vec<GeometryModel>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl FilterLayout {
    pub fn new(
        name: impl Into<String>,
        output_format: TextureFormat,
        shaders: Vec<ShaderSource>,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        if shaders.is_empty() {
            return Err(LayoutError::EmptyFilter { filter: name });
        }

        let mut inputs: Vec<Port> = Vec::new();
        let mut outputs: Vec<Port> = Vec::new();
        for shader in &shaders {
            let ports = shader.reflect()?;
            for port in ports.inputs {
                if !inputs.iter().any(|p| p.name == port.name) {
                    inputs.push(port);
                }
            }
            for port in ports.outputs {
                if !outputs.iter().any(|p| p.name == port.name) {
                    outputs.push(port);
                }
            }
        }

        Ok(Self {
            name,
            output_format,
            render_state: RenderState::default(),
            shaders,
            geometries: vec![GeometryModel::quad()],
            inputs,
            outputs,
        })
    }

    pub fn with_render_state(mut self, render_state: RenderState) -> Self {
        self.render_state = render_state;
        self
    }

    pub fn with_geometries(mut self, geometries: Vec<GeometryModel>) -> Self {
        if !geometries.is_empty() {
            self.geometries = geometries;
        }
        self
    }

    /// Number of target attachments this filter draws into.
    pub fn attachment_count(&self) -> usize {
        self.outputs.len().max(1)
    }
}

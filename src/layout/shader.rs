//! Shader sources and naga-based port reflection.
//!
//! A filter's ports are not declared in script text; they are derived from
//! the shader itself. Every texture global becomes an input port (source
//! order), and the fragment entry point's outputs become output ports: struct
//! member names when the entry point returns a struct, or the single port
//! `color` for a bare `@location(0)` return.

use crate::error::LayoutError;
use crate::layout::{Port, PortDirection};

/// Default name for the output port of a fragment entry point that returns a
/// bare `@location(0)` value instead of a named struct.
pub const DEFAULT_OUTPUT_PORT: &str = "color";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub name: String,
    pub text: String,
}

impl ShaderSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Parse the source and derive its ports.
    pub fn reflect(&self) -> Result<ShaderPorts, LayoutError> {
        reflect_ports(&self.name, &self.text)
    }

    /// Full naga validation (parse + type/flow checks). Backends run this
    /// before handing the text to the driver; tests use it to keep generated
    /// shader text honest.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let module = parse(&self.name, &self.text)?;
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| LayoutError::Reflection {
            name: self.name.clone(),
            message: format!("{e:?}"),
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPorts {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

fn parse(name: &str, text: &str) -> Result<naga::Module, LayoutError> {
    naga::front::wgsl::parse_str(text).map_err(|e| LayoutError::Reflection {
        name: name.to_string(),
        message: e.emit_to_string(text),
    })
}

fn reflect_ports(name: &str, text: &str) -> Result<ShaderPorts, LayoutError> {
    let module = parse(name, text)?;

    let mut inputs = Vec::new();
    for (_, var) in module.global_variables.iter() {
        if let naga::TypeInner::Image { .. } = module.types[var.ty].inner {
            let Some(var_name) = var.name.clone() else {
                continue;
            };
            inputs.push(Port {
                name: var_name,
                direction: PortDirection::Input,
            });
        }
    }

    let mut outputs = Vec::new();
    for ep in &module.entry_points {
        if ep.stage != naga::ShaderStage::Fragment {
            continue;
        }
        let Some(result) = &ep.function.result else {
            continue;
        };
        match &module.types[result.ty].inner {
            naga::TypeInner::Struct { members, .. } => {
                for member in members {
                    let is_location = matches!(
                        member.binding,
                        Some(naga::Binding::Location { .. })
                    );
                    if !is_location {
                        continue;
                    }
                    let port_name = member
                        .name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OUTPUT_PORT.to_string());
                    outputs.push(Port {
                        name: port_name,
                        direction: PortDirection::Output,
                    });
                }
            }
            _ => {
                if matches!(result.binding, Some(naga::Binding::Location { .. })) {
                    outputs.push(Port {
                        name: DEFAULT_OUTPUT_PORT.to_string(),
                        direction: PortDirection::Output,
                    });
                }
            }
        }
    }

    Ok(ShaderPorts { inputs, outputs })
}

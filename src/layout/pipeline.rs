//! Pipeline layouts: composite graphs of sub-component instances wired by
//! connections, built incrementally and finalized once.

use std::sync::Arc;

use crate::error::LayoutError;
use crate::layout::resolve::{self, ResolvedWiring};
use crate::layout::{
    ComponentLayout, Connection, Endpoint, Instance, Port, PortDirection, SELF_ID,
};

/// Blueprint for a composite processing graph.
///
/// Builder methods validate names eagerly: referencing an unknown instance or
/// port is an immediate typed error, never a silent no-op. Wiring
/// completeness and acyclicity are checked by [`PipelineLayout::finalize`].
#[derive(Debug, Clone)]
pub struct PipelineLayout {
    pub name: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub instances: Vec<Instance>,
    pub connections: Vec<Connection>,
    resolved: Option<ResolvedWiring>,
}

impl PipelineLayout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            instances: Vec::new(),
            connections: Vec::new(),
            resolved: None,
        }
    }

    fn check_port_name(&self, name: &str) -> Result<(), LayoutError> {
        // One namespace for both directions: `SELF.<port>` must be
        // unambiguous in connection statements.
        let taken = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|p| p.name == name);
        if taken {
            return Err(LayoutError::DuplicatePort {
                component: self.name.clone(),
                port: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_input(&mut self, name: impl Into<String>) -> Result<(), LayoutError> {
        let name = name.into();
        self.check_port_name(&name)?;
        self.inputs.push(Port {
            name,
            direction: PortDirection::Input,
        });
        self.resolved = None;
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>) -> Result<(), LayoutError> {
        let name = name.into();
        self.check_port_name(&name)?;
        self.outputs.push(Port {
            name,
            direction: PortDirection::Output,
        });
        self.resolved = None;
        Ok(())
    }

    /// Append a sub-component instance under a name unique in this layout.
    pub fn add(
        &mut self,
        layout: impl Into<Arc<ComponentLayout>>,
        instance: impl Into<String>,
    ) -> Result<(), LayoutError> {
        let instance = instance.into();
        if instance == SELF_ID || self.instances.iter().any(|i| i.name == instance) {
            return Err(LayoutError::DuplicateInstance {
                pipeline: self.name.clone(),
                instance,
            });
        }
        self.instances.push(Instance {
            name: instance,
            layout: layout.into(),
        });
        self.resolved = None;
        Ok(())
    }

    pub fn instance(&self, name: &str) -> Result<&Instance, LayoutError> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| LayoutError::UnknownInstance {
                pipeline: self.name.clone(),
                instance: name.to_string(),
            })
    }

    fn check_endpoint(&self, endpoint: &Endpoint, as_source: bool) -> Result<(), LayoutError> {
        if endpoint.is_self() {
            // The pipeline's own inputs are sources for internal wiring, its
            // outputs are destinations.
            let ports = if as_source { &self.inputs } else { &self.outputs };
            if !ports.iter().any(|p| p.name == endpoint.port) {
                return Err(LayoutError::UnknownPort {
                    component: self.name.clone(),
                    port: endpoint.port.clone(),
                });
            }
            return Ok(());
        }
        let instance = self.instance(&endpoint.component)?;
        let found = if as_source {
            instance.layout.output_index(&endpoint.port)
        } else {
            instance.layout.input_index(&endpoint.port)
        };
        if found.is_none() {
            return Err(LayoutError::UnknownPort {
                component: endpoint.component.clone(),
                port: endpoint.port.clone(),
            });
        }
        Ok(())
    }

    /// Declare a connection between two sub-component ports.
    pub fn connect(
        &mut self,
        src_instance: &str,
        src_port: &str,
        dst_instance: &str,
        dst_port: &str,
    ) -> Result<(), LayoutError> {
        let from = Endpoint::new(src_instance, src_port);
        let to = Endpoint::new(dst_instance, dst_port);
        self.check_endpoint(&from, true)?;
        self.check_endpoint(&to, false)?;
        self.connections.push(Connection { from, to });
        self.resolved = None;
        Ok(())
    }

    /// Wire one of the pipeline's own input ports to a sub-component input.
    pub fn connect_to_input(
        &mut self,
        input: &str,
        dst_instance: &str,
        dst_port: &str,
    ) -> Result<(), LayoutError> {
        self.connect(SELF_ID, input, dst_instance, dst_port)
    }

    /// Wire a sub-component output to one of the pipeline's own output ports.
    pub fn connect_to_output(
        &mut self,
        src_instance: &str,
        src_port: &str,
        output: &str,
    ) -> Result<(), LayoutError> {
        self.connect(src_instance, src_port, SELF_ID, output)
    }

    /// Resolve wiring (explicit or auto-connect) and verify the dependency
    /// graph is complete and acyclic. Idempotent; any later builder mutation
    /// discards the result.
    pub fn finalize(&mut self) -> Result<(), LayoutError> {
        if self.resolved.is_none() {
            self.resolved = Some(resolve::finalize(self)?);
        }
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.resolved.is_some()
    }

    /// Wiring produced by [`PipelineLayout::finalize`].
    pub fn resolved(&self) -> Option<&ResolvedWiring> {
        self.resolved.as_ref()
    }
}

//! A backend with no device behind it.
//!
//! Records every draw call and supports injecting deferred faults per filter
//! name and execution phase, which is how the test suite exercises the
//! first-run fault isolation of the graph executor. Also usable for dry runs
//! that check a script end to end without a GPU.

use std::collections::HashMap;

use log::debug;

use crate::error::{ExecPhase, GraphError};
use crate::format::TextureFormat;
use crate::geometry::GeometryModel;
use crate::gpu::{GpuBackend, GpuProgram, GpuTexture, RenderTarget};
use crate::layout::filter::{FilterLayout, RenderState};

#[derive(Debug, Clone)]
pub struct HeadlessProgram {
    name: String,
    input_count: usize,
}

impl GpuProgram for HeadlessProgram {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct HeadlessTarget {
    id: usize,
    format: TextureFormat,
    attachments: usize,
}

impl RenderTarget for HeadlessTarget {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn attachment_count(&self) -> usize {
        self.attachments
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub label: String,
    pub format: TextureFormat,
}

impl HeadlessTexture {
    /// An externally bound input texture.
    pub fn external(label: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            format,
        }
    }
}

impl GpuTexture for HeadlessTexture {
    fn format(&self) -> TextureFormat {
        self.format
    }
}

/// One recorded draw: program, bound target, inputs and total vertex count.
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub program: String,
    pub target: usize,
    pub inputs: Vec<String>,
    pub vertices: u64,
    pub cleared: bool,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_target_id: usize,
    live_targets: usize,
    programs_created: usize,
    draws: Vec<DrawRecord>,
    faults: HashMap<(String, ExecPhase), String>,
    current: Option<(String, usize, bool)>,
    pending_error: Option<String>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange a deferred device error the next time `filter` reaches
    /// `phase`. The fault is one-shot.
    pub fn inject_fault(&mut self, filter: &str, phase: ExecPhase, message: &str) {
        self.faults
            .insert((filter.to_string(), phase), message.to_string());
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn live_targets(&self) -> usize {
        self.live_targets
    }

    pub fn programs_created(&self) -> usize {
        self.programs_created
    }

    pub fn clear_draws(&mut self) {
        self.draws.clear();
    }

    fn trip_fault(&mut self, program: &str, phase: ExecPhase) {
        if let Some(message) = self.faults.remove(&(program.to_string(), phase)) {
            self.pending_error = Some(message);
        }
    }
}

impl GpuBackend for HeadlessBackend {
    type Program = HeadlessProgram;
    type Target = HeadlessTarget;
    type Texture = HeadlessTexture;

    fn create_program(&mut self, filter: &FilterLayout) -> Result<Self::Program, GraphError> {
        self.programs_created += 1;
        Ok(HeadlessProgram {
            name: filter.name.clone(),
            input_count: filter.inputs.len(),
        })
    }

    fn create_target(
        &mut self,
        format: &TextureFormat,
        attachments: usize,
    ) -> Result<Self::Target, GraphError> {
        let id = self.next_target_id;
        self.next_target_id += 1;
        self.live_targets += 1;
        debug!("headless target {id}: {} x{attachments}", format.describe());
        Ok(HeadlessTarget {
            id,
            format: *format,
            attachments,
        })
    }

    fn release_target(&mut self, _target: Self::Target) {
        self.live_targets -= 1;
    }

    fn target_texture(&self, target: &Self::Target, attachment: usize) -> Self::Texture {
        HeadlessTexture {
            label: format!("target{}#{attachment}", target.id),
            format: target.format,
        }
    }

    fn begin_capture(&mut self) {
        self.pending_error = None;
    }

    fn end_capture(&mut self) -> Result<Option<String>, GraphError> {
        Ok(self.pending_error.take())
    }

    fn begin_node(
        &mut self,
        program: &Self::Program,
        target: &Self::Target,
        state: &RenderState,
    ) -> Result<(), GraphError> {
        self.current = Some((program.name.clone(), target.id, state.clear));
        self.trip_fault(&program.name, ExecPhase::Init);
        Ok(())
    }

    fn draw(
        &mut self,
        program: &Self::Program,
        inputs: &[Self::Texture],
        geometries: &[GeometryModel],
    ) -> Result<(), GraphError> {
        let (name, target, cleared) = self.current.clone().ok_or(GraphError::Backend {
            message: "draw outside begin_node/end_node".into(),
        })?;
        if inputs.len() != program.input_count {
            return Err(GraphError::Backend {
                message: format!(
                    "program {name} expects {} inputs, got {}",
                    program.input_count,
                    inputs.len()
                ),
            });
        }
        let vertices = geometries.iter().map(GeometryModel::vertex_count).sum();
        self.draws.push(DrawRecord {
            program: name.clone(),
            target,
            inputs: inputs.iter().map(|t| t.label.clone()).collect(),
            vertices,
            cleared,
        });
        self.trip_fault(&name, ExecPhase::Draw);
        Ok(())
    }

    fn end_node(&mut self) -> Result<(), GraphError> {
        let (name, _, _) = self.current.take().ok_or(GraphError::Backend {
            message: "end_node outside begin_node".into(),
        })?;
        self.trip_fault(&name, ExecPhase::Teardown);
        Ok(())
    }
}

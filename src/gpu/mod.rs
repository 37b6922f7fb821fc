//! Collaborator traits between the runtime graph and the GPU.
//!
//! The graph executor is written against these seams only; everything
//! device-specific lives behind them. Two implementations ship with the
//! crate: [`wgpu_backend::WgpuBackend`] for real execution and
//! [`headless::HeadlessBackend`], which records draw traffic and can inject
//! faults for tests and dry runs.

pub mod headless;
pub mod wgpu_backend;

use crate::error::GraphError;
use crate::format::TextureFormat;
use crate::geometry::GeometryModel;
use crate::layout::filter::{FilterLayout, RenderState};

/// A compiled shader program handle.
pub trait GpuProgram {
    /// Name of the filter layout this program was compiled from.
    fn name(&self) -> &str;
}

/// An allocated render target: one or more same-format color attachments.
pub trait RenderTarget {
    fn format(&self) -> TextureFormat;
    fn attachment_count(&self) -> usize;
}

/// A sampleable texture handle. Cheap to clone.
pub trait GpuTexture: Clone {
    fn format(&self) -> TextureFormat;
}

/// Device-side operations the executor needs.
///
/// One node execution is `begin_node` (bind target, apply render state),
/// `draw` once per tick with all geometry models, `end_node` (submit and
/// settle). Deferred GPU errors are captured between `begin_capture` and
/// `end_capture`; the executor brackets each phase of a node's first run with
/// a capture to attribute faults to that node and phase.
pub trait GpuBackend {
    type Program: GpuProgram;
    type Target: RenderTarget;
    type Texture: GpuTexture;

    fn create_program(&mut self, filter: &FilterLayout) -> Result<Self::Program, GraphError>;

    fn create_target(
        &mut self,
        format: &TextureFormat,
        attachments: usize,
    ) -> Result<Self::Target, GraphError>;

    fn release_target(&mut self, target: Self::Target);

    /// Texture view of one attachment, for feeding downstream nodes.
    fn target_texture(&self, target: &Self::Target, attachment: usize) -> Self::Texture;

    fn begin_capture(&mut self);

    /// Ends a capture; `Some(message)` is a deferred device error raised
    /// since the matching `begin_capture`.
    fn end_capture(&mut self) -> Result<Option<String>, GraphError>;

    fn begin_node(
        &mut self,
        program: &Self::Program,
        target: &Self::Target,
        state: &RenderState,
    ) -> Result<(), GraphError>;

    fn draw(
        &mut self,
        program: &Self::Program,
        inputs: &[Self::Texture],
        geometries: &[GeometryModel],
    ) -> Result<(), GraphError>;

    fn end_node(&mut self) -> Result<(), GraphError>;
}

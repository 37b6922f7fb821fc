//! GPU image-processing pipeline engine.
//!
//! Scripts declare formats, shaders, geometries, filters and pipelines; the
//! compiler turns them into component layouts, and a [`graph::RuntimeGraph`]
//! executes the main pipeline as an ordered sequence of draw passes on a
//! [`gpu::GpuBackend`].
//!
//! ```no_run
//! use pipeforge::gpu::wgpu_backend::WgpuBackend;
//! use pipeforge::graph::RuntimeGraph;
//! use pipeforge::script::ScriptCompiler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let compilation = ScriptCompiler::new().compile_main_file("effect.pipe")?;
//! let pipeline = compilation.main_pipeline().ok_or("no main pipeline")?;
//! let mut graph = RuntimeGraph::new(WgpuBackend::request()?, &pipeline)?;
//! graph.build()?;
//! graph.process()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod geometry;
pub mod gpu;
pub mod graph;
pub mod layout;
pub mod module;
pub mod script;
pub mod tables;

pub use error::{CompileError, GraphError, LayoutError};
pub use format::TextureFormat;
pub use graph::RuntimeGraph;
pub use layout::{ComponentLayout, FilterLayout, PipelineLayout};
pub use script::{Compilation, ScriptCompiler};

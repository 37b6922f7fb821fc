//! Runtime graph: flattening, building and executing a finalized pipeline
//! layout against a [`GpuBackend`].
//!
//! Nested pipeline layouts are flattened into a single list of filter nodes
//! in dependency order, with dotted instance paths as node names. Render
//! targets are planned over that order by [`targets::plan`] so nodes of the
//! same target class share slots once their producers' consumers have run.
//!
//! Execution fault handling: a node's first run brackets every phase with a
//! backend error capture. A fault latches the node as broken with the phase
//! that raised it; later ticks refuse to execute it without touching the GPU.

pub mod targets;

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, info};

use crate::error::{ExecPhase, GraphError};
use crate::format::TextureFormat;
use crate::geometry::GeometryModel;
use crate::gpu::{GpuBackend, GpuTexture};
use crate::layout::filter::{FilterLayout, RenderState};
use crate::layout::{ComponentLayout, Endpoint, PipelineLayout};
use targets::{NodeDemand, TargetPlan};

/// Where a node input (or graph output) takes its texture from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlatSource {
    /// Index into the graph's external input list.
    External(usize),
    /// Output attachment of an earlier node.
    Node { node: usize, attachment: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct FlatNode {
    pub name: String,
    pub filter: FilterLayout,
    /// One source per filter input port, port order.
    pub inputs: Vec<FlatSource>,
}

/// A pipeline layout reduced to filter nodes in execution order.
#[derive(Debug, Clone)]
pub(crate) struct FlatGraph {
    pub nodes: Vec<FlatNode>,
    pub inputs: Vec<String>,
    pub outputs: Vec<(String, FlatSource)>,
}

fn lookup_source(
    input_sources: &HashMap<String, FlatSource>,
    produced: &HashMap<(String, String), FlatSource>,
    from: &Endpoint,
) -> Result<FlatSource, GraphError> {
    let found = if from.is_self() {
        input_sources.get(&from.port).cloned()
    } else {
        produced
            .get(&(from.component.clone(), from.port.clone()))
            .cloned()
    };
    found.ok_or_else(|| GraphError::MissingInput {
        input: format!("{}.{}", from.component, from.port),
    })
}

fn flatten_level(
    pipeline: &PipelineLayout,
    prefix: &str,
    input_sources: &HashMap<String, FlatSource>,
    nodes: &mut Vec<FlatNode>,
) -> Result<HashMap<String, FlatSource>, GraphError> {
    let resolved = pipeline
        .resolved()
        .ok_or_else(|| GraphError::UnfinalizedLayout {
            pipeline: pipeline.name.clone(),
        })?;

    let mut produced: HashMap<(String, String), FlatSource> = HashMap::new();
    for &index in &resolved.order {
        let instance = &pipeline.instances[index];
        let mut port_sources: HashMap<String, FlatSource> = HashMap::new();
        for conn in &resolved.connections {
            if conn.to.component == instance.name {
                let source = lookup_source(input_sources, &produced, &conn.from)?;
                port_sources.insert(conn.to.port.clone(), source);
            }
        }

        match instance.layout.as_ref() {
            ComponentLayout::Filter(filter) => {
                let node_index = nodes.len();
                let inputs = filter
                    .inputs
                    .iter()
                    .map(|port| {
                        port_sources.get(&port.name).cloned().ok_or_else(|| {
                            GraphError::MissingInput {
                                input: format!("{prefix}{}.{}", instance.name, port.name),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                nodes.push(FlatNode {
                    name: format!("{prefix}{}", instance.name),
                    filter: filter.clone(),
                    inputs,
                });
                for (attachment, port) in filter.outputs.iter().enumerate() {
                    produced.insert(
                        (instance.name.clone(), port.name.clone()),
                        FlatSource::Node {
                            node: node_index,
                            attachment,
                        },
                    );
                }
            }
            ComponentLayout::Pipeline(inner) => {
                let child_prefix = format!("{prefix}{}.", instance.name);
                let outputs = flatten_level(inner, &child_prefix, &port_sources, nodes)?;
                for (port, source) in outputs {
                    produced.insert((instance.name.clone(), port), source);
                }
            }
        }
    }

    let mut outputs = HashMap::new();
    for conn in &resolved.connections {
        if conn.to.is_self() {
            let source = lookup_source(input_sources, &produced, &conn.from)?;
            outputs.insert(conn.to.port.clone(), source);
        }
    }
    Ok(outputs)
}

pub(crate) fn flatten(pipeline: &PipelineLayout) -> Result<FlatGraph, GraphError> {
    let inputs: Vec<String> = pipeline.inputs.iter().map(|p| p.name.clone()).collect();
    let mut input_sources = HashMap::new();
    for (index, name) in inputs.iter().enumerate() {
        input_sources.insert(name.clone(), FlatSource::External(index));
    }

    let mut nodes = Vec::new();
    let exposed = flatten_level(pipeline, "", &input_sources, &mut nodes)?;
    let outputs = pipeline
        .outputs
        .iter()
        .map(|port| {
            exposed
                .get(&port.name)
                .cloned()
                .map(|source| (port.name.clone(), source))
                .ok_or_else(|| GraphError::MissingInput {
                    input: port.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FlatGraph {
        nodes,
        inputs,
        outputs,
    })
}

fn plan_targets(graph: &FlatGraph) -> TargetPlan {
    let mut release_at: Vec<usize> = (0..graph.nodes.len()).collect();
    for (consumer, node) in graph.nodes.iter().enumerate() {
        for source in &node.inputs {
            if let FlatSource::Node { node: producer, .. } = source {
                release_at[*producer] = release_at[*producer].max(consumer);
            }
        }
    }
    for (_, source) in &graph.outputs {
        if let FlatSource::Node { node, .. } = source {
            release_at[*node] = usize::MAX;
        }
    }
    let demands: Vec<NodeDemand> = graph
        .nodes
        .iter()
        .zip(&release_at)
        .map(|(node, &release_at)| NodeDemand {
            format: node.filter.output_format,
            attachments: node.filter.attachment_count(),
            release_at,
        })
        .collect();
    targets::plan(&demands)
}

/// Per-node wall-clock accumulator, milliseconds.
#[derive(Debug, Clone, Copy, Default)]
struct Timing {
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl Timing {
    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.sum += ms;
        self.sum_sq += ms * ms;
    }
}

/// Execution statistics for one node while monitoring is on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStats {
    pub count: u64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
}

impl Timing {
    fn stats(&self) -> NodeStats {
        if self.count == 0 {
            return NodeStats {
                count: 0,
                mean_ms: 0.0,
                stddev_ms: 0.0,
            };
        }
        let count = self.count as f64;
        let mean = self.sum / count;
        let variance = (self.sum_sq / count - mean * mean).max(0.0);
        NodeStats {
            count: self.count,
            mean_ms: mean,
            stddev_ms: variance.sqrt(),
        }
    }
}

struct NodeRuntime {
    name: String,
    /// Index into the graph's program list; nodes instantiating the same
    /// filter layout share one compiled program.
    program: usize,
    render_state: RenderState,
    geometries: Vec<GeometryModel>,
    inputs: Vec<FlatSource>,
    slot: usize,
    probed: bool,
    broken: Option<ExecPhase>,
    timing: Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Unbuilt,
    Built,
    Destroyed,
}

/// An executable instantiation of a finalized pipeline layout.
///
/// Lifecycle: construct, [`build`](RuntimeGraph::build) once, bind external
/// inputs, [`process`](RuntimeGraph::process) per tick, read outputs,
/// [`destroy`](RuntimeGraph::destroy) when done. Inputs may be rebound
/// between ticks as long as the replacement texture stays compatible with the
/// format the first binding established.
pub struct RuntimeGraph<B: GpuBackend> {
    backend: B,
    graph: FlatGraph,
    plan: TargetPlan,
    nodes: Vec<NodeRuntime>,
    programs: Vec<B::Program>,
    targets: Vec<B::Target>,
    bound: Vec<Option<B::Texture>>,
    expected: Vec<Option<TextureFormat>>,
    state: GraphState,
    monitoring: bool,
}

impl<B: GpuBackend> RuntimeGraph<B> {
    pub fn new(backend: B, pipeline: &PipelineLayout) -> Result<Self, GraphError> {
        let graph = flatten(pipeline)?;
        let plan = plan_targets(&graph);
        let input_count = graph.inputs.len();
        Ok(Self {
            backend,
            graph,
            plan,
            nodes: Vec::new(),
            programs: Vec::new(),
            targets: Vec::new(),
            bound: vec![None; input_count],
            expected: vec![None; input_count],
            state: GraphState::Unbuilt,
            monitoring: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_built(&self) -> bool {
        self.state == GraphState::Built
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.graph.nodes.iter().map(|n| n.name.as_str())
    }

    /// Compile programs and allocate render targets. Atomic: on failure no
    /// targets stay allocated and the graph remains unbuilt.
    pub fn build(&mut self) -> Result<(), GraphError> {
        match self.state {
            GraphState::Unbuilt => {}
            GraphState::Built => return Err(GraphError::AlreadyBuilt),
            GraphState::Destroyed => return Err(GraphError::Destroyed),
        }

        // One program per distinct filter layout, shared between nodes.
        let mut programs: Vec<B::Program> = Vec::new();
        let mut program_of: HashMap<String, usize> = HashMap::new();
        let mut node_programs = Vec::with_capacity(self.graph.nodes.len());
        for node in &self.graph.nodes {
            let index = match program_of.get(&node.filter.name) {
                Some(&index) => index,
                None => {
                    programs.push(self.backend.create_program(&node.filter)?);
                    program_of.insert(node.filter.name.clone(), programs.len() - 1);
                    programs.len() - 1
                }
            };
            node_programs.push(index);
        }

        let mut targets: Vec<B::Target> = Vec::with_capacity(self.plan.slots.len());
        for slot in &self.plan.slots {
            match self.backend.create_target(&slot.format, slot.attachments) {
                Ok(target) => targets.push(target),
                Err(e) => {
                    for target in targets {
                        self.backend.release_target(target);
                    }
                    return Err(e);
                }
            }
        }

        self.nodes = self
            .graph
            .nodes
            .iter()
            .zip(node_programs)
            .zip(&self.plan.assignments)
            .map(|((node, program), &slot)| NodeRuntime {
                name: node.name.clone(),
                program,
                render_state: node.filter.render_state,
                geometries: node.filter.geometries.clone(),
                inputs: node.inputs.clone(),
                slot,
                probed: false,
                broken: None,
                timing: Timing::default(),
            })
            .collect();
        self.programs = programs;
        self.targets = targets;
        self.state = GraphState::Built;
        info!(
            "built graph: {} nodes over {} targets",
            self.nodes.len(),
            self.targets.len()
        );
        Ok(())
    }

    /// Bind a texture to one of the graph's external inputs. The first
    /// binding fixes the input's expected format; later rebinds must stay
    /// compatible with it.
    pub fn bind_input(&mut self, name: &str, texture: B::Texture) -> Result<(), GraphError> {
        if self.state == GraphState::Destroyed {
            return Err(GraphError::Destroyed);
        }
        let index = self
            .graph
            .inputs
            .iter()
            .position(|input| input == name)
            .ok_or_else(|| GraphError::NoSuchInput {
                input: name.to_string(),
            })?;
        let actual = texture.format();
        match &self.expected[index] {
            None => self.expected[index] = Some(actual),
            Some(expected) if !expected.compatible_with(&actual) => {
                return Err(GraphError::IncompatibleInput {
                    input: name.to_string(),
                    expected: expected.describe(),
                    actual: actual.describe(),
                });
            }
            Some(_) => {}
        }
        self.bound[index] = Some(texture);
        Ok(())
    }

    fn resolve(&self, source: &FlatSource) -> Result<B::Texture, GraphError> {
        match source {
            FlatSource::External(index) => {
                self.bound[*index]
                    .clone()
                    .ok_or_else(|| GraphError::MissingInput {
                        input: self.graph.inputs[*index].clone(),
                    })
            }
            FlatSource::Node { node, attachment } => {
                let slot = self.nodes[*node].slot;
                Ok(self.backend.target_texture(&self.targets[slot], *attachment))
            }
        }
    }

    /// Execute every node once, in dependency order.
    pub fn process(&mut self) -> Result<(), GraphError> {
        match self.state {
            GraphState::Built => {}
            GraphState::Unbuilt => return Err(GraphError::NotBuilt),
            GraphState::Destroyed => return Err(GraphError::Destroyed),
        }
        for (index, input) in self.graph.inputs.iter().enumerate() {
            if self.bound[index].is_none() {
                return Err(GraphError::MissingInput {
                    input: input.clone(),
                });
            }
        }

        for index in 0..self.nodes.len() {
            if let Some(phase) = self.nodes[index].broken {
                return Err(GraphError::BrokenNode {
                    node: self.nodes[index].name.clone(),
                    phase,
                });
            }

            let inputs = self.nodes[index]
                .inputs
                .iter()
                .map(|source| self.resolve(source))
                .collect::<Result<Vec<_>, _>>()?;

            let slot = self.nodes[index].slot;
            let probe = !self.nodes[index].probed;
            let started = Instant::now();
            let result = execute_node(
                &mut self.backend,
                &self.nodes[index],
                &self.programs[self.nodes[index].program],
                &self.targets[slot],
                &inputs,
                probe,
            );
            let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;

            let node = &mut self.nodes[index];
            node.probed = true;
            if let Err((phase, message)) = result {
                node.broken = Some(phase);
                return Err(GraphError::NodeFailed {
                    node: node.name.clone(),
                    phase,
                    message,
                });
            }
            if self.monitoring {
                node.timing.record(elapsed_ms);
            }
            debug!("node {} ran in {elapsed_ms:.3}ms", node.name);
        }
        Ok(())
    }

    /// Texture carrying a graph output. `None` for an unknown name or before
    /// the graph is built.
    pub fn output(&self, name: &str) -> Option<B::Texture> {
        if self.state != GraphState::Built {
            return None;
        }
        let (_, source) = self.graph.outputs.iter().find(|(port, _)| port == name)?;
        self.resolve(source).ok()
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.graph.outputs.iter().map(|(name, _)| name.as_str())
    }

    /// Toggle per-node timing. Any recorded statistics are reset.
    pub fn set_monitoring(&mut self, enabled: bool) {
        self.monitoring = enabled;
        for node in &mut self.nodes {
            node.timing = Timing::default();
        }
    }

    pub fn stats(&self, node: &str) -> Option<NodeStats> {
        self.nodes
            .iter()
            .find(|n| n.name == node)
            .map(|n| n.timing.stats())
    }

    /// Release every target and drop the compiled programs. Terminal; the
    /// graph cannot be rebuilt afterwards.
    pub fn destroy(&mut self) {
        for target in self.targets.drain(..) {
            self.backend.release_target(target);
        }
        self.programs.clear();
        self.nodes.clear();
        self.state = GraphState::Destroyed;
    }
}

impl<B: GpuBackend> Drop for RuntimeGraph<B> {
    fn drop(&mut self) {
        if self.state == GraphState::Built {
            self.destroy();
        }
    }
}

/// One node tick. When `probe` is set every phase runs inside a backend
/// error capture so a deferred device error is attributed to the phase that
/// raised it.
fn execute_node<B: GpuBackend>(
    backend: &mut B,
    node: &NodeRuntime,
    program: &B::Program,
    target: &B::Target,
    inputs: &[B::Texture],
    probe: bool,
) -> Result<(), (ExecPhase, String)> {
    for phase in [ExecPhase::Init, ExecPhase::Draw, ExecPhase::Teardown] {
        if probe {
            backend.begin_capture();
        }
        let step = match phase {
            ExecPhase::Init => backend.begin_node(program, target, &node.render_state),
            ExecPhase::Draw => backend.draw(program, inputs, &node.geometries),
            ExecPhase::Teardown => backend.end_node(),
        };
        if let Err(e) = step {
            return Err((phase, e.to_string()));
        }
        if probe {
            match backend.end_capture() {
                Ok(Some(message)) => return Err((phase, message)),
                Ok(None) => {}
                Err(e) => return Err((phase, e.to_string())),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleDepth};
    use crate::gpu::headless::{HeadlessBackend, HeadlessTexture};
    use crate::layout::shader::ShaderSource;
    use std::sync::Arc;

    const PASS_WGSL: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(src, vec2<i32>(pos.xy), 0);
}
"#;

    fn rgba8() -> TextureFormat {
        TextureFormat::new(8, 8, ChannelLayout::Rgba, SampleDepth::UnsignedByte)
    }

    fn pass_filter(name: &str) -> Arc<ComponentLayout> {
        Arc::new(ComponentLayout::Filter(
            FilterLayout::new(name, rgba8(), vec![ShaderSource::new(name, PASS_WGSL)]).unwrap(),
        ))
    }

    fn chain(names: &[&str]) -> PipelineLayout {
        let mut p = PipelineLayout::new("p");
        p.add_input("src").unwrap();
        p.add_output("color").unwrap();
        for (i, name) in names.iter().enumerate() {
            p.add(pass_filter(name), format!("n{i}")).unwrap();
        }
        p.connect_to_input("src", "n0", "src").unwrap();
        for i in 1..names.len() {
            p.connect(&format!("n{}", i - 1), "color", &format!("n{i}"), "src")
                .unwrap();
        }
        p.connect_to_output(&format!("n{}", names.len() - 1), "color", "color")
            .unwrap();
        p.finalize().unwrap();
        p
    }

    fn frame() -> HeadlessTexture {
        HeadlessTexture::external("frame", rgba8())
    }

    #[test]
    fn processes_nodes_in_order_and_exposes_output() {
        let pipeline = chain(&["blur", "sharpen"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        graph.build().unwrap();
        graph.bind_input("src", frame()).unwrap();
        graph.process().unwrap();

        let draws = graph.backend().draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].program, "blur");
        assert_eq!(draws[0].inputs, ["frame"]);
        assert_eq!(draws[1].program, "sharpen");
        // Second stage reads the first stage's target.
        assert_eq!(draws[1].inputs, [format!("target{}#0", draws[0].target)]);
        assert!(graph.output("color").is_some());
        assert!(graph.output("nope").is_none());
    }

    #[test]
    fn chain_of_three_shares_two_targets() {
        let pipeline = chain(&["a", "b", "c"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        graph.build().unwrap();
        assert_eq!(graph.backend().live_targets(), 2);

        graph.bind_input("src", frame()).unwrap();
        graph.process().unwrap();
        // The last node reuses the first node's slot.
        let draws = graph.backend().draws();
        assert_eq!(draws[2].target, draws[0].target);
        assert_ne!(draws[1].target, draws[0].target);
    }

    #[test]
    fn nested_pipelines_flatten_with_dotted_names() {
        let inner = {
            let mut p = chain(&["inner_pass"]);
            p.name = "inner".to_string();
            p
        };
        let mut outer = PipelineLayout::new("outer");
        outer.add_input("src").unwrap();
        outer.add_output("color").unwrap();
        outer
            .add(Arc::new(ComponentLayout::Pipeline(inner)), "pre")
            .unwrap();
        outer.add(pass_filter("post"), "post").unwrap();
        outer.connect_to_input("src", "pre", "src").unwrap();
        outer.connect("pre", "color", "post", "src").unwrap();
        outer.connect_to_output("post", "color", "color").unwrap();
        outer.finalize().unwrap();

        let graph = RuntimeGraph::new(HeadlessBackend::new(), &outer).unwrap();
        let names: Vec<&str> = graph.node_names().collect();
        assert_eq!(names, ["pre.n0", "post"]);
    }

    #[test]
    fn nodes_of_one_filter_share_a_program() {
        let filter = pass_filter("shared");
        let mut p = PipelineLayout::new("p");
        p.add_input("src").unwrap();
        p.add_output("color").unwrap();
        p.add(filter.clone(), "n0").unwrap();
        p.add(filter, "n1").unwrap();
        p.connect_to_input("src", "n0", "src").unwrap();
        p.connect("n0", "color", "n1", "src").unwrap();
        p.connect_to_output("n1", "color", "color").unwrap();
        p.finalize().unwrap();

        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &p).unwrap();
        graph.build().unwrap();
        assert_eq!(graph.backend().programs_created(), 1);
    }

    #[test]
    fn lifecycle_errors() {
        let pipeline = chain(&["only"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        assert!(matches!(graph.process(), Err(GraphError::NotBuilt)));
        graph.build().unwrap();
        assert!(matches!(graph.build(), Err(GraphError::AlreadyBuilt)));

        graph.destroy();
        assert_eq!(graph.backend().live_targets(), 0);
        assert!(matches!(graph.process(), Err(GraphError::Destroyed)));
        assert!(matches!(graph.build(), Err(GraphError::Destroyed)));
        assert!(matches!(
            graph.bind_input("src", frame()),
            Err(GraphError::Destroyed)
        ));
    }

    #[test]
    fn unfinalized_layout_rejected() {
        let mut p = PipelineLayout::new("raw");
        p.add_input("src").unwrap();
        p.add_output("color").unwrap();
        p.add(pass_filter("f"), "n0").unwrap();
        // finalize() deliberately not called
        let err = match RuntimeGraph::new(HeadlessBackend::new(), &p) {
            Err(err) => err,
            Ok(_) => panic!("unfinalized layout accepted"),
        };
        assert!(matches!(err, GraphError::UnfinalizedLayout { .. }));
    }

    #[test]
    fn input_binding_rules() {
        let pipeline = chain(&["only"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        graph.build().unwrap();

        assert!(matches!(
            graph.process(),
            Err(GraphError::MissingInput { input }) if input == "src"
        ));
        assert!(matches!(
            graph.bind_input("typo", frame()),
            Err(GraphError::NoSuchInput { input }) if input == "typo"
        ));

        graph.bind_input("src", frame()).unwrap();
        // Rebinding with the same storage is fine, sampling aside.
        let relabeled = HeadlessTexture::external(
            "other",
            rgba8().with_filtering(crate::format::FilterMode::Nearest, crate::format::WrapMode::Repeat),
        );
        graph.bind_input("src", relabeled).unwrap();

        let shrunk = HeadlessTexture::external(
            "small",
            TextureFormat::new(4, 4, ChannelLayout::Rgba, SampleDepth::UnsignedByte),
        );
        let err = graph.bind_input("src", shrunk).unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleInput { input, .. } if input == "src"));
    }

    #[test]
    fn first_run_fault_latches_the_node() {
        let pipeline = chain(&["good", "bad"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        graph.build().unwrap();
        graph.bind_input("src", frame()).unwrap();
        graph
            .backend_mut()
            .inject_fault("bad", ExecPhase::Draw, "simulated device loss");

        let err = graph.process().unwrap_err();
        match err {
            GraphError::NodeFailed { node, phase, message } => {
                assert_eq!(node, "n1");
                assert_eq!(phase, ExecPhase::Draw);
                assert_eq!(message, "simulated device loss");
            }
            other => panic!("expected node failure, got {other}"),
        }

        // The healthy upstream node still runs; the broken one is refused
        // without reaching the backend again.
        graph.backend_mut().clear_draws();
        let err = graph.process().unwrap_err();
        assert!(matches!(
            err,
            GraphError::BrokenNode { node, phase: ExecPhase::Draw } if node == "n1"
        ));
        let draws = graph.backend().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].program, "good");
    }

    #[test]
    fn monitoring_collects_and_resets() {
        let pipeline = chain(&["only"]);
        let mut graph = RuntimeGraph::new(HeadlessBackend::new(), &pipeline).unwrap();
        graph.build().unwrap();
        graph.bind_input("src", frame()).unwrap();

        graph.process().unwrap();
        assert_eq!(graph.stats("n0").unwrap().count, 0);

        graph.set_monitoring(true);
        graph.process().unwrap();
        graph.process().unwrap();
        let stats = graph.stats("n0").unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.mean_ms >= 0.0);
        assert!(stats.stddev_ms >= 0.0);

        graph.set_monitoring(false);
        assert_eq!(graph.stats("n0").unwrap().count, 0);
    }
}

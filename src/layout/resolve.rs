//! Connection resolution for pipeline layouts.
//!
//! Two mutually exclusive modes, picked once per finalization: *explicit*
//! when the layout declares at least one connection, *auto-connect* when it
//! declares none. Both end in the same completeness check, followed by a
//! separate acyclicity pass that also yields the topological execution order.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::LayoutError;
use crate::layout::{Connection, Endpoint, PipelineLayout, SELF_ID};

/// Output of finalization: the full connection set (declared or derived) and
/// the instance execution order (indices into `PipelineLayout::instances`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWiring {
    pub connections: Vec<Connection>,
    pub order: Vec<usize>,
}

pub(crate) fn finalize(pipeline: &PipelineLayout) -> Result<ResolvedWiring, LayoutError> {
    let connections = if pipeline.connections.is_empty() {
        auto_connect(pipeline)
    } else {
        explicit(pipeline)?
    };
    check_complete(pipeline, &connections)?;
    let order = topo_order(pipeline, &connections)?;
    Ok(ResolvedWiring { connections, order })
}

/// Explicit mode: endpoints were validated as they were declared; here we
/// reject a destination wired twice.
fn explicit(pipeline: &PipelineLayout) -> Result<Vec<Connection>, LayoutError> {
    let mut seen: HashMap<(&str, &str), ()> = HashMap::new();
    for conn in &pipeline.connections {
        let key = (conn.to.component.as_str(), conn.to.port.as_str());
        if seen.insert(key, ()).is_some() {
            return Err(LayoutError::AlreadyConnected {
                instance: conn.to.component.clone(),
                port: conn.to.port.clone(),
            });
        }
    }
    Ok(pipeline.connections.clone())
}

/// Auto-connect mode: each destination takes the first same-named available
/// output in declaration order. Pipeline inputs count as available sources.
/// A destination never matches an output of its own instance.
fn auto_connect(pipeline: &PipelineLayout) -> Vec<Connection> {
    let mut sources: Vec<Endpoint> = Vec::new();
    for port in &pipeline.inputs {
        sources.push(Endpoint::new(SELF_ID, port.name.clone()));
    }
    for instance in &pipeline.instances {
        for port in instance.layout.output_ports() {
            sources.push(Endpoint::new(instance.name.clone(), port.name.clone()));
        }
    }

    let mut connections = Vec::new();
    let mut wire = |dst: Endpoint| {
        let found = sources
            .iter()
            .find(|src| src.port == dst.port && src.component != dst.component);
        if let Some(src) = found {
            connections.push(Connection {
                from: src.clone(),
                to: dst,
            });
        }
        // No match: left unconnected, the completeness check reports it.
    };

    for instance in &pipeline.instances {
        for port in instance.layout.input_ports() {
            wire(Endpoint::new(instance.name.clone(), port.name.clone()));
        }
    }
    for port in &pipeline.outputs {
        wire(Endpoint::new(SELF_ID, port.name.clone()));
    }
    connections
}

/// Every sub-component input and every pipeline output must be covered.
fn check_complete(
    pipeline: &PipelineLayout,
    connections: &[Connection],
) -> Result<(), LayoutError> {
    let covered = |component: &str, port: &str| {
        connections
            .iter()
            .any(|c| c.to.component == component && c.to.port == port)
    };
    for instance in &pipeline.instances {
        for port in instance.layout.input_ports() {
            if !covered(&instance.name, &port.name) {
                return Err(LayoutError::Unconnected {
                    pipeline: pipeline.name.clone(),
                    instance: instance.name.clone(),
                    port: port.name.clone(),
                });
            }
        }
    }
    for port in &pipeline.outputs {
        if !covered(SELF_ID, &port.name) {
            return Err(LayoutError::Unconnected {
                pipeline: pipeline.name.clone(),
                instance: SELF_ID.to_string(),
                port: port.name.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first topological sort over the instance dependency edges implied by
/// the connection set. A back edge is a build-time error naming the first
/// component revisited.
fn topo_order(
    pipeline: &PipelineLayout,
    connections: &[Connection],
) -> Result<Vec<usize>, LayoutError> {
    let index_of: HashMap<&str, usize> = pipeline
        .instances
        .iter()
        .enumerate()
        .map(|(i, inst)| (inst.name.as_str(), i))
        .collect();

    let mut deps: Vec<Vec<usize>> = vec![Vec::new(); pipeline.instances.len()];
    for conn in connections {
        if conn.from.is_self() || conn.to.is_self() {
            continue;
        }
        let (Some(&src), Some(&dst)) = (
            index_of.get(conn.from.component.as_str()),
            index_of.get(conn.to.component.as_str()),
        ) else {
            continue;
        };
        if !deps[dst].contains(&src) {
            deps[dst].push(src);
        }
    }

    let mut marks = vec![Mark::Unvisited; pipeline.instances.len()];
    let mut order = Vec::with_capacity(pipeline.instances.len());

    fn visit(
        node: usize,
        deps: &[Vec<usize>],
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), usize> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::Visiting => return Err(node),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::Visiting;
        for &dep in &deps[node] {
            visit(dep, deps, marks, order)?;
        }
        marks[node] = Mark::Done;
        order.push(node);
        Ok(())
    }

    for node in 0..pipeline.instances.len() {
        if let Err(revisited) = visit(node, &deps, &mut marks, &mut order) {
            return Err(LayoutError::Cycle {
                pipeline: pipeline.name.clone(),
                instance: pipeline.instances[revisited].name.clone(),
            });
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleDepth, TextureFormat};
    use crate::layout::shader::ShaderSource;
    use crate::layout::{ComponentLayout, FilterLayout};
    use std::sync::Arc;

    const PASS_WGSL: &str = r#"
@group(0) @binding(0) var src: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(src, vec2<i32>(pos.xy), 0);
}
"#;

    fn pass_filter(name: &str) -> Arc<ComponentLayout> {
        let fmt = TextureFormat::new(8, 8, ChannelLayout::Rgba, SampleDepth::UnsignedByte);
        Arc::new(ComponentLayout::Filter(
            FilterLayout::new(name, fmt, vec![ShaderSource::new(name, PASS_WGSL)]).unwrap(),
        ))
    }

    fn two_stage() -> PipelineLayout {
        // a.color feeds b.src, pipeline src feeds a, b.color feeds out.
        let mut p = PipelineLayout::new("p");
        p.add_input("src").unwrap();
        p.add_output("color").unwrap();
        p.add(pass_filter("blur"), "a").unwrap();
        p.add(pass_filter("sharpen"), "b").unwrap();
        p
    }

    #[test]
    fn explicit_wiring_resolves_and_orders() {
        let mut p = two_stage();
        p.connect_to_input("src", "a", "src").unwrap();
        p.connect("a", "color", "b", "src").unwrap();
        p.connect_to_output("b", "color", "color").unwrap();
        p.finalize().unwrap();
        let wiring = p.resolved().unwrap();
        assert_eq!(wiring.order, [0, 1]);
        assert_eq!(wiring.connections.len(), 3);
    }

    #[test]
    fn double_connected_destination_rejected() {
        let mut p = two_stage();
        p.connect_to_input("src", "a", "src").unwrap();
        p.connect_to_input("src", "b", "src").unwrap();
        p.connect("a", "color", "b", "src").unwrap();
        p.connect_to_output("b", "color", "color").unwrap();
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, LayoutError::AlreadyConnected { .. }));
    }

    #[test]
    fn unconnected_input_reported() {
        let mut p = two_stage();
        p.connect_to_input("src", "a", "src").unwrap();
        p.connect_to_output("b", "color", "color").unwrap();
        let err = p.finalize().unwrap_err();
        match err {
            LayoutError::Unconnected { instance, port, .. } => {
                assert_eq!((instance.as_str(), port.as_str()), ("b", "src"));
            }
            other => panic!("expected unconnected error, got {other}"),
        }
    }

    #[test]
    fn cycle_names_first_revisited_component() {
        let mut p = PipelineLayout::new("loop");
        p.add_output("color").unwrap();
        p.add(pass_filter("f"), "a").unwrap();
        p.add(pass_filter("g"), "b").unwrap();
        p.connect("a", "color", "b", "src").unwrap();
        p.connect("b", "color", "a", "src").unwrap();
        p.connect_to_output("b", "color", "color").unwrap();
        let err = p.finalize().unwrap_err();
        match err {
            LayoutError::Cycle { instance, .. } => assert_eq!(instance, "a"),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn auto_connect_matches_names_in_declaration_order() {
        // Filter ports are src -> color; pipeline input "src" reaches the
        // first instance, whose "color" output then feeds... both b.src and
        // SELF.color would match "color"; first declared source wins.
        let mut p = PipelineLayout::new("auto");
        p.add_input("src").unwrap();
        p.add_output("color").unwrap();
        p.add(pass_filter("only"), "a").unwrap();
        p.finalize().unwrap();
        let wiring = p.resolved().unwrap().clone();
        assert_eq!(wiring.connections.len(), 2);
        assert_eq!(wiring.connections[0].from, Endpoint::new(SELF_ID, "src"));
        assert_eq!(wiring.connections[0].to, Endpoint::new("a", "src"));
        assert_eq!(wiring.connections[1].from, Endpoint::new("a", "color"));
        assert_eq!(wiring.connections[1].to, Endpoint::new(SELF_ID, "color"));
    }

    #[test]
    fn auto_connect_incomplete_when_no_names_match() {
        let mut p = PipelineLayout::new("auto");
        p.add_input("unrelated").unwrap();
        p.add(pass_filter("only"), "a").unwrap();
        let err = p.finalize().unwrap_err();
        assert!(matches!(err, LayoutError::Unconnected { .. }));
    }
}

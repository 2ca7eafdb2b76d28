//! CLI entrypoint: load a JSON scene file, replay it as one sequence of
//! engine calls, run a single render cycle, and dump the resulting vertex
//! count and per-node diagnostics to stdout. A one-shot script runner
//! rather than an interactive session — there is no event loop, and the
//! process exits after the first `render()`.

use anyhow::{Context, Result};
use clap::Parser;
use geo_dag::NodeId;
use geo_engine::{Engine, EngineConfig, ReplotKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "geo-bin", version, about = "Headless geometry engine runner")]
struct Args {
    /// JSON scene file describing the objects to construct, in order.
    scene: PathBuf,
    /// Optional configuration file path (overrides discovery of `geo-engine.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Directory the log file is written into.
    #[arg(long = "log-dir", default_value = ".")]
    log_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SceneCommand {
    Point { id: u32, x: f64, y: f64 },
    Line { id: u32, p1: u32, p2: u32, #[serde(default)] infinite: bool },
    Circle { id: u32, centre: u32, radius: String },
    Circle3p { id: u32, p1: u32, p2: u32, p3: u32 },
    Midpoint { id: u32, a: u32, b: u32 },
    Move { target: u32, x: f64, y: f64 },
    Delete { target: u32 },
}

#[derive(Debug, Serialize)]
struct NodeDiagnostic {
    scene_id: u32,
    name: String,
    active: bool,
    result: String,
    point_count: usize,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    replot: String,
    vertex_count: usize,
    nodes: Vec<NodeDiagnostic>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    geo_engine::install_panic_hook();

    let config = EngineConfig::load_from(args.config.clone()).context("loading engine configuration")?;
    let _log_guard =
        geo_engine::init_logging(&config, &args.log_dir, "geo-bin.log").context("initialising logging")?;

    let (width, height) = config.default_viewport();
    let mut engine = Engine::with_config(width, height, config);

    let scene_text = std::fs::read_to_string(&args.scene)
        .with_context(|| format!("reading scene file {}", args.scene.display()))?;
    let commands: Vec<SceneCommand> = serde_json::from_str(&scene_text).context("parsing scene JSON")?;

    let mut ids: HashMap<u32, NodeId> = HashMap::new();
    for command in commands {
        apply_command(&mut engine, &mut ids, command)?;
    }

    let replot = engine.render();
    let report = build_report(&engine, &ids, &replot);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn apply_command(engine: &mut Engine, ids: &mut HashMap<u32, NodeId>, command: SceneCommand) -> Result<()> {
    match command {
        SceneCommand::Point { id, x, y } => {
            let node = engine.add_point(x, y)?;
            ids.insert(id, node);
        }
        SceneCommand::Line { id, p1, p2, infinite } => {
            let p1 = resolve(ids, p1)?;
            let p2 = resolve(ids, p2)?;
            let node = engine.add_line(p1, p2, infinite)?;
            ids.insert(id, node);
        }
        SceneCommand::Circle { id, centre, radius } => {
            let centre = resolve(ids, centre)?;
            let node = engine.add_circle(centre, &radius)?;
            ids.insert(id, node);
        }
        SceneCommand::Circle3p { id, p1, p2, p3 } => {
            let p1 = resolve(ids, p1)?;
            let p2 = resolve(ids, p2)?;
            let p3 = resolve(ids, p3)?;
            let node = engine.add_circle_3p(p1, p2, p3)?;
            ids.insert(id, node);
        }
        SceneCommand::Midpoint { id, a, b } => {
            let a = resolve(ids, a)?;
            let b = resolve(ids, b)?;
            let node = engine.add_midpoint(a, b)?;
            ids.insert(id, node);
        }
        SceneCommand::Move { target, x, y } => {
            let target = resolve(ids, target)?;
            engine.move_point(target, x, y)?;
        }
        SceneCommand::Delete { target } => {
            let target = resolve(ids, target)?;
            engine.delete(target)?;
        }
    }
    Ok(())
}

fn resolve(ids: &HashMap<u32, NodeId>, scene_id: u32) -> Result<NodeId> {
    ids.get(&scene_id)
        .copied()
        .with_context(|| format!("scene references unknown object id {scene_id}"))
}

fn build_report(engine: &Engine, ids: &HashMap<u32, NodeId>, replot: &ReplotKind) -> RenderReport {
    let reverse: HashMap<NodeId, u32> = ids.iter().map(|(&scene_id, &node_id)| (node_id, scene_id)).collect();
    let replot = match replot {
        ReplotKind::None => "none".to_string(),
        ReplotKind::Incremental(nodes) => format!("incremental({})", nodes.len()),
        ReplotKind::Global => "global".to_string(),
    };
    let nodes = engine
        .draw_order()
        .iter()
        .filter_map(|&id| engine.graph().get(id).map(|node| (id, node)))
        .map(|(id, node)| NodeDiagnostic {
            scene_id: reverse.get(&id).copied().unwrap_or(u32::MAX),
            name: node.name.clone(),
            active: node.active,
            result: format!("{:?}", node.result),
            point_count: node.current_point_count,
        })
        .collect();
    RenderReport { replot, vertex_count: engine.vertex_buffer().len(), nodes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_command_deserializes_each_op() {
        let json = r#"[
            {"op": "point", "id": 1, "x": 0.0, "y": 0.0},
            {"op": "point", "id": 2, "x": 1.0, "y": 1.0},
            {"op": "line", "id": 3, "p1": 1, "p2": 2, "infinite": true},
            {"op": "midpoint", "id": 4, "a": 1, "b": 2},
            {"op": "move", "target": 1, "x": 5.0, "y": 5.0},
            {"op": "delete", "target": 3}
        ]"#;
        let commands: Vec<SceneCommand> = serde_json::from_str(json).unwrap();
        assert_eq!(commands.len(), 6);
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let mut engine = Engine::new(400.0, 400.0);
        let mut ids = HashMap::new();
        let command = SceneCommand::Move { target: 42, x: 0.0, y: 0.0 };
        assert!(apply_command(&mut engine, &mut ids, command).is_err());
    }

    #[test]
    fn full_scene_runs_end_to_end() {
        let mut engine = Engine::new(400.0, 400.0);
        let mut ids = HashMap::new();
        apply_command(&mut engine, &mut ids, SceneCommand::Point { id: 1, x: 0.0, y: 0.0 }).unwrap();
        apply_command(&mut engine, &mut ids, SceneCommand::Point { id: 2, x: 4.0, y: 0.0 }).unwrap();
        apply_command(&mut engine, &mut ids, SceneCommand::Midpoint { id: 3, a: 1, b: 2 }).unwrap();
        let replot = engine.render();
        let report = build_report(&engine, &ids, &replot);
        assert_eq!(report.nodes.len(), 3);
    }
}

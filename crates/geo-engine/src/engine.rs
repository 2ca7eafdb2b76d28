//! The facade a host application drives: owns the graph, the command
//! manager, the viewport, and the vertex buffer, and exposes one
//! creation/update method per object kind plus `render()` for the
//! commit-solve-plot cycle. `draw_order` is appended to only by creation
//! methods, never by update/delete, since deletion relies on the node's
//! `active` flag rather than removing its draw-order slot.

use geo_command::{CommandManager, ReplotKind, ViewportOp};
use geo_dag::{Graph, NodeId, Payload, Style};
use geo_plot::VertexBuffer;
use geo_view::Viewport;
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Factory(#[from] geo_factory::FactoryError),
    #[error("command packet referenced an unsupported or unknown op_code")]
    UnknownOp,
}

pub struct Engine {
    graph: Graph,
    cmd: CommandManager,
    view: Viewport,
    vertex_buffer: VertexBuffer,
    draw_order: Vec<NodeId>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(screen_width: f64, screen_height: f64) -> Self {
        Self::with_config(screen_width, screen_height, EngineConfig::default())
    }

    pub fn with_config(screen_width: f64, screen_height: f64, config: EngineConfig) -> Self {
        Self {
            graph: Graph::new(),
            cmd: CommandManager::new(),
            view: Viewport::new(screen_width, screen_height),
            vertex_buffer: VertexBuffer::new(),
            draw_order: Vec::new(),
            config,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn view(&self) -> &Viewport {
        &self.view
    }

    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    pub fn draw_order(&self) -> &[NodeId] {
        &self.draw_order
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn register(&mut self, id: NodeId) -> NodeId {
        self.draw_order.push(id);
        id
    }

    pub fn add_point(&mut self, x: f64, y: f64) -> Result<NodeId, EngineError> {
        let id = geo_factory::free_point(&mut self.graph, &mut self.cmd, x, y)?;
        Ok(self.register(id))
    }

    pub fn add_line(&mut self, p1: NodeId, p2: NodeId, infinite: bool) -> Result<NodeId, EngineError> {
        let id = geo_factory::line(&mut self.graph, &mut self.cmd, p1, p2, infinite)?;
        Ok(self.register(id))
    }

    pub fn add_circle(&mut self, centre: NodeId, radius_expr: &str) -> Result<NodeId, EngineError> {
        let id = geo_factory::circle_centre_radius(&mut self.graph, &mut self.cmd, centre, radius_expr)?;
        Ok(self.register(id))
    }

    pub fn add_circle_3p(&mut self, p1: NodeId, p2: NodeId, p3: NodeId) -> Result<NodeId, EngineError> {
        let id = geo_factory::circle_three_point(&mut self.graph, &mut self.cmd, p1, p2, p3)?;
        Ok(self.register(id))
    }

    pub fn add_midpoint(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, EngineError> {
        let id = geo_factory::midpoint(&mut self.graph, &mut self.cmd, a, b)?;
        Ok(self.register(id))
    }

    /// Rewrite a free point's hidden `x`/`y` scalar formulas to new literal
    /// values. Only a point built by [`Engine::add_point`] (or
    /// `geo-factory::free_point`) qualifies — a point derived from other
    /// parents (a midpoint, an intersection) has nothing free to move.
    pub fn move_point(&mut self, id: NodeId, x: f64, y: f64) -> Result<(), EngineError> {
        let (x_id, y_id) = self.free_point_coordinate_parents(id)?;
        geo_factory::update_formula(&self.graph, &mut self.cmd, x_id, &x.to_string())?;
        geo_factory::update_formula(&self.graph, &mut self.cmd, y_id, &y.to_string())?;
        Ok(())
    }

    fn free_point_coordinate_parents(&self, id: NodeId) -> Result<(NodeId, NodeId), EngineError> {
        let node = self.graph.get(id).ok_or(EngineError::Factory(geo_factory::FactoryError::UnknownNode))?;
        match (&node.payload, node.parents.as_slice()) {
            (Payload::Point, [x_id, y_id])
                if self.graph.get(*x_id).map(|n| matches!(n.payload, Payload::Scalar(_))).unwrap_or(false) =>
            {
                Ok((*x_id, *y_id))
            }
            _ => Err(EngineError::Factory(geo_factory::FactoryError::UnknownNode)),
        }
    }

    pub fn update_style(&mut self, id: NodeId, style: Style) -> Result<(), EngineError> {
        geo_factory::update_style(&self.graph, &mut self.cmd, id, style)?;
        Ok(())
    }

    pub fn delete(&mut self, id: NodeId) -> Result<(), EngineError> {
        geo_factory::delete(&self.graph, &mut self.cmd, id)?;
        Ok(())
    }

    /// Assign the viewport's pan offset and zoom directly — an absolute
    /// view-state write, not a relative pan/zoom-about gesture. Queued like
    /// any other viewport op: it takes effect on the next [`Engine::render`],
    /// outside the undo history.
    pub fn pan_zoom(&mut self, offset_x: f64, offset_y: f64, zoom: f64) {
        self.cmd.submit_viewport(ViewportOp::Set { offset_x, offset_y, zoom });
    }

    pub fn undo(&mut self) -> bool {
        self.cmd.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.cmd.redo()
    }

    pub fn render(&mut self) -> ReplotKind {
        self.cmd.commit(&mut self.graph, &mut self.view, &mut self.vertex_buffer, &self.draw_order)
    }

    /// Decode a wire [`CommandPacket`] and forward it to the matching
    /// constructor, then fold its style fields into a follow-up `Style`
    /// mutation. The style mutation lands as its own undo step rather than
    /// being folded into the construction transaction — this engine's
    /// `geo-factory` constructors always submit exactly one transaction per
    /// call, so "append a Style mutation to the just-built transaction"
    /// becomes "submit a second one right after".
    pub fn dispatch(&mut self, packet: CommandPacket) -> Result<NodeId, EngineError> {
        let id = match packet.op_code {
            OpCode::CreateInternalScalar => {
                geo_factory::scalar(&mut self.graph, &mut self.cmd, &packet.s0)?
            }
            OpCode::CreateFreePoint => self.add_point(packet.p0, packet.p1)?,
            OpCode::CreateSegment2P => {
                let p1 = packet.target_id.ok_or(EngineError::UnknownOp)?;
                let p2 = NodeId(packet.p0 as u32);
                self.add_line(p1, p2, false)?
            }
            OpCode::CreateMidPoint => {
                let a = packet.target_id.ok_or(EngineError::UnknownOp)?;
                let b = NodeId(packet.p0 as u32);
                self.add_midpoint(a, b)?
            }
            OpCode::CreateConstrainedPoint => {
                let host = packet.target_id.ok_or(EngineError::UnknownOp)?;
                let id = geo_factory::point_on_formula(&mut self.graph, &mut self.cmd, host, packet.p0)?;
                self.register(id)
            }
            OpCode::DeletePhysical => {
                let id = packet.target_id.ok_or(EngineError::UnknownOp)?;
                self.delete(id)?;
                id
            }
            OpCode::UpdateFormula => {
                let id = packet.target_id.ok_or(EngineError::UnknownOp)?;
                geo_factory::update_formula(&self.graph, &mut self.cmd, id, &packet.s0)?;
                id
            }
        };
        if !matches!(packet.op_code, OpCode::DeletePhysical) {
            self.update_style(
                id,
                Style {
                    color: packet.color,
                    thickness: packet.thickness,
                    is_visible: packet.is_visible,
                    show_label: packet.show_label,
                },
            )?;
        }
        Ok(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    CreateInternalScalar,
    CreateFreePoint,
    CreateSegment2P,
    CreateMidPoint,
    CreateConstrainedPoint,
    DeletePhysical,
    UpdateFormula,
}

/// The external command-packet wire shape: a fixed-field struct wide
/// enough to cover every `op_code`'s parameters, with fields unused by a
/// given op simply left at their default.
#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub op_code: OpCode,
    pub target_id: Option<NodeId>,
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
    pub s0: String,
    pub s1: String,
    pub thickness: f32,
    pub color: u32,
    pub is_visible: bool,
    pub show_label: bool,
}

impl CommandPacket {
    pub fn new(op_code: OpCode) -> Self {
        Self {
            op_code,
            target_id: None,
            p0: 0.0,
            p1: 0.0,
            p2: 0.0,
            s0: String::new(),
            s1: String::new(),
            thickness: 1.0,
            color: 0x000000ff,
            is_visible: true,
            show_label: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_point_registers_draw_order_and_solves_on_render() {
        let mut engine = Engine::new(800.0, 600.0);
        let p = engine.add_point(1.0, 2.0).unwrap();
        assert_eq!(engine.draw_order(), &[p]);
        engine.render();
        assert_eq!(engine.graph().get(p).unwrap().result, geo_dag::NodeResult::Point { x: 1.0, y: 2.0 });
    }

    #[test]
    fn move_point_updates_result_after_render() {
        let mut engine = Engine::new(800.0, 600.0);
        let p = engine.add_point(0.0, 0.0).unwrap();
        engine.render();
        engine.move_point(p, 5.0, -5.0).unwrap();
        engine.render();
        assert_eq!(engine.graph().get(p).unwrap().result, geo_dag::NodeResult::Point { x: 5.0, y: -5.0 });
    }

    #[test]
    fn delete_leaves_draw_order_untouched_but_deactivates() {
        let mut engine = Engine::new(800.0, 600.0);
        let p = engine.add_point(0.0, 0.0).unwrap();
        engine.render();
        engine.delete(p).unwrap();
        engine.render();
        assert_eq!(engine.draw_order(), &[p]);
        assert!(!engine.graph().get(p).unwrap().active);
    }

    #[test]
    fn undo_redo_round_trips_a_move() {
        let mut engine = Engine::new(800.0, 600.0);
        let p = engine.add_point(0.0, 0.0).unwrap();
        engine.render();
        engine.move_point(p, 9.0, 9.0).unwrap();
        engine.render();
        assert!(engine.undo());
        engine.render();
        assert_eq!(engine.graph().get(p).unwrap().result, geo_dag::NodeResult::Point { x: 0.0, y: 0.0 });
        assert!(engine.redo());
        engine.render();
        assert_eq!(engine.graph().get(p).unwrap().result, geo_dag::NodeResult::Point { x: 9.0, y: 9.0 });
    }

    #[test]
    fn pan_zoom_is_absolute_not_relative() {
        let mut engine = Engine::new(800.0, 600.0);
        engine.pan_zoom(3.0, -2.0, 2.0);
        engine.render();
        assert_eq!(engine.view().world_origin(), (3.0, -2.0));
        assert_eq!(engine.view().zoom(), 2.0);
    }

    #[test]
    fn dispatch_create_free_point_applies_style() {
        let mut engine = Engine::new(800.0, 600.0);
        let mut packet = CommandPacket::new(OpCode::CreateFreePoint);
        packet.p0 = 1.0;
        packet.p1 = 2.0;
        packet.color = 0xff00ffff;
        let id = engine.dispatch(packet).unwrap();
        engine.render();
        assert_eq!(engine.graph().get(id).unwrap().style.color, 0xff00ffff);
    }

    #[test]
    fn dispatch_unknown_target_rejected() {
        let mut engine = Engine::new(800.0, 600.0);
        let mut packet = CommandPacket::new(OpCode::DeletePhysical);
        packet.target_id = None;
        let err = engine.dispatch(packet).unwrap_err();
        assert_eq!(err, EngineError::UnknownOp);
    }
}

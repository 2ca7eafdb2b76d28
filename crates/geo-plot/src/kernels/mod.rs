//! One module per renderable geometry shape. Each kernel is a pure function
//! from a node's bound formula/result data and the active [`geo_view::Viewport`]
//! to a flat vertex list; none of them touch the graph beyond reading parent
//! results and resolving variable bindings.

pub mod circular;
pub mod explicit;
pub mod implicit;
pub mod linear;
pub mod parametric;

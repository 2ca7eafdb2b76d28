//! The headless engine facade: wires the dependency graph, command manager,
//! viewport, and vertex buffer together behind one `Engine` type, plus the
//! ambient configuration and logging bring-up every embedder needs exactly
//! once.

mod config;
mod engine;
mod logging;

pub use config::{ConfigFile, EngineConfig, LogConfig, SolveConfig, ViewportConfig};
pub use engine::{CommandPacket, Engine, EngineError, OpCode};
pub use geo_command::ReplotKind;
pub use logging::{init_logging, install_panic_hook};

//! The divergence engine: per-asset window state machines and their
//! async update loops.

pub mod machine;
pub mod runner;

pub use machine::{MachineConfig, Update, WindowMachine};
pub use runner::{AssetRunner, BookBoard, PriceBoard, RunnerConfig, VolBoard};

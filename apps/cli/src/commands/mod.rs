//! 命令定义和实现

pub mod config;
pub mod plan;
pub mod run;

pub use config::ConfigCommand;
pub use plan::PlanCommand;
pub use run::RunCommand;

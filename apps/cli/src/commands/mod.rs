//! 命令定义和实现

pub mod run;
pub mod scan;
pub mod set_id;
pub mod sim;
pub mod timeout;

pub use run::RunCommand;
pub use scan::ScanCommand;
pub use set_id::SetIdCommand;
pub use sim::SimCommand;
pub use timeout::TimeoutCommand;

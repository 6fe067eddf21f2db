pub mod info;
pub mod process;
pub mod state;

pub use info::ProcessInfo;
pub use process::{LogTarget, ProcessConfig, ProcessGroupConfig, StopSignal};
pub use state::{ProcessState, SupervisorState};

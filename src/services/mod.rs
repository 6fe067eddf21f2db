pub mod control;
pub mod diff;
pub mod grace;
pub mod group;
pub mod reconciler;
pub mod subprocess;

pub use grace::{LogLevel, NumprocsResult, API_VERSION};
pub use group::ProcessGroup;
pub use subprocess::Subprocess;

// fleet-sdk: Foundation layer for runner-fleet.
// This crate has ZERO dependencies on other fleet crates and knows nothing
// about runners, repositories or service managers.

pub mod build_constants;
pub mod io_util;
pub mod process_invoker;
pub mod string_util;
pub mod trace;
pub mod which_util;

// Re-export commonly used items at crate root
pub use build_constants::{FleetPackage, Source};
pub use io_util::IOUtil;
pub use process_invoker::{
    CommandRunner, ProcessExitCodeError, ProcessInvoker, ProcessOutput, ProcessRequest,
    ScriptedCommandRunner,
};
pub use string_util::StringUtil;
pub use trace::TraceWriter;
pub use which_util::WhichUtil;

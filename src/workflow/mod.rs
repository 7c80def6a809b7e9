mod context;
mod delete;
mod inspect;
mod launch;
mod mounts;
mod provision;
mod session;
pub mod types;

pub use context::Context;
pub use delete::delete;
pub use inspect::{configure_git, follow_logs, logs, status};
pub use launch::{launch, start, stop};
pub use mounts::{ensure_mounted, resolve_host_path, unmount};
pub use provision::Applied;
pub use session::{exec, interactive_session};

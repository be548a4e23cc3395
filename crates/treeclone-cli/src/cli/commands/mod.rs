//! CLI command handlers, one file per command.

mod checksum;
mod clone;
mod completions;
mod manpage;

pub use checksum::run_checksum;
pub use clone::{run_clone, CloneArgs};
pub use completions::run_completions;
pub use manpage::run_manpage;

//! CLI command handlers.

mod export;
mod list;
mod remote;

pub use export::run_export_command;
pub use list::run_list_command;
pub use remote::{run_delete_command, run_mkdir_command, run_restart_command, run_upload_command};

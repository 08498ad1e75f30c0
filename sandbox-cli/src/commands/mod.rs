//! CLI command implementations.

pub mod frame;
pub mod init;
pub mod render;
pub mod watch;

pub use frame::serve_frame;
pub use init::init_project;
pub use render::render_file;
pub use watch::{watch_file, WatchOptions};

//! Settings file loading and the command line. The file layout is exercised by
//! the unit tests; `bin/settings_demo.rs` prints what a given file resolves to.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

mod config;
mod session;
mod token;

pub use config::*;
pub use session::*;
pub use token::*;

mod controller;
mod monitor;
mod notifier;
mod refresh;
mod token_store;

pub use controller::*;
pub use monitor::*;
pub use notifier::*;
pub use refresh::*;
pub use token_store::*;

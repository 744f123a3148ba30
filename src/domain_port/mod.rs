// ports

mod clock;
mod key_value_store;
mod login_redirect;
mod token_exchanger;

pub use clock::*;
pub use key_value_store::*;
pub use login_redirect::*;
pub use token_exchanger::*;

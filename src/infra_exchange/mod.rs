mod token_exchanger_fake;
mod token_exchanger_http;

pub use token_exchanger_fake::*;
pub use token_exchanger_http::*;

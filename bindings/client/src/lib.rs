mod config;
mod error;
mod requester;

pub mod prelude {
    pub use crate::config::HttpRequesterConfig;
    pub use crate::requester::HttpRequester;
}

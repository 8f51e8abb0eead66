pub mod assemble;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod preview;
pub mod request;
pub mod session;

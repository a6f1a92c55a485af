//! PhotoWall Loader Library
//!
//! Concrete collaborators for the demand scheduler: an HTTP [`Transport`]
//! with connect/read timeouts and an image [`Decoder`] producing RGBA8
//! bitmaps sized by their pixel buffer.
//!
//! [`Transport`]: photowall_scheduler::Transport
//! [`Decoder`]: photowall_scheduler::Decoder

pub mod config;
pub mod decode;
pub mod http;

pub use config::{FetchConfig, FetchConfigFile};
pub use decode::{DecodedImage, ImageDecoder};
pub use http::HttpTransport;

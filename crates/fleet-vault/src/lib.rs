//! Content-addressed image vault (C5, §4.2).

pub mod decoder;
pub mod image;
pub mod prepare;
pub mod vault;

pub use decoder::{ImageDecoder, PassthroughDecoder};
pub use image::VMImage;
pub use prepare::{NullPrepareAction, PrepareAction};
pub use vault::{BytesDownloader, ReqwestBytesDownloader, Vault};

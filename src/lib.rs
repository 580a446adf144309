#[macro_use] extern crate lazy_static;

pub mod cache;
pub mod client;
pub mod errors;
pub mod history;
pub mod image;
pub mod memory;
pub mod metadata;
pub mod quota;

mod imagestream;

pub use crate::{
    errors::{ErrorCode, ImageStreamError},
    image::{ContentDigest, ImageReference},
    imagestream::{ImageStream, ImageStreamReference, RemoteRepository},
};

//! Content digests and image references

#[cfg(test)] mod tests;

mod digest;
mod reference;

pub use digest::ContentDigest;
pub use reference::ImageReference;

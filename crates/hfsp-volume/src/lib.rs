#![forbid(unsafe_code)]
//! Read-only HFS+ volume access.
//!
//! [`Volume::open`] bootstraps the special-file B-trees from a byte
//! device and exposes catalog lookups, directory iteration, and fork
//! streams. Format-dependent behavior is concentrated in
//! [`VolumeFormat`].

mod format;
mod volume;

pub use format::VolumeFormat;
pub use volume::{DirEntry, Volume, VolumeDevice};

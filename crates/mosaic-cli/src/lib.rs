//! Mosaic CLI support
//!
//! Local collaborators and logging setup for the `mosaic` binary.

#![allow(missing_docs)]

pub mod adapters;
pub mod logging;

pub use adapters::{FileDirectory, FsObjectStore, SpoolDispatcher, SpoolRecord};

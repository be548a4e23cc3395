//! Mirror a tree of remote files, listed in a CSV manifest, into a local
//! directory with change detection, a bounded worker pool and a single
//! budget-gated retry pass.

pub mod checksum;
pub mod config;
pub mod engine;
pub mod logging;
pub mod manifest;
pub mod storage;
pub mod transport;

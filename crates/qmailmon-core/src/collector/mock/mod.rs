//! Test doubles for collectors that touch the filesystem.

mod filesystem;

pub use filesystem::MockFs;

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod args;
pub mod backend;
pub mod options;

pub use args::QcacheArgs;
pub use backend::Backends;
pub use options::*;

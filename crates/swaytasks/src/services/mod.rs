//! Service layer: compositor transport, tree model, and application
//! identity resolution.

pub mod appinfo;
pub mod callbacks;
pub mod ipc;
pub mod tasks;
pub mod tree;

// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into block construction, proof-of-work targets, chain management and
// validation.

pub mod core;
pub use core::*;

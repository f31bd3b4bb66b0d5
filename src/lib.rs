//! RelayChain - a minimal proof-of-work ledger
//!
//! Independent miners compete to extend a shared append-only chain. They
//! coordinate over a publish/subscribe bus, and a small HTTP service turns
//! the chain into account balances.
//!
//! # Architecture
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, proof-of-work target and the chain itself
//! - [`transaction`] - Transfers and miner rewards
//! - [`mempool`] - Pending transactions
//!
//! ## Mining
//! - [`miner`] - The mining loop and its command inbox
//!
//! ## Cryptography
//! - [`crypto`] - Key pairs and signatures (secp256k1)
//!
//! ## State Management
//! - [`persistence`] - Chain file storage
//! - [`balances`] - Account balances replayed from blocks
//!
//! ## Networking & Integration
//! - [`bus`] - Message bus topics, envelope, in-process and WebSocket transports
//! - [`api`] - HTTP balance service
//! - [`node`] - Process wiring for the binaries
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - Command-line definitions

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod balances;
pub mod persistence;

// ============================================================================
// Networking & Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod bus;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

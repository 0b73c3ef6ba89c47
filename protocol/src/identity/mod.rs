//! # Identity Module
//!
//! Principals in veilmint are plain 20-byte EVM-style addresses. The
//! registry never verifies signatures itself: in the reference environment
//! the host ledger authenticates the transaction signer, and here the caller
//! identity is handed to every operation explicitly by whoever hosts the
//! registry (the node's RPC layer, or a test).

pub mod address;

pub use address::{Address, AddressError};

// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Veilmint Protocol — Core Primitives
//!
//! The small, dependency-light building blocks the veilmint registry is made
//! of. Nothing in here holds collection state; that lives in
//! `veilmint-contracts`. This crate only answers questions like "what is an
//! address", "how is a metadata commitment computed" and "what time is it".
//!
//! ## Modules
//!
//! - **config** — Protocol constants and the per-deployment
//!   [`CollectionConfig`](config::CollectionConfig).
//! - **crypto** — Keccak-256 and the commit-reveal scheme for hidden metadata.
//! - **identity** — 20-byte principal addresses.
//! - **time** — The clock every operation reads exactly once.
//! - **units** — Wei amounts, ether formatting, JSON-safe serde.
//!
//! ## Ground Rules
//!
//! 1. Money is integer wei. Always.
//! 2. There is exactly one commitment preimage, defined in one function.
//! 3. Time never runs backwards as far as the registry can tell.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod time;
pub mod units;

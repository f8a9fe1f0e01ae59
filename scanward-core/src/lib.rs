//! Scanward Core
//!
//! Core types and abstractions for the Scanward scan scheduler.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, ExecutorJobReference, ExecutionProfile, etc.)
//! - DTOs: Data transfer objects for the delegate wire contract and the admin API
//! - Small pure helpers shared by scheduler and clients (cleanup age, whitelist, use cases)

pub mod cleanup;
pub mod domain;
pub mod dto;
pub mod sequence;
pub mod usecase;
pub mod whitelist;

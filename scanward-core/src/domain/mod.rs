//! Core domain types
//!
//! This module contains the core domain structures used across Scanward services.
//! These types represent the fundamental business entities and are shared between
//! the scheduler (for persistence and dispatch) and the clients (for transport).

pub mod event;
pub mod executor;
pub mod finding;
pub mod job;
pub mod message;
pub mod profile;
pub mod status;

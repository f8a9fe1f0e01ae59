//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used on the wire: the scheduler's job and admin
//! API, and the product delegate protocol spoken by the delegation client.

pub mod delegate;
pub mod job;

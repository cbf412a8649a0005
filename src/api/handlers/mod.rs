//! API handlers for the mission auth service.

pub mod auth;
pub mod health;

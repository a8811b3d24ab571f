//! HTTP routes

pub mod alerts;
pub mod index;
pub mod sessions;

//! Application Layer
//!
//! Contains business logic services. This layer orchestrates the flow of
//! data between the presentation and domain layers.

pub mod services;

//! # Convo Server Library
//!
//! Live-connection core of a chat backend:
//! - WebSocket gateway holding per-user connections
//! - Typed envelopes for chat messages, read receipts, typing and call signaling
//! - Online/offline presence broadcasts
//! - PostgreSQL (or in-memory) message persistence and chat membership
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Message entity and the repository traits
//! - **Application Layer**: Chat service (membership rules, recipients)
//! - **Infrastructure Layer**: Database, in-memory store and metrics
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! convo_server/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities and repository traits
//! +-- application/    Application services
//! +-- infrastructure/ Storage and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;

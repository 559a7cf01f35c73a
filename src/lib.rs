//! Library crate for leaderboard-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Entities, storage backends and the cache seam.
pub mod dao;
/// HTTP request and response shapes.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// axum routers.
pub mod routes;
/// Leaderboard reads, score submission and background recalculation.
pub mod services;
/// Shared application state.
pub mod state;

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod graph;
pub mod propagation;
pub mod repo;
pub mod state;
pub mod telemetry;
pub mod uploads;

// Library exports for melon-server
// This allows other crates in the workspace to use melon-server modules

pub mod api;
pub mod config;
pub mod db;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod storage;
pub mod tags;
pub mod validation;

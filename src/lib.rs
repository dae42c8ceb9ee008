pub mod api;
pub mod background_services;
pub mod config;
pub mod error;
pub mod fleet;
pub mod model;
pub mod routing;
pub mod telemetry;

pub mod config;
pub mod domain;
pub mod email;
pub mod sign;
pub mod telemetry;
pub mod template;

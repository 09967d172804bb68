pub mod board;
pub mod config;
pub mod control;
pub mod drive;
pub mod error;
pub mod ingress;
pub mod messages;
pub mod runtime;
pub mod sensor;
pub mod telemetry;

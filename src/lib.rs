pub mod attendance;
pub mod averages;
pub mod bulletin;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod ranking;
pub mod roles;
pub mod store;

pub use engine::GradeEngine;
pub use error::{GradeError, GradeResult};

pub mod check;
pub mod config;
pub mod generator;
pub mod logger;
pub mod message;
pub mod profiler;
pub mod visualization;

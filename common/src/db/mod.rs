pub mod catalog;
pub mod core;
pub mod indices;
pub mod occurrence;
pub mod parser;
pub mod session;

pub mod algo;
pub mod gauge;
pub mod leaf;

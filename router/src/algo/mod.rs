pub mod rsmt;

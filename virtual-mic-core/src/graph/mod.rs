pub mod builder;
pub mod sink;
pub mod source;

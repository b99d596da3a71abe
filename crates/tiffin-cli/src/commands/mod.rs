pub mod common;
pub mod sync;

pub mod log;
pub mod option;

pub mod group;
pub mod log;
pub mod option;
pub mod system;

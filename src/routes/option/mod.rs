mod handler;
mod model;

pub use handler::{get_option, update_option, validate_option};

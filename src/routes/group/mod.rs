mod handler;

pub use handler::{get_auto_groups, get_groups, get_user_groups};

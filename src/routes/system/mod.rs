mod handler;

pub use handler::get_system_stats;

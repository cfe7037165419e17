mod handler;
mod model;

pub use handler::{
    delete_history_logs, get_all_logs, get_log_stat, get_ranking, get_user_log_stat,
    get_user_logs, search_all_logs, search_user_logs,
};

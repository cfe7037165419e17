use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::AppState;
use crate::middleware::{admin_middleware, auth_middleware, log_errors};
use crate::routes;

/// 组装全部路由，挂在 API_BASE_URI 下
pub fn build_router(state: AppState) -> Router {
    let public_routes =
        Router::new().route("/system/stats", get(routes::system::get_system_stats));

    // 登录用户
    let user_routes = Router::new()
        .route("/user/groups", get(routes::group::get_user_groups))
        .route("/user/auto_groups", get(routes::group::get_auto_groups))
        .route("/log/ranking", get(routes::log::get_ranking))
        .route("/log/self", get(routes::log::get_user_logs))
        .route("/log/self/search", get(routes::log::search_user_logs))
        .route("/log/self/stat", get(routes::log::get_user_log_stat));

    // 管理员
    let admin_routes = Router::new()
        .route("/group", get(routes::group::get_groups))
        .route(
            "/log",
            get(routes::log::get_all_logs).delete(routes::log::delete_history_logs),
        )
        .route("/log/search", get(routes::log::search_all_logs))
        .route("/log/stat", get(routes::log::get_log_stat))
        .route(
            "/option/{key}",
            get(routes::option::get_option).put(routes::option::update_option),
        )
        .route(
            "/option/{key}/validate",
            post(routes::option::validate_option),
        )
        .layer(from_fn(admin_middleware));

    let protected_routes = Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    let router = router.layer(from_fn(log_errors));

    // 开发环境允许所有来源跨域
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}

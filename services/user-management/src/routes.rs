use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use tutorlink_auth::auth_middleware;

use crate::handlers;
use crate::services::AppState;

pub fn create_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(handlers::get_current_user))

        // Profiles
        .route("/users/me", put(handlers::update_profile))
        .route("/users/:user_id", get(handlers::get_user_by_id))

        // Catalog
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/courses",
            get(handlers::list_courses).post(handlers::create_course),
        )
        .route(
            "/courses/:course_id",
            get(handlers::get_course)
                .put(handlers::update_course)
                .delete(handlers::delete_course),
        )
        .route_layer(middleware::from_fn_with_state(
            state.jwt_service.clone(),
            auth_middleware,
        ));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Authentication routes
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .merge(protected)
}

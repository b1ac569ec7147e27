use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Every appointment operation requires authentication.
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/check", get(handlers::check_availability))
        .route("/available-slots/{doctor_id}", get(handlers::list_available_slots))
        .route("/me", get(handlers::get_my_appointments))
        .route("/search", get(handlers::search_appointments))
        .route("/all", get(handlers::list_all_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

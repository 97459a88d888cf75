use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use tutorlink_auth::auth_middleware;

use crate::handlers;
use crate::AppState;

pub fn create_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        // Booking requests
        .route(
            "/booking-requests",
            post(handlers::create_booking_request).get(handlers::list_booking_requests),
        )
        .route("/booking-requests/:id", get(handlers::get_booking_request))
        .route("/booking-requests/:id/accept", post(handlers::accept_booking_request))
        .route("/booking-requests/:id/reject", post(handlers::reject_booking_request))
        .route("/booking-requests/:id/cancel", post(handlers::cancel_booking_request))

        // Availability
        .route(
            "/availability",
            get(handlers::list_availability).post(handlers::create_availability),
        )
        .route(
            "/availability/:id",
            put(handlers::update_availability).delete(handlers::delete_availability),
        )
        .route(
            "/schedule-blocks",
            get(handlers::list_schedule_blocks).post(handlers::create_schedule_block),
        )
        .route("/schedule-blocks/:id", delete(handlers::delete_schedule_block))

        // Sessions, bookings and payments
        .route("/sessions/:id", get(handlers::get_session))
        .route("/bookings", get(handlers::list_bookings))
        .route("/bookings/:id", get(handlers::get_booking))
        .route("/payments", post(handlers::record_payment))
        .route("/payments/:id", get(handlers::get_payment))

        // Reviews
        .route("/reviews", post(handlers::submit_review))
        .route("/reviews/received", get(handlers::reviews_received))
        .route("/reviews/sent", get(handlers::reviews_sent))

        // Conversations and messages
        .route(
            "/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/conversations/summary", get(handlers::conversation_summary))
        .route("/conversations/:id", get(handlers::get_conversation))
        .route("/conversations/:id/accept", post(handlers::accept_conversation))
        .route("/conversations/:id/reject", post(handlers::reject_conversation))
        .route("/conversations/:id/archive", post(handlers::archive_conversation))
        .route("/conversations/:id/mark-read", post(handlers::mark_conversation_read))
        .route(
            "/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        .route_layer(middleware::from_fn_with_state(
            state.jwt_service.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected)
}

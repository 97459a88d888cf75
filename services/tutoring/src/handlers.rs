use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use tutorlink_auth::AuthenticatedUser;
use tutorlink_common::{ApiResponse, AppError, ConversationState};
use tutorlink_database::{
    queries::ReviewView, Booking, BookingRequest, Conversation, Message, Payment, ScheduleBlock,
    TutoringSession, WeeklyAvailability,
};

use crate::availability::AvailabilityService;
use crate::booking_requests::BookingRequestService;
use crate::bookings::BookingService;
use crate::messaging::MessagingService;
use crate::models::*;
use crate::reviews::ReviewService;
use crate::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("Tutoring Service is healthy".to_string()))
}

// Booking requests

pub async fn create_booking_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateBookingRequest>,
) -> Created<BookingRequest> {
    let service = BookingRequestService::new(&state);
    created(service.create(user.user_id, request).await?)
}

pub async fn list_booking_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<BookingRequest>> {
    let service = BookingRequestService::new(&state);
    Ok(Json(ApiResponse::success(service.list(user.user_id).await?)))
}

pub async fn get_booking_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<BookingRequest> {
    let service = BookingRequestService::new(&state);
    Ok(Json(ApiResponse::success(service.get(user.user_id, request_id).await?)))
}

pub async fn accept_booking_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<RequestDecision> {
    let service = BookingRequestService::new(&state);
    Ok(Json(ApiResponse::success(service.accept(user.user_id, request_id).await?)))
}

pub async fn reject_booking_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<RequestDecision> {
    let service = BookingRequestService::new(&state);
    Ok(Json(ApiResponse::success(service.reject(user.user_id, request_id).await?)))
}

pub async fn cancel_booking_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<RequestDecision> {
    let service = BookingRequestService::new(&state);
    Ok(Json(ApiResponse::success(service.cancel(user.user_id, request_id).await?)))
}

// Availability

pub async fn list_availability(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<OwnerFilter>,
) -> ApiResult<Vec<WeeklyAvailability>> {
    let service = AvailabilityService::new(&state);
    Ok(Json(ApiResponse::success(
        service.list_weekly(user.user_id, filter.user_id).await?,
    )))
}

pub async fn create_availability(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateWeeklyAvailabilityRequest>,
) -> Created<WeeklyAvailability> {
    let service = AvailabilityService::new(&state);
    created(service.create_weekly(user.user_id, request).await?)
}

pub async fn update_availability(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(availability_id): Path<Uuid>,
    Json(request): Json<UpdateWeeklyAvailabilityRequest>,
) -> ApiResult<WeeklyAvailability> {
    let service = AvailabilityService::new(&state);
    Ok(Json(ApiResponse::success(
        service.update_weekly(user.user_id, availability_id, request).await?,
    )))
}

pub async fn delete_availability(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(availability_id): Path<Uuid>,
) -> ApiResult<String> {
    let service = AvailabilityService::new(&state);
    service.delete_weekly(user.user_id, availability_id).await?;
    Ok(Json(ApiResponse::success("Availability deleted".to_string())))
}

pub async fn list_schedule_blocks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<OwnerFilter>,
) -> ApiResult<Vec<ScheduleBlock>> {
    let service = AvailabilityService::new(&state);
    Ok(Json(ApiResponse::success(
        service.list_blocks(user.user_id, filter.user_id).await?,
    )))
}

pub async fn create_schedule_block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateScheduleBlockRequest>,
) -> Created<ScheduleBlock> {
    let service = AvailabilityService::new(&state);
    created(service.create_block(user.user_id, request).await?)
}

pub async fn delete_schedule_block(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(block_id): Path<Uuid>,
) -> ApiResult<String> {
    let service = AvailabilityService::new(&state);
    service.delete_block(user.user_id, block_id).await?;
    Ok(Json(ApiResponse::success("Schedule block deleted".to_string())))
}

// Sessions, bookings and payments

pub async fn get_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<TutoringSession> {
    let service = BookingService::new(&state);
    Ok(Json(ApiResponse::success(service.get_session(user.user_id, session_id).await?)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<Booking>> {
    let service = BookingService::new(&state);
    Ok(Json(ApiResponse::success(service.list_bookings(user.user_id).await?)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Booking> {
    let service = BookingService::new(&state);
    Ok(Json(ApiResponse::success(service.get_booking(user.user_id, booking_id).await?)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Created<Payment> {
    let service = BookingService::new(&state);
    created(service.record_payment(user.user_id, request).await?)
}

pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Payment> {
    let service = BookingService::new(&state);
    Ok(Json(ApiResponse::success(service.get_payment(user.user_id, payment_id).await?)))
}

// Reviews

pub async fn submit_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateReviewRequest>,
) -> Created<ReviewView> {
    let service = ReviewService::new(&state);
    created(service.submit(user.user_id, request).await?)
}

pub async fn reviews_received(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<ReviewView>> {
    let service = ReviewService::new(&state);
    Ok(Json(ApiResponse::success(service.received(user.user_id).await?)))
}

pub async fn reviews_sent(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<ReviewView>> {
    let service = ReviewService::new(&state);
    Ok(Json(ApiResponse::success(service.sent(user.user_id).await?)))
}

// Conversations and messages

pub async fn create_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateConversationRequest>,
) -> Created<Conversation> {
    let service = MessagingService::new(&state);
    created(service.create(user.user_id, request).await?)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<Conversation>> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(service.list(user.user_id).await?)))
}

pub async fn conversation_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<ConversationSummary>> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(service.summary(user.user_id).await?)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Conversation> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(service.get(user.user_id, conversation_id).await?)))
}

async fn change_conversation_state(
    state: AppState,
    user: AuthenticatedUser,
    conversation_id: Uuid,
    next: ConversationState,
) -> ApiResult<Conversation> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(
        service.set_state(user.user_id, conversation_id, next).await?,
    )))
}

pub async fn accept_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Conversation> {
    change_conversation_state(state, user, conversation_id, ConversationState::Accepted).await
}

pub async fn reject_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Conversation> {
    change_conversation_state(state, user, conversation_id, ConversationState::Rejected).await
}

pub async fn archive_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Conversation> {
    change_conversation_state(state, user, conversation_id, ConversationState::Archived).await
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Conversation> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(
        service.mark_read(user.user_id, conversation_id).await?,
    )))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<MessageFilter>,
) -> ApiResult<Vec<Message>> {
    let service = MessagingService::new(&state);
    Ok(Json(ApiResponse::success(service.list_messages(user.user_id, filter).await?)))
}

pub async fn post_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<PostMessageRequest>,
) -> Created<Message> {
    let service = MessagingService::new(&state);
    created(service.post_message(user.user_id, request).await?)
}

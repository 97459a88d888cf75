use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{ConversationState, Modality, RequestStatus};

// Booking requests

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    #[serde(alias = "course_id")]
    pub course: Uuid,

    #[serde(rename = "fecha_propuesta", alias = "proposed_date")]
    pub proposed_date: NaiveDate,

    #[serde(rename = "modalidad", alias = "modality")]
    pub modality: Modality,

    #[serde(rename = "duracion", alias = "duration_minutes", default)]
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i32>,

    #[serde(rename = "mensaje", alias = "message", default)]
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

/// Result of accepting, rejecting or cancelling a booking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDecision {
    #[serde(rename = "solicitud_id")]
    pub request_id: Uuid,
    #[serde(rename = "estado_solicitud")]
    pub status: RequestStatus,
    #[serde(rename = "tutoria_id", skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<Uuid>,
    #[serde(rename = "reserva_id", skip_serializing_if = "Option::is_none", default)]
    pub booking_id: Option<Uuid>,
}

// Availability

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWeeklyAvailabilityRequest {
    #[validate(range(min = 0, max = 6))]
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateWeeklyAvailabilityRequest {
    #[validate(range(min = 0, max = 6))]
    pub day_of_week: Option<i16>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnerFilter {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateScheduleBlockRequest {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

// Reviews

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[serde(rename = "reserva", alias = "booking")]
    pub booking: Uuid,

    #[serde(rename = "comentario", alias = "comment", default)]
    #[validate(length(max = 2000))]
    pub comment: Option<String>,

    #[serde(rename = "puntuacion", alias = "score")]
    pub score: Decimal,
}

// Payments

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[serde(alias = "booking_id")]
    pub booking: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 50))]
    pub method: String,
}

// Conversations

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub tutor_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub counterpart_id: Uuid,
    pub course_id: Option<Uuid>,
    pub state: ConversationState,
    pub unread: i32,
    pub last_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[serde(alias = "conversation_id")]
    pub conversation: Uuid,
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    pub conversation: Option<Uuid>,
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use tutorlink_common::*;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub description: Option<String>,
    pub time_zone: String,
    pub default_session_minutes: i32,
    pub average_rating: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Result<UserRole, AppError> {
        self.role.parse()
    }

    pub fn actor(&self) -> Result<Actor, AppError> {
        Ok(Actor::new(self.user_id, self.role()?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub course_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub modality: String,
    pub city: Option<String>,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn modality(&self) -> Result<Modality, AppError> {
        self.modality.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WeeklyAvailability {
    pub availability_id: Uuid,
    pub user_id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleBlock {
    pub block_id: Uuid,
    pub user_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingRequest {
    pub request_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub proposed_date: NaiveDate,
    pub modality: String,
    pub duration_minutes: Option<i32>,
    pub message: Option<String>,
    pub status: String,
    pub session_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    pub fn status(&self) -> Result<RequestStatus, AppError> {
        self.status.parse()
    }

    pub fn modality(&self) -> Result<Modality, AppError> {
        self.modality.parse()
    }
}

/// A scheduled or held tutoring occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TutoringSession {
    pub session_id: Uuid,
    pub course_id: Uuid,
    pub duration_minutes: Option<i32>,
    pub session_date: NaiveDate,
    pub modality: String,
    pub is_active: bool,
    pub review_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub booking_id: Uuid,
    pub student_id: Uuid,
    pub session_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub booked_on: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub paid_on: NaiveDate,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub review_id: Uuid,
    pub comment: Option<String>,
    pub score: Decimal,
    pub review_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub state: String,
    pub unread_tutor: i32,
    pub unread_student: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn state(&self) -> Result<ConversationState, AppError> {
        self.state.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

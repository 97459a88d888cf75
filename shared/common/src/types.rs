use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Tutor,
    #[serde(alias = "estudiante")]
    Student,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Tutor => "tutor",
            UserRole::Student => "student",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tutor" => Ok(UserRole::Tutor),
            "student" => Ok(UserRole::Student),
            "admin" => Ok(UserRole::Admin),
            other => Err(AppError::Internal(format!("Unknown user role '{}'", other))),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery mode of a course, request or session.
///
/// Courses may offer `Both`; requests and sessions are always one concrete mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[serde(alias = "presencial")]
    InPerson,
    #[serde(alias = "virtual")]
    Remote,
    #[serde(alias = "ambas")]
    Both,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::InPerson => "in_person",
            Modality::Remote => "remote",
            Modality::Both => "both",
        }
    }

    pub fn is_concrete(&self) -> bool {
        !matches!(self, Modality::Both)
    }

    /// Whether a course offered in `self` can host a session in `requested`.
    pub fn accepts(&self, requested: Modality) -> bool {
        match self {
            Modality::Both => requested.is_concrete(),
            offered => *offered == requested,
        }
    }
}

impl FromStr for Modality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_person" => Ok(Modality::InPerson),
            "remote" => Ok(Modality::Remote),
            "both" => Ok(Modality::Both),
            other => Err(AppError::Internal(format!("Unknown modality '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Moves a pending request into one of the terminal states.
    ///
    /// Every terminal state is final, so a second decision on the same request
    /// fails instead of silently succeeding.
    pub fn transition_to(self, next: RequestStatus) -> Result<RequestStatus, AppError> {
        if self.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Booking request is {} and can no longer change",
                self
            )));
        }
        if !next.is_terminal() {
            return Err(AppError::InvalidState(
                "Booking request is already pending".to_string(),
            ));
        }
        Ok(next)
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(AppError::Internal(format!("Unknown request status '{}'", other))),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Pending,
    Accepted,
    Rejected,
    Archived,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Pending => "pending",
            ConversationState::Accepted => "accepted",
            ConversationState::Rejected => "rejected",
            ConversationState::Archived => "archived",
        }
    }
}

impl FromStr for ConversationState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConversationState::Pending),
            "accepted" => Ok(ConversationState::Accepted),
            "rejected" => Ok(ConversationState::Rejected),
            "archived" => Ok(ConversationState::Archived),
            other => Err(AppError::Internal(format!(
                "Unknown conversation state '{}'",
                other
            ))),
        }
    }
}

/// The authenticated caller, with the role as currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// True when the actor is `user_id` or an administrator.
    pub fn is_self_or_admin(&self, user_id: Uuid) -> bool {
        self.is_admin() || self.user_id == user_id
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        ((self.page() - 1) as i64) * self.page_size() as i64
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

// Common response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

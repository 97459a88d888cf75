use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{AppError, Modality, PageQuery, UserRole};
use tutorlink_database::User;

// Request/Response DTOs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    /// Defaults to `student`.
    #[serde(default)]
    pub role: Option<UserRole>,

    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 120))]
    pub specialty: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub description: Option<String>,
    pub time_zone: String,
    pub default_session_minutes: i32,
    pub average_rating: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<User> for UserInfo {
    type Error = AppError;

    fn try_from(user: User) -> Result<Self, Self::Error> {
        Ok(Self {
            role: user.role()?,
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            phone: user.phone,
            specialty: user.specialty,
            description: user.description,
            time_zone: user.time_zone,
            default_session_minutes: user.default_session_minutes,
            average_rating: user.average_rating,
            created_at: user.created_at,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 120))]
    pub specialty: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub time_zone: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub default_session_minutes: Option<i32>,
}

// Catalog

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl CategoryQuery {
    pub fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseQuery {
    pub category: Option<Uuid>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl CourseQuery {
    pub fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[serde(alias = "category")]
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    pub modality: Modality,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[serde(alias = "category")]
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    pub modality: Option<Modality>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    pub price: Option<Decimal>,
}

/// Trims a search term, treating blank input as no filter.
pub fn search_term(q: &Option<String>) -> Option<String> {
    q.as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
}

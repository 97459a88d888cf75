//! Explicit lookups that flatten relationship chains into single queries.
//!
//! Every function takes ids and an executor so it can run on the pool or inside
//! an open transaction (`&mut *tx`).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use tutorlink_common::{Actor, AppError, Modality};

use crate::models::User;

/// Course fields the booking workflow needs, joined with the owning tutor.
#[derive(Debug, Clone)]
pub struct CourseRef {
    pub course_id: Uuid,
    pub tutor_id: Option<Uuid>,
    pub modality: Modality,
    pub tutor_default_minutes: Option<i32>,
}

#[derive(Debug, FromRow)]
struct CourseRefRow {
    course_id: Uuid,
    tutor_id: Option<Uuid>,
    modality: String,
    tutor_default_minutes: Option<i32>,
}

/// Who is on each side of a booking.
#[derive(Debug, Clone, FromRow)]
pub struct BookingParties {
    pub booking_id: Uuid,
    pub student_id: Uuid,
    pub session_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
}

/// A review together with the session, tutor and student it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReviewView {
    pub review_id: Uuid,
    pub comment: Option<String>,
    pub score: Decimal,
    pub review_date: NaiveDate,
    pub session_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

const REVIEW_VIEW_SELECT: &str = r#"
    SELECT
        r.review_id, r.comment, r.score, r.review_date,
        s.session_id,
        c.tutor_id,
        (
            SELECT b.student_id FROM bookings b
            WHERE b.session_id = s.session_id
            ORDER BY b.created_at
            LIMIT 1
        ) AS student_id
    FROM reviews r
    LEFT JOIN sessions s ON s.review_id = r.review_id
    LEFT JOIN courses c ON c.course_id = s.course_id
"#;

pub async fn find_user<'e, E>(executor: E, user_id: Uuid) -> Result<User, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Loads the caller with their current role.
pub async fn find_actor<'e, E>(executor: E, user_id: Uuid) -> Result<Actor, AppError>
where
    E: PgExecutor<'e>,
{
    let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    let role = role.ok_or_else(|| {
        AppError::Authentication("Account for this token no longer exists".to_string())
    })?;

    Ok(Actor::new(user_id, role.parse()?))
}

/// Takes the row lock on a user. Writes that depend on a user's other rows
/// (availability windows, received reviews) serialise on it.
pub async fn lock_user<'e, E>(executor: E, user_id: Uuid) -> Result<(), AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(executor)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn find_course_ref<'e, E>(executor: E, course_id: Uuid) -> Result<CourseRef, AppError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, CourseRefRow>(
        r#"
        SELECT c.course_id, c.tutor_id, c.modality, u.default_session_minutes AS tutor_default_minutes
        FROM courses c
        LEFT JOIN users u ON u.user_id = c.tutor_id
        WHERE c.course_id = $1
        "#,
    )
    .bind(course_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

    Ok(CourseRef {
        course_id: row.course_id,
        tutor_id: row.tutor_id,
        modality: row.modality.parse()?,
        tutor_default_minutes: row.tutor_default_minutes,
    })
}

pub async fn find_tutor_for_session<'e, E>(
    executor: E,
    session_id: Uuid,
) -> Result<Option<Uuid>, AppError>
where
    E: PgExecutor<'e>,
{
    let tutor_id: Option<Option<Uuid>> = sqlx::query_scalar(
        r#"
        SELECT c.tutor_id
        FROM sessions s
        JOIN courses c ON c.course_id = s.course_id
        WHERE s.session_id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    Ok(tutor_id.flatten())
}

pub async fn find_booking_parties<'e, E>(
    executor: E,
    booking_id: Uuid,
) -> Result<BookingParties, AppError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BookingParties>(
        r#"
        SELECT b.booking_id, b.student_id, b.session_id, b.payment_id, c.tutor_id
        FROM bookings b
        LEFT JOIN sessions s ON s.session_id = b.session_id
        LEFT JOIN courses c ON c.course_id = s.course_id
        WHERE b.booking_id = $1
        "#,
    )
    .bind(booking_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

/// Scores of every review attached to a session of one of the tutor's courses.
pub async fn review_scores_for_tutor<'e, E>(
    executor: E,
    tutor_id: Uuid,
) -> Result<Vec<Decimal>, AppError>
where
    E: PgExecutor<'e>,
{
    let scores = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT r.score
        FROM reviews r
        JOIN sessions s ON s.review_id = r.review_id
        JOIN courses c ON c.course_id = s.course_id
        WHERE c.tutor_id = $1
        "#,
    )
    .bind(tutor_id)
    .fetch_all(executor)
    .await?;

    Ok(scores)
}

pub async fn find_review_view<'e, E>(executor: E, review_id: Uuid) -> Result<ReviewView, AppError>
where
    E: PgExecutor<'e>,
{
    let query = format!("{} WHERE r.review_id = $1", REVIEW_VIEW_SELECT);
    sqlx::query_as::<_, ReviewView>(&query)
        .bind(review_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))
}

pub async fn reviews_received_by<'e, E>(
    executor: E,
    tutor_id: Uuid,
) -> Result<Vec<ReviewView>, AppError>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        "{} WHERE c.tutor_id = $1 ORDER BY r.review_date DESC, r.created_at DESC",
        REVIEW_VIEW_SELECT
    );
    Ok(sqlx::query_as::<_, ReviewView>(&query)
        .bind(tutor_id)
        .fetch_all(executor)
        .await?)
}

pub async fn reviews_sent_by<'e, E>(
    executor: E,
    student_id: Uuid,
) -> Result<Vec<ReviewView>, AppError>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        r#"{} WHERE EXISTS (
            SELECT 1 FROM bookings b
            WHERE b.session_id = s.session_id AND b.student_id = $1
        )
        ORDER BY r.review_date DESC, r.created_at DESC"#,
        REVIEW_VIEW_SELECT
    );
    Ok(sqlx::query_as::<_, ReviewView>(&query)
        .bind(student_id)
        .fetch_all(executor)
        .await?)
}

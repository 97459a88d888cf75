use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{Actor, AppError, UserRole};
use tutorlink_database::{
    queries::{self, ReviewView},
    TutoringSession,
};

use crate::models::CreateReviewRequest;
use crate::AppState;

const MAX_SCORE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

pub fn validate_score(score: Decimal) -> Result<(), AppError> {
    if score < Decimal::ZERO || score > MAX_SCORE {
        return Err(AppError::Validation(
            "Score must be between 0 and 5".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_can_review(actor: &Actor, booking_student: Uuid) -> Result<(), AppError> {
    if actor.is_self_or_admin(booking_student) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Only the booking's student can review it".to_string(),
        ))
    }
}

pub fn ensure_session_reviewable(
    session: Option<&TutoringSession>,
    today: NaiveDate,
) -> Result<&TutoringSession, AppError> {
    let session = session.ok_or_else(|| {
        AppError::Validation("Booking has no session to review".to_string())
    })?;

    if session.review_id.is_some() {
        return Err(AppError::Validation(
            "Session has already been reviewed".to_string(),
        ));
    }
    if session.session_date > today {
        return Err(AppError::Validation(
            "Session has not taken place yet".to_string(),
        ));
    }
    Ok(session)
}

/// Mean score rounded to two places. A tutor without reviews averages 0.
pub fn average_rating(scores: &[Decimal]) -> Decimal {
    if scores.is_empty() {
        return Decimal::ZERO;
    }
    let total: Decimal = scores.iter().copied().sum();
    (total / Decimal::from(scores.len())).round_dp(2)
}

pub struct ReviewService {
    db_pool: PgPool,
}

impl ReviewService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
        }
    }

    /// Reviews the session behind `request.booking` and refreshes the tutor's average.
    pub async fn submit(
        &self,
        actor_id: Uuid,
        request: CreateReviewRequest,
    ) -> Result<ReviewView, AppError> {
        request.validate()?;
        validate_score(request.score)?;

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        let parties = queries::find_booking_parties(&mut *tx, request.booking).await?;
        ensure_can_review(&actor, parties.student_id)?;

        // Held until commit so the recomputed average includes every review.
        if let Some(tutor_id) = parties.tutor_id {
            queries::lock_user(&mut *tx, tutor_id).await?;
        }

        let session = match parties.session_id {
            Some(session_id) => {
                sqlx::query_as::<_, TutoringSession>(
                    "SELECT * FROM sessions WHERE session_id = $1 FOR UPDATE",
                )
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };
        let today = Utc::now().date_naive();
        let session = ensure_session_reviewable(session.as_ref(), today)?;

        let review_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO reviews (review_id, comment, score, review_date) VALUES ($1, $2, $3, $4)",
        )
        .bind(review_id)
        .bind(&request.comment)
        .bind(request.score)
        .bind(today)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET review_id = $2 WHERE session_id = $1")
            .bind(session.session_id)
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        if let Some(tutor_id) = parties.tutor_id {
            let scores = queries::review_scores_for_tutor(&mut *tx, tutor_id).await?;
            let average = average_rating(&scores);

            sqlx::query("UPDATE users SET average_rating = $2, updated_at = NOW() WHERE user_id = $1")
                .bind(tutor_id)
                .bind(average)
                .execute(&mut *tx)
                .await?;

            tracing::info!(tutor_id = %tutor_id, average = %average, reviews = scores.len(), "Tutor rating recalculated");
        }

        tx.commit().await?;

        tracing::info!(review_id = %review_id, session_id = %session.session_id, "Review submitted");
        queries::find_review_view(&self.db_pool, review_id).await
    }

    /// Reviews on sessions of the actor's courses.
    pub async fn received(&self, actor_id: Uuid) -> Result<Vec<ReviewView>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        if actor.role == UserRole::Student {
            return Err(AppError::Authorization(
                "Only tutors receive reviews".to_string(),
            ));
        }
        queries::reviews_received_by(&self.db_pool, actor.user_id).await
    }

    /// Reviews on sessions the actor booked.
    pub async fn sent(&self, actor_id: Uuid) -> Result<Vec<ReviewView>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        if actor.role == UserRole::Tutor {
            return Err(AppError::Authorization(
                "Only students send reviews".to_string(),
            ));
        }
        queries::reviews_sent_by(&self.db_pool, actor.user_id).await
    }
}

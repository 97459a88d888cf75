use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{Actor, AppError, Modality, RequestStatus, UserRole};
use tutorlink_database::{
    queries::{self, CourseRef},
    BookingRequest,
};

use crate::availability::{date_is_bookable, load_block_ranges, load_weekly_windows};
use crate::config::BookingConfig;
use crate::models::{CreateBookingRequest, RequestDecision};
use crate::AppState;

pub const MAX_SESSION_MINUTES: i32 = 1440;

/// Preconditions for a student opening a request against `course`.
pub fn validate_new_request(
    actor: &Actor,
    course: &CourseRef,
    modality: Modality,
    proposed_date: NaiveDate,
    duration_minutes: Option<i32>,
    today: NaiveDate,
) -> Result<(), AppError> {
    if actor.role != UserRole::Student {
        return Err(AppError::Authorization(
            "Only students can request tutoring sessions".to_string(),
        ));
    }
    if course.tutor_id.is_none() {
        return Err(AppError::Validation(
            "Course has no tutor assigned".to_string(),
        ));
    }
    if !modality.is_concrete() {
        return Err(AppError::Validation(
            "Requested modality must be in_person or remote".to_string(),
        ));
    }
    if !course.modality.accepts(modality) {
        return Err(AppError::Validation(format!(
            "Course is offered {} only",
            course.modality.as_str()
        )));
    }
    if proposed_date < today {
        return Err(AppError::Validation(
            "Proposed date cannot be in the past".to_string(),
        ));
    }
    if let Some(minutes) = duration_minutes {
        if !(1..=MAX_SESSION_MINUTES).contains(&minutes) {
            return Err(AppError::Validation(format!(
                "Duration must be between 1 and {} minutes",
                MAX_SESSION_MINUTES
            )));
        }
    }
    Ok(())
}

/// Accept and reject belong to the course's tutor.
pub fn ensure_can_decide(actor: &Actor, course_tutor: Option<Uuid>) -> Result<(), AppError> {
    if actor.is_admin() || course_tutor == Some(actor.user_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Only the course tutor can decide on this request".to_string(),
        ))
    }
}

pub fn ensure_can_cancel(actor: &Actor, student_id: Uuid) -> Result<(), AppError> {
    if actor.is_self_or_admin(student_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Only the requesting student can cancel this request".to_string(),
        ))
    }
}

pub fn can_view(actor: &Actor, request: &BookingRequest, course_tutor: Option<Uuid>) -> bool {
    actor.is_self_or_admin(request.student_id) || course_tutor == Some(actor.user_id)
}

/// Session length: the request's own value, then the tutor's default, then the
/// configured fallback.
pub fn resolve_duration(requested: Option<i32>, tutor_default: Option<i32>, fallback: i32) -> i32 {
    requested.or(tutor_default).unwrap_or(fallback)
}

pub struct BookingRequestService {
    db_pool: PgPool,
    config: BookingConfig,
}

impl BookingRequestService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
            config: state.config.booking.clone(),
        }
    }

    pub async fn create(
        &self,
        actor_id: Uuid,
        request: CreateBookingRequest,
    ) -> Result<BookingRequest, AppError> {
        request.validate()?;

        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let course = queries::find_course_ref(&self.db_pool, request.course).await?;
        let today = Utc::now().date_naive();

        validate_new_request(
            &actor,
            &course,
            request.modality,
            request.proposed_date,
            request.duration_minutes,
            today,
        )?;

        let duplicate = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM booking_requests
                WHERE student_id = $1 AND course_id = $2 AND proposed_date = $3 AND status = 'pending'
            )
            "#,
        )
        .bind(actor.user_id)
        .bind(course.course_id)
        .bind(request.proposed_date)
        .fetch_one(&self.db_pool)
        .await?;

        if duplicate {
            return Err(AppError::Conflict(
                "A pending request already exists for this course and date".to_string(),
            ));
        }

        let created = sqlx::query_as::<_, BookingRequest>(
            r#"
            INSERT INTO booking_requests
                (request_id, student_id, course_id, proposed_date, modality, duration_minutes, message, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.user_id)
        .bind(course.course_id)
        .bind(request.proposed_date)
        .bind(request.modality.as_str())
        .bind(request.duration_minutes)
        .bind(request.message)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(
                e,
                "A pending request already exists for this course and date",
            )
        })?;

        tracing::info!(
            request_id = %created.request_id,
            student_id = %actor.user_id,
            course_id = %course.course_id,
            "Booking request created"
        );
        Ok(created)
    }

    /// Newest first. Tutors see requests against their courses, students their own.
    pub async fn list(&self, actor_id: Uuid) -> Result<Vec<BookingRequest>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let query = match actor.role {
            UserRole::Admin => sqlx::query_as::<_, BookingRequest>(
                "SELECT * FROM booking_requests ORDER BY created_at DESC",
            ),
            UserRole::Tutor => sqlx::query_as::<_, BookingRequest>(
                r#"
                SELECT r.* FROM booking_requests r
                JOIN courses c ON c.course_id = r.course_id
                WHERE c.tutor_id = $1
                ORDER BY r.created_at DESC
                "#,
            )
            .bind(actor.user_id),
            UserRole::Student => sqlx::query_as::<_, BookingRequest>(
                "SELECT * FROM booking_requests WHERE student_id = $1 ORDER BY created_at DESC",
            )
            .bind(actor.user_id),
        };

        Ok(query.fetch_all(&self.db_pool).await?)
    }

    pub async fn get(&self, actor_id: Uuid, request_id: Uuid) -> Result<BookingRequest, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let request = sqlx::query_as::<_, BookingRequest>(
            "SELECT * FROM booking_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking request not found".to_string()))?;

        let course = queries::find_course_ref(&self.db_pool, request.course_id).await?;
        if !can_view(&actor, &request, course.tutor_id) {
            return Err(AppError::NotFound("Booking request not found".to_string()));
        }

        Ok(request)
    }

    /// Accepts a pending request, creating its session and booking in the same
    /// transaction.
    pub async fn accept(&self, actor_id: Uuid, request_id: Uuid) -> Result<RequestDecision, AppError> {
        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        let request = lock_request(&mut tx, request_id).await?;
        let course = queries::find_course_ref(&mut *tx, request.course_id).await?;

        ensure_can_decide(&actor, course.tutor_id)?;
        let status = request.status()?.transition_to(RequestStatus::Accepted)?;

        if self.config.enforce_availability {
            if let Some(tutor_id) = course.tutor_id {
                let weekly = load_weekly_windows(&mut *tx, tutor_id).await?;
                let blocks = load_block_ranges(&mut *tx, tutor_id, request.proposed_date).await?;
                if !date_is_bookable(request.proposed_date, &weekly, &blocks) {
                    tracing::warn!(
                        request_id = %request_id,
                        tutor_id = %tutor_id,
                        "Refusing acceptance outside tutor availability"
                    );
                    return Err(AppError::Validation(
                        "Tutor has no availability on the proposed date".to_string(),
                    ));
                }
            }
        }

        let duration = resolve_duration(
            request.duration_minutes,
            course.tutor_default_minutes,
            self.config.fallback_session_minutes,
        );
        let today = Utc::now().date_naive();

        let session_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, course_id, duration_minutes, session_date, modality, is_active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            "#,
        )
        .bind(session_id)
        .bind(request.course_id)
        .bind(duration)
        .bind(request.proposed_date)
        .bind(&request.modality)
        .execute(&mut *tx)
        .await?;

        let booking_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, student_id, session_id, payment_id, booked_on, is_active)
            VALUES ($1, $2, $3, NULL, $4, TRUE)
            "#,
        )
        .bind(booking_id)
        .bind(request.student_id)
        .bind(session_id)
        .bind(today)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE booking_requests
            SET status = $2, session_id = $3, booking_id = $4, updated_at = NOW()
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .bind(status.as_str())
        .bind(session_id)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %request_id,
            session_id = %session_id,
            booking_id = %booking_id,
            duration_minutes = duration,
            "Booking request accepted"
        );

        Ok(RequestDecision {
            request_id,
            status,
            session_id: Some(session_id),
            booking_id: Some(booking_id),
        })
    }

    pub async fn reject(&self, actor_id: Uuid, request_id: Uuid) -> Result<RequestDecision, AppError> {
        self.close(actor_id, request_id, RequestStatus::Rejected).await
    }

    pub async fn cancel(&self, actor_id: Uuid, request_id: Uuid) -> Result<RequestDecision, AppError> {
        self.close(actor_id, request_id, RequestStatus::Cancelled).await
    }

    async fn close(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        next: RequestStatus,
    ) -> Result<RequestDecision, AppError> {
        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        let request = lock_request(&mut tx, request_id).await?;

        if next == RequestStatus::Cancelled {
            ensure_can_cancel(&actor, request.student_id)?;
        } else {
            let course = queries::find_course_ref(&mut *tx, request.course_id).await?;
            ensure_can_decide(&actor, course.tutor_id)?;
        }
        let status = request.status()?.transition_to(next)?;

        sqlx::query(
            "UPDATE booking_requests SET status = $2, updated_at = NOW() WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(request_id = %request_id, status = %status, "Booking request closed");

        Ok(RequestDecision {
            request_id,
            status,
            session_id: None,
            booking_id: None,
        })
    }
}

async fn lock_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    request_id: Uuid,
) -> Result<BookingRequest, AppError> {
    sqlx::query_as::<_, BookingRequest>(
        "SELECT * FROM booking_requests WHERE request_id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Booking request not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn course(modality: Modality, tutor_id: Option<Uuid>) -> CourseRef {
        CourseRef {
            course_id: Uuid::new_v4(),
            tutor_id,
            modality,
            tutor_default_minutes: Some(45),
        }
    }

    fn student() -> Actor {
        Actor::new(Uuid::new_v4(), UserRole::Student)
    }

    #[test]
    fn test_valid_request_passes() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Both, Some(Uuid::new_v4()));
        assert!(
            validate_new_request(&student(), &course, Modality::InPerson, today, None, today).is_ok()
        );
    }

    #[test]
    fn test_only_students_may_request() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Both, Some(Uuid::new_v4()));
        let tutor = Actor::new(Uuid::new_v4(), UserRole::Tutor);

        let result = validate_new_request(&tutor, &course, Modality::Remote, today, None, today);
        assert!(matches!(result, Err(AppError::Authorization(_))));
    }

    #[test]
    fn test_modality_must_match_course() {
        let today = date(2030, 3, 1);
        let course = course(Modality::InPerson, Some(Uuid::new_v4()));

        let result = validate_new_request(&student(), &course, Modality::Remote, today, None, today);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_request_cannot_ask_for_both() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Both, Some(Uuid::new_v4()));

        let result = validate_new_request(&student(), &course, Modality::Both, today, None, today);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_past_date_is_rejected() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Remote, Some(Uuid::new_v4()));

        let result = validate_new_request(
            &student(),
            &course,
            Modality::Remote,
            date(2030, 2, 28),
            None,
            today,
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_orphaned_course_cannot_be_requested() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Remote, None);

        let result = validate_new_request(&student(), &course, Modality::Remote, today, None, today);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_duration_bounds() {
        let today = date(2030, 3, 1);
        let course = course(Modality::Remote, Some(Uuid::new_v4()));
        let check = |minutes| {
            validate_new_request(&student(), &course, Modality::Remote, today, Some(minutes), today)
        };

        assert!(check(0).is_err());
        assert!(check(1).is_ok());
        assert!(check(MAX_SESSION_MINUTES).is_ok());
        assert!(check(MAX_SESSION_MINUTES + 1).is_err());
    }

    #[test]
    fn test_decisions_belong_to_course_tutor_or_admin() {
        let tutor_id = Uuid::new_v4();
        let tutor = Actor::new(tutor_id, UserRole::Tutor);
        let other_tutor = Actor::new(Uuid::new_v4(), UserRole::Tutor);
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin);

        assert!(ensure_can_decide(&tutor, Some(tutor_id)).is_ok());
        assert!(ensure_can_decide(&admin, Some(tutor_id)).is_ok());
        assert!(matches!(
            ensure_can_decide(&other_tutor, Some(tutor_id)),
            Err(AppError::Authorization(_))
        ));
        assert!(ensure_can_decide(&tutor, None).is_err());
    }

    #[test]
    fn test_cancel_belongs_to_requesting_student_or_admin() {
        let requester = student();
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin);

        assert!(ensure_can_cancel(&requester, requester.user_id).is_ok());
        assert!(ensure_can_cancel(&admin, requester.user_id).is_ok());
        assert!(ensure_can_cancel(&student(), requester.user_id).is_err());
    }

    #[test]
    fn test_duration_falls_back_in_order() {
        assert_eq!(resolve_duration(Some(30), Some(45), 60), 30);
        assert_eq!(resolve_duration(None, Some(45), 60), 45);
        assert_eq!(resolve_duration(None, None, 60), 60);
    }
}

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{Actor, AppError, UserRole};
use tutorlink_database::{queries, Booking, Payment, TutoringSession};

use crate::models::RecordPaymentRequest;
use crate::AppState;

/// The booking's student, the course tutor, or an admin.
pub fn ensure_booking_party(
    actor: &Actor,
    student_id: Uuid,
    tutor_id: Option<Uuid>,
) -> Result<(), AppError> {
    if actor.is_self_or_admin(student_id) || tutor_id == Some(actor.user_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "You are not a party to this booking".to_string(),
        ))
    }
}

pub fn validate_payment_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Payment amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub struct BookingService {
    db_pool: PgPool,
}

impl BookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
        }
    }

    pub async fn get_session(&self, actor_id: Uuid, session_id: Uuid) -> Result<TutoringSession, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let session = sqlx::query_as::<_, TutoringSession>("SELECT * FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if actor.is_admin() {
            return Ok(session);
        }

        let tutor_id = queries::find_tutor_for_session(&self.db_pool, session_id).await?;
        if tutor_id == Some(actor.user_id) {
            return Ok(session);
        }

        let booked = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE session_id = $1 AND student_id = $2)",
        )
        .bind(session_id)
        .bind(actor.user_id)
        .fetch_one(&self.db_pool)
        .await?;

        if booked {
            Ok(session)
        } else {
            Err(AppError::Authorization(
                "You are not part of this session".to_string(),
            ))
        }
    }

    pub async fn list_bookings(&self, actor_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let query = match actor.role {
            UserRole::Admin => {
                sqlx::query_as::<_, Booking>("SELECT * FROM bookings ORDER BY created_at DESC")
            }
            UserRole::Tutor => sqlx::query_as::<_, Booking>(
                r#"
                SELECT b.* FROM bookings b
                JOIN sessions s ON s.session_id = b.session_id
                JOIN courses c ON c.course_id = s.course_id
                WHERE c.tutor_id = $1
                ORDER BY b.created_at DESC
                "#,
            )
            .bind(actor.user_id),
            UserRole::Student => sqlx::query_as::<_, Booking>(
                "SELECT * FROM bookings WHERE student_id = $1 ORDER BY created_at DESC",
            )
            .bind(actor.user_id),
        };

        Ok(query.fetch_all(&self.db_pool).await?)
    }

    pub async fn get_booking(&self, actor_id: Uuid, booking_id: Uuid) -> Result<Booking, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let parties = queries::find_booking_parties(&self.db_pool, booking_id).await?;
        ensure_booking_party(&actor, parties.student_id, parties.tutor_id)?;

        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok(booking)
    }

    /// Stores a completed payment against a booking. No money moves.
    pub async fn record_payment(
        &self,
        actor_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<Payment, AppError> {
        request.validate()?;
        validate_payment_amount(request.amount)?;

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;

        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE",
        )
        .bind(request.booking)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if !actor.is_self_or_admin(booking.student_id) {
            return Err(AppError::Authorization(
                "Only the booking's student can record a payment".to_string(),
            ));
        }
        if booking.payment_id.is_some() {
            return Err(AppError::Conflict(
                "Booking already has a payment".to_string(),
            ));
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, amount, method, paid_on, is_completed)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.amount)
        .bind(&request.method)
        .bind(Utc::now().date_naive())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE bookings SET payment_id = $2 WHERE booking_id = $1")
            .bind(booking.booking_id)
            .bind(payment.payment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.booking_id,
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    pub async fn get_payment(&self, actor_id: Uuid, payment_id: Uuid) -> Result<Payment, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if actor.is_admin() {
            return Ok(payment);
        }

        let booking_id: Option<Uuid> =
            sqlx::query_scalar("SELECT booking_id FROM bookings WHERE payment_id = $1 LIMIT 1")
                .bind(payment_id)
                .fetch_optional(&self.db_pool)
                .await?;

        let booking_id = booking_id.ok_or_else(|| {
            AppError::Authorization("Payment is not linked to any of your bookings".to_string())
        })?;
        let parties = queries::find_booking_parties(&self.db_pool, booking_id).await?;
        ensure_booking_party(&actor, parties.student_id, parties.tutor_id)?;

        Ok(payment)
    }
}

//! Weekly availability windows and one-off schedule blocks.
//!
//! The overlap rules live in plain functions so they can be checked without a
//! database; [`AvailabilityService`] wraps them in the locking transactions.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use tutorlink_common::{Actor, AppError};
use tutorlink_database::{queries, ScheduleBlock, WeeklyAvailability};

use crate::models::{
    CreateScheduleBlockRequest, CreateWeeklyAvailabilityRequest, UpdateWeeklyAvailabilityRequest,
};
use crate::AppState;

/// A weekly recurring window as seen by the overlap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyWindow {
    /// `None` for a window that has not been stored yet.
    pub id: Option<Uuid>,
    pub day_of_week: i16,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub is_active: bool,
}

impl From<&WeeklyAvailability> for WeeklyWindow {
    fn from(row: &WeeklyAvailability) -> Self {
        Self {
            id: Some(row.availability_id),
            day_of_week: row.day_of_week,
            start: row.start_time,
            end: row.end_time,
            is_active: row.is_active,
        }
    }
}

/// Half-open interval overlap: touching endpoints do not overlap.
pub fn windows_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Checks a candidate window against the other windows of the same user.
///
/// `existing` may contain windows for any day; only active windows on the
/// candidate's day, other than the candidate itself, are compared.
pub fn validate_weekly_block(
    candidate: &WeeklyWindow,
    existing: &[WeeklyWindow],
) -> Result<(), AppError> {
    if !(0..=6).contains(&candidate.day_of_week) {
        return Err(AppError::Validation(
            "day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    if candidate.start >= candidate.end {
        return Err(AppError::Validation(
            "start_time must be earlier than end_time".to_string(),
        ));
    }
    if !candidate.is_active {
        return Ok(());
    }

    let clash = existing.iter().find(|other| {
        other.is_active
            && other.day_of_week == candidate.day_of_week
            && (candidate.id.is_none() || other.id != candidate.id)
            && windows_overlap(candidate.start, candidate.end, other.start, other.end)
    });

    match clash {
        Some(other) => Err(AppError::Validation(format!(
            "Availability overlaps the existing window {}-{} on day {}",
            other.start.format("%H:%M"),
            other.end.format("%H:%M"),
            other.day_of_week
        ))),
        None => Ok(()),
    }
}

pub fn validate_schedule_block(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<(), AppError> {
    if starts_at >= ends_at {
        return Err(AppError::Validation(
            "starts_at must be earlier than ends_at".to_string(),
        ));
    }
    Ok(())
}

/// Whether `date` has at least one active weekly window that no single
/// schedule block covers completely. Windows are read as UTC wall-clock times.
pub fn date_is_bookable(
    date: NaiveDate,
    weekly: &[WeeklyWindow],
    blocks: &[(DateTime<Utc>, DateTime<Utc>)],
) -> bool {
    let weekday = date.weekday().num_days_from_sunday() as i16;

    weekly
        .iter()
        .filter(|window| window.is_active && window.day_of_week == weekday)
        .any(|window| {
            let opens = Utc.from_utc_datetime(&date.and_time(window.start));
            let closes = Utc.from_utc_datetime(&date.and_time(window.end));
            !blocks
                .iter()
                .any(|(starts_at, ends_at)| *starts_at <= opens && *ends_at >= closes)
        })
}

pub async fn load_weekly_windows<'e, E>(
    executor: E,
    user_id: Uuid,
) -> Result<Vec<WeeklyWindow>, AppError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, WeeklyAvailability>(
        "SELECT * FROM weekly_availability WHERE user_id = $1 AND is_active = TRUE",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(WeeklyWindow::from).collect())
}

pub async fn load_block_ranges<'e, E>(
    executor: E,
    user_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, AppError>
where
    E: PgExecutor<'e>,
{
    let day_start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    let day_end = day_start + chrono::Duration::days(1);

    let rows = sqlx::query_as::<_, ScheduleBlock>(
        "SELECT * FROM schedule_blocks WHERE user_id = $1 AND starts_at < $3 AND ends_at > $2",
    )
    .bind(user_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|b| (b.starts_at, b.ends_at)).collect())
}

fn ensure_owner_or_admin(actor: &Actor, owner_id: Uuid) -> Result<(), AppError> {
    if actor.is_self_or_admin(owner_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "You can only manage your own availability".to_string(),
        ))
    }
}

pub struct AvailabilityService {
    db_pool: PgPool,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
        }
    }

    /// Admins see every user's windows (optionally one user's); others see their own.
    pub async fn list_weekly(
        &self,
        actor_id: Uuid,
        user_filter: Option<Uuid>,
    ) -> Result<Vec<WeeklyAvailability>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let owner = if actor.is_admin() { user_filter } else { Some(actor.user_id) };

        let rows = sqlx::query_as::<_, WeeklyAvailability>(
            r#"
            SELECT * FROM weekly_availability
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY user_id, day_of_week, start_time
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    pub async fn create_weekly(
        &self,
        actor_id: Uuid,
        request: CreateWeeklyAvailabilityRequest,
    ) -> Result<WeeklyAvailability, AppError> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        queries::lock_user(&mut *tx, actor.user_id).await?;

        let candidate = WeeklyWindow {
            id: None,
            day_of_week: request.day_of_week,
            start: request.start_time,
            end: request.end_time,
            is_active: request.is_active,
        };
        let existing = load_weekly_windows(&mut *tx, actor.user_id).await?;
        validate_weekly_block(&candidate, &existing)?;

        let row = sqlx::query_as::<_, WeeklyAvailability>(
            r#"
            INSERT INTO weekly_availability (availability_id, user_id, day_of_week, start_time, end_time, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.user_id)
        .bind(candidate.day_of_week)
        .bind(candidate.start)
        .bind(candidate.end)
        .bind(candidate.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %actor.user_id,
            availability_id = %row.availability_id,
            day = row.day_of_week,
            "Weekly availability created"
        );
        Ok(row)
    }

    pub async fn update_weekly(
        &self,
        actor_id: Uuid,
        availability_id: Uuid,
        request: UpdateWeeklyAvailabilityRequest,
    ) -> Result<WeeklyAvailability, AppError> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;

        let owner_id: Uuid = sqlx::query_scalar(
            "SELECT user_id FROM weekly_availability WHERE availability_id = $1",
        )
        .bind(availability_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Availability not found".to_string()))?;

        ensure_owner_or_admin(&actor, owner_id)?;
        queries::lock_user(&mut *tx, owner_id).await?;

        let current = sqlx::query_as::<_, WeeklyAvailability>(
            "SELECT * FROM weekly_availability WHERE availability_id = $1",
        )
        .bind(availability_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Availability not found".to_string()))?;

        let candidate = WeeklyWindow {
            id: Some(current.availability_id),
            day_of_week: request.day_of_week.unwrap_or(current.day_of_week),
            start: request.start_time.unwrap_or(current.start_time),
            end: request.end_time.unwrap_or(current.end_time),
            is_active: request.is_active.unwrap_or(current.is_active),
        };
        let existing = load_weekly_windows(&mut *tx, owner_id).await?;
        validate_weekly_block(&candidate, &existing)?;

        let row = sqlx::query_as::<_, WeeklyAvailability>(
            r#"
            UPDATE weekly_availability
            SET day_of_week = $2, start_time = $3, end_time = $4, is_active = $5, updated_at = NOW()
            WHERE availability_id = $1
            RETURNING *
            "#,
        )
        .bind(availability_id)
        .bind(candidate.day_of_week)
        .bind(candidate.start)
        .bind(candidate.end)
        .bind(candidate.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(availability_id = %availability_id, "Weekly availability updated");
        Ok(row)
    }

    pub async fn delete_weekly(&self, actor_id: Uuid, availability_id: Uuid) -> Result<(), AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let owner_id: Uuid = sqlx::query_scalar(
            "SELECT user_id FROM weekly_availability WHERE availability_id = $1",
        )
        .bind(availability_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Availability not found".to_string()))?;

        ensure_owner_or_admin(&actor, owner_id)?;

        sqlx::query("DELETE FROM weekly_availability WHERE availability_id = $1")
            .bind(availability_id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(availability_id = %availability_id, "Weekly availability deleted");
        Ok(())
    }

    pub async fn list_blocks(
        &self,
        actor_id: Uuid,
        user_filter: Option<Uuid>,
    ) -> Result<Vec<ScheduleBlock>, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let owner = if actor.is_admin() { user_filter } else { Some(actor.user_id) };

        let rows = sqlx::query_as::<_, ScheduleBlock>(
            r#"
            SELECT * FROM schedule_blocks
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY starts_at
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }

    pub async fn create_block(
        &self,
        actor_id: Uuid,
        request: CreateScheduleBlockRequest,
    ) -> Result<ScheduleBlock, AppError> {
        request.validate()?;
        validate_schedule_block(request.starts_at, request.ends_at)?;
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let row = sqlx::query_as::<_, ScheduleBlock>(
            r#"
            INSERT INTO schedule_blocks (block_id, user_id, starts_at, ends_at, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.user_id)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(request.reason)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(user_id = %actor.user_id, block_id = %row.block_id, "Schedule block created");
        Ok(row)
    }

    pub async fn delete_block(&self, actor_id: Uuid, block_id: Uuid) -> Result<(), AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;

        let owner_id: Uuid =
            sqlx::query_scalar("SELECT user_id FROM schedule_blocks WHERE block_id = $1")
                .bind(block_id)
                .fetch_optional(&self.db_pool)
                .await?
                .ok_or_else(|| AppError::NotFound("Schedule block not found".to_string()))?;

        ensure_owner_or_admin(&actor, owner_id)?;

        sqlx::query("DELETE FROM schedule_blocks WHERE block_id = $1")
            .bind(block_id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(block_id = %block_id, "Schedule block deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorlink_common::UserRole;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn window(day: i16, start: NaiveTime, end: NaiveTime) -> WeeklyWindow {
        WeeklyWindow {
            id: Some(Uuid::new_v4()),
            day_of_week: day,
            start,
            end,
            is_active: true,
        }
    }

    fn new_window(day: i16, start: NaiveTime, end: NaiveTime) -> WeeklyWindow {
        WeeklyWindow { id: None, ..window(day, start, end) }
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let cases = [
            ((9, 11), (10, 12), true),
            ((9, 10), (10, 11), false),
            ((9, 12), (10, 11), true),
            ((13, 14), (9, 10), false),
        ];
        for ((a0, a1), (b0, b1), expected) in cases {
            let (a0, a1, b0, b1) = (at(a0, 0), at(a1, 0), at(b0, 0), at(b1, 0));
            assert_eq!(windows_overlap(a0, a1, b0, b1), expected);
            assert_eq!(windows_overlap(b0, b1, a0, a1), expected);
        }
    }

    #[test]
    fn test_overlapping_window_on_same_day_is_rejected() {
        let existing = [window(1, at(9, 0), at(11, 0))];
        let result = validate_weekly_block(&new_window(1, at(10, 30), at(12, 0)), &existing);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_adjacent_windows_are_allowed() {
        let existing = [window(1, at(9, 0), at(11, 0))];
        assert!(validate_weekly_block(&new_window(1, at(11, 0), at(12, 0)), &existing).is_ok());
    }

    #[test]
    fn test_other_days_and_inactive_windows_are_ignored() {
        let mut inactive = window(1, at(9, 0), at(11, 0));
        inactive.is_active = false;
        let existing = [window(2, at(9, 0), at(11, 0)), inactive];
        assert!(validate_weekly_block(&new_window(1, at(9, 30), at(10, 30)), &existing).is_ok());
    }

    #[test]
    fn test_update_does_not_collide_with_itself() {
        let stored = window(3, at(9, 0), at(11, 0));
        let moved = WeeklyWindow {
            start: at(10, 0),
            end: at(12, 0),
            ..stored
        };
        assert!(validate_weekly_block(&moved, &[stored]).is_ok());
    }

    #[test]
    fn test_inverted_or_empty_window_is_rejected_even_when_inactive() {
        let mut empty = new_window(1, at(10, 0), at(10, 0));
        assert!(validate_weekly_block(&empty, &[]).is_err());
        empty.is_active = false;
        assert!(validate_weekly_block(&empty, &[]).is_err());
        assert!(validate_weekly_block(&new_window(1, at(11, 0), at(10, 0)), &[]).is_err());
    }

    #[test]
    fn test_inactive_candidate_skips_overlap_check() {
        let existing = [window(1, at(9, 0), at(11, 0))];
        let mut candidate = new_window(1, at(10, 0), at(12, 0));
        candidate.is_active = false;
        assert!(validate_weekly_block(&candidate, &existing).is_ok());
    }

    #[test]
    fn test_day_out_of_range_is_rejected() {
        assert!(validate_weekly_block(&new_window(7, at(9, 0), at(10, 0)), &[]).is_err());
        assert!(validate_weekly_block(&new_window(-1, at(9, 0), at(10, 0)), &[]).is_err());
    }

    #[test]
    fn test_schedule_block_requires_positive_length() {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
        tokio_test::assert_err!(validate_schedule_block(start, start));
        tokio_test::assert_ok!(validate_schedule_block(start, start + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_date_is_bookable_follows_weekday_and_blocks() {
        // 2030-01-07 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let weekly = [window(1, at(9, 0), at(12, 0))];

        assert!(date_is_bookable(monday, &weekly, &[]));
        assert!(!date_is_bookable(monday.succ_opt().unwrap(), &weekly, &[]));

        let whole_morning = (
            Utc.with_ymd_and_hms(2030, 1, 7, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 7, 13, 0, 0).unwrap(),
        );
        assert!(!date_is_bookable(monday, &weekly, &[whole_morning]));

        let partial = (
            Utc.with_ymd_and_hms(2030, 1, 7, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 7, 11, 0, 0).unwrap(),
        );
        assert!(date_is_bookable(monday, &weekly, &[partial]));
    }

    #[test]
    fn test_only_owner_or_admin_manages_windows() {
        let owner = Uuid::new_v4();
        let stranger = Actor::new(Uuid::new_v4(), UserRole::Tutor);
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin);

        assert!(ensure_owner_or_admin(&Actor::new(owner, UserRole::Tutor), owner).is_ok());
        assert!(ensure_owner_or_admin(&admin, owner).is_ok());
        assert!(matches!(
            ensure_owner_or_admin(&stranger, owner),
            Err(AppError::Authorization(_))
        ));
    }
}

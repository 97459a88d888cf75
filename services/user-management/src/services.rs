use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use tutorlink_auth::{Claims, JwtService, PasswordService};
use tutorlink_common::{Actor, AppError, Page, UserRole};
use tutorlink_database::{queries, Category, Course, User};

use crate::config::AppConfig;
use crate::models::*;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: AppConfig) -> Self {
        Self {
            db_pool,
            jwt_service: JwtService::new(&config.jwt),
            config,
        }
    }
}

/// Self-registration may pick tutor or student; admin accounts are seeded.
pub fn registration_role(requested: Option<UserRole>) -> Result<UserRole, AppError> {
    match requested.unwrap_or(UserRole::Student) {
        UserRole::Admin => Err(AppError::Validation(
            "Admin accounts cannot be self-registered".to_string(),
        )),
        role => Ok(role),
    }
}

pub fn ensure_can_manage_course(actor: &Actor, course_tutor: Option<Uuid>) -> Result<(), AppError> {
    if actor.is_admin() || course_tutor == Some(actor.user_id) {
        Ok(())
    } else {
        Err(AppError::Authorization(
            "Only the course tutor can modify this course".to_string(),
        ))
    }
}

pub fn validate_price(price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    Ok(())
}

/// Turns a student into a tutor. Tutors and admins keep their role.
///
/// Returns whether the role changed.
pub async fn promote_to_tutor<'e, E>(executor: E, user_id: Uuid) -> Result<bool, AppError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE users SET role = 'tutor', updated_at = NOW() WHERE user_id = $1 AND role = 'student'",
    )
    .bind(user_id)
    .execute(executor)
    .await?;

    let promoted = result.rows_affected() > 0;
    if promoted {
        tracing::info!(user_id = %user_id, "User promoted to tutor");
    }
    Ok(promoted)
}

pub struct UserService {
    db_pool: PgPool,
    jwt_service: JwtService,
    config: AppConfig,
}

impl UserService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
            jwt_service: state.jwt_service.clone(),
            config: state.config.clone(),
        }
    }

    pub async fn register_user(&self, request: RegisterRequest) -> Result<AuthResponse, AppError> {
        let role = registration_role(request.role)?;
        PasswordService::validate_password_strength(&request.password)?;

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(&request.email)
        .bind(&request.username)
        .fetch_one(&self.db_pool)
        .await?;

        if exists {
            return Err(AppError::Conflict(
                "User with this email or username already exists".to_string(),
            ));
        }

        let hashed_password = PasswordService::hash_password(&request.password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, username, email, hashed_password, role, phone, specialty, description, time_zone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'UTC'))
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.username)
        .bind(&request.email)
        .bind(&hashed_password)
        .bind(role.as_str())
        .bind(&request.phone)
        .bind(&request.specialty)
        .bind(&request.description)
        .bind(&request.time_zone)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(e, "User with this email or username already exists")
        })?;

        tracing::info!("User registered: {} ({}) as {}", user.username, user.email, role);
        self.issue_token(user)
    }

    pub async fn login_user(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&request.email)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !PasswordService::verify_password(&request.password, &user.hashed_password)? {
            tracing::warn!("Failed login for {}", request.email);
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }

        tracing::info!("User logged in: {} ({})", user.username, user.email);
        self.issue_token(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserInfo, AppError> {
        let user = queries::find_user(&self.db_pool, user_id).await?;
        UserInfo::try_from(user)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserInfo, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                phone = COALESCE($2, phone),
                specialty = COALESCE($3, specialty),
                description = COALESCE($4, description),
                time_zone = COALESCE($5, time_zone),
                default_session_minutes = COALESCE($6, default_session_minutes),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.phone)
        .bind(&request.specialty)
        .bind(&request.description)
        .bind(&request.time_zone)
        .bind(request.default_session_minutes)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!("Profile updated for user {}", user_id);
        UserInfo::try_from(user)
    }

    fn issue_token(&self, user: User) -> Result<AuthResponse, AppError> {
        let claims = Claims::new(
            user.user_id,
            user.username.clone(),
            user.email.clone(),
            user.role()?,
            &self.config.jwt,
        );
        let token = self.jwt_service.generate_token(&claims)?;

        Ok(AuthResponse {
            token,
            user: UserInfo::try_from(user)?,
            expires_at: Utc::now() + Duration::hours(self.config.jwt.expiration_hours as i64),
        })
    }
}

pub struct CatalogService {
    db_pool: PgPool,
}

impl CatalogService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db_pool: state.db_pool.clone(),
        }
    }

    pub async fn list_categories(&self, query: CategoryQuery) -> Result<Page<Category>, AppError> {
        let paging = query.paging();
        let term = search_term(&query.q);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM categories WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%'",
        )
        .bind(&term)
        .fetch_one(&self.db_pool)
        .await?;

        let items = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%'
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&term)
        .bind(paging.page_size() as i64)
        .bind(paging.offset())
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Page {
            items,
            page: paging.page(),
            page_size: paging.page_size(),
            total,
        })
    }

    pub async fn create_category(
        &self,
        actor_id: Uuid,
        request: CreateCategoryRequest,
    ) -> Result<Category, AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        if !actor.is_admin() {
            return Err(AppError::Authorization(
                "Only administrators can create categories".to_string(),
            ));
        }

        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (category_id, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&request.description)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!("Category created: {}", category.name);
        Ok(category)
    }

    pub async fn list_courses(&self, query: CourseQuery) -> Result<Page<Course>, AppError> {
        let paging = query.paging();
        let term = search_term(&query.q);

        let filter = r#"
            ($1::uuid IS NULL OR category_id = $1)
            AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%')
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM courses WHERE {}", filter))
            .bind(query.category)
            .bind(&term)
            .fetch_one(&self.db_pool)
            .await?;

        let items = sqlx::query_as::<_, Course>(&format!(
            "SELECT * FROM courses WHERE {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            filter
        ))
        .bind(query.category)
        .bind(&term)
        .bind(paging.page_size() as i64)
        .bind(paging.offset())
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Page {
            items,
            page: paging.page(),
            page_size: paging.page_size(),
            total,
        })
    }

    pub async fn get_course(&self, course_id: Uuid) -> Result<Course, AppError> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE course_id = $1")
            .bind(course_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
    }

    /// Creates a course owned by the caller, promoting a student caller to tutor
    /// in the same transaction.
    pub async fn create_course(
        &self,
        actor_id: Uuid,
        request: CreateCourseRequest,
    ) -> Result<Course, AppError> {
        validate_price(request.price)?;

        let mut tx = self.db_pool.begin().await?;
        let actor = queries::find_actor(&mut *tx, actor_id).await?;
        ensure_category_exists(&mut *tx, request.category_id).await?;

        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (course_id, tutor_id, category_id, name, description, modality, city, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor.user_id)
        .bind(request.category_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.modality.as_str())
        .bind(&request.city)
        .bind(request.price)
        .fetch_one(&mut *tx)
        .await?;

        promote_to_tutor(&mut *tx, actor.user_id).await?;
        tx.commit().await?;

        tracing::info!("Course {} created by {}", course.course_id, actor.user_id);
        Ok(course)
    }

    pub async fn update_course(
        &self,
        actor_id: Uuid,
        course_id: Uuid,
        request: UpdateCourseRequest,
    ) -> Result<Course, AppError> {
        if let Some(price) = request.price {
            validate_price(price)?;
        }

        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let current = self.get_course(course_id).await?;
        ensure_can_manage_course(&actor, current.tutor_id)?;

        if let Some(category_id) = request.category_id {
            ensure_category_exists(&self.db_pool, category_id).await?;
        }

        let course = sqlx::query_as::<_, Course>(
            r#"
            UPDATE courses SET
                category_id = COALESCE($2, category_id),
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                modality = COALESCE($5, modality),
                city = COALESCE($6, city),
                price = COALESCE($7, price),
                updated_at = NOW()
            WHERE course_id = $1
            RETURNING *
            "#,
        )
        .bind(course_id)
        .bind(request.category_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.modality.map(|m| m.as_str()))
        .bind(&request.city)
        .bind(request.price)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!("Course {} updated", course_id);
        Ok(course)
    }

    pub async fn delete_course(&self, actor_id: Uuid, course_id: Uuid) -> Result<(), AppError> {
        let actor = queries::find_actor(&self.db_pool, actor_id).await?;
        let current = self.get_course(course_id).await?;
        ensure_can_manage_course(&actor, current.tutor_id)?;

        sqlx::query("DELETE FROM courses WHERE course_id = $1")
            .bind(course_id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!("Course {} deleted by {}", course_id, actor.user_id);
        Ok(())
    }
}

async fn ensure_category_exists<'e, E>(executor: E, category_id: Uuid) -> Result<(), AppError>
where
    E: PgExecutor<'e>,
{
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE category_id = $1)")
            .bind(category_id)
            .fetch_one(executor)
            .await?;

    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound("Category not found".to_string()))
    }
}

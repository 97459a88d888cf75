use sqlx::PgPool;
use tutorlink_auth::PasswordService;
use tutorlink_common::{env_or, AppError};
use uuid::Uuid;

const STARTER_CATEGORIES: &[(&str, &str)] = &[
    ("Mathematics", "Algebra, calculus, statistics and exam preparation"),
    ("Languages", "Conversation practice and grammar for any language"),
    ("Programming", "Software development from first steps to interviews"),
    ("Music", "Instrument lessons and music theory"),
];

pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_all_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Starting database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.into()))?;

        tracing::info!("All migrations completed successfully");
        Ok(())
    }

    pub async fn check_migration_status(&self) -> Result<MigrationStatus, AppError> {
        let migrator = sqlx::migrate!("./migrations");

        let table_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')",
        )
        .fetch_one(&self.pool)
        .await?;

        let applied_count = if table_exists {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = TRUE")
                    .fetch_one(&self.pool)
                    .await?;
            count as usize
        } else {
            0
        };

        let total_migrations = migrator.migrations.len();
        let pending_count = total_migrations.saturating_sub(applied_count);

        Ok(MigrationStatus {
            total: total_migrations,
            applied: applied_count,
            pending: pending_count,
            is_up_to_date: pending_count == 0,
        })
    }

    /// Creates the bootstrap admin account and the starter categories.
    ///
    /// Safe to run repeatedly; existing rows are left alone.
    pub async fn seed_initial_data(&self) -> Result<(), AppError> {
        let admin_email = env_or("SEED_ADMIN_EMAIL", "admin@tutorlink.dev");

        let admin_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(&admin_email)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if !admin_exists {
            let admin_password =
                PasswordService::hash_password(&env_or("SEED_ADMIN_PASSWORD", "admin1234"))?;

            sqlx::query(
                r#"
                INSERT INTO users (user_id, username, email, hashed_password, role)
                VALUES ($1, $2, $3, $4, 'admin')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind("admin")
            .bind(&admin_email)
            .bind(admin_password)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

            tracing::info!(email = %admin_email, "Admin user created");
        }

        for (name, description) in STARTER_CATEGORIES {
            let inserted = sqlx::query(
                r#"
                INSERT INTO categories (category_id, name, description)
                SELECT $1, $2, $3
                WHERE NOT EXISTS (SELECT 1 FROM categories WHERE name = $2)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(description)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if inserted > 0 {
                tracing::info!(category = %name, "Category seeded");
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub is_up_to_date: bool,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Migrations: {}/{} applied, {} pending",
            self.applied, self.total, self.pending
        )
    }
}

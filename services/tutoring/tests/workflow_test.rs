//! End-to-end booking workflow against a real database.
//!
//! Skipped unless `DATABASE_URL` points at a disposable Postgres instance.

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use tutorlink_auth::{Claims, JwtService};
use tutorlink_common::{AppError, DatabaseConfig, JwtConfig, ServerConfig, UserRole};
use tutorlink_database::MigrationRunner;
use tutorlink_tutoring::{
    availability::AvailabilityService,
    booking_requests::BookingRequestService,
    build_app,
    config::{AppConfig, BookingConfig},
    messaging::MessagingService,
    models::{CreateReviewRequest, CreateWeeklyAvailabilityRequest, PostMessageRequest},
    reviews::ReviewService,
    AppState,
};

struct Harness {
    server: TestServer,
    state: AppState,
    pool: PgPool,
    jwt: JwtConfig,
}

impl Harness {
    async fn start() -> Option<Self> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping workflow test - DATABASE_URL not set");
                return None;
            }
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("Failed to connect to test database");
        MigrationRunner::new(pool.clone())
            .run_all_migrations()
            .await
            .expect("Failed to run migrations");

        let jwt = JwtConfig {
            secret: "workflow-secret".to_string(),
            expiration_hours: 1,
            issuer: "tutorlink".to_string(),
        };
        let config = AppConfig {
            server: ServerConfig::from_env(0),
            database: DatabaseConfig::from_env(),
            jwt: jwt.clone(),
            booking: BookingConfig::default(),
        };
        let state = AppState::new(pool.clone(), config);
        let server = TestServer::new(build_app(state.clone())).expect("test server");

        Some(Self {
            server,
            state,
            pool,
            jwt,
        })
    }

    async fn user(&self, role: UserRole, default_minutes: i32) -> (Uuid, HeaderValue) {
        let user_id = Uuid::new_v4();
        let username = format!("{}_{}", role, user_id.simple());
        let email = format!("{}@example.com", username);

        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, hashed_password, role, default_session_minutes)
            VALUES ($1, $2, $3, 'not-a-real-hash', $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(&username)
        .bind(&email)
        .bind(role.as_str())
        .bind(default_minutes)
        .execute(&self.pool)
        .await
        .expect("insert user");

        let claims = Claims::new(user_id, username, email, role, &self.jwt);
        let token = JwtService::new(&self.jwt).generate_token(&claims).unwrap();
        (user_id, HeaderValue::from_str(&format!("Bearer {}", token)).unwrap())
    }

    async fn course(&self, tutor_id: Uuid, modality: &str) -> Uuid {
        let category_id = Uuid::new_v4();
        sqlx::query("INSERT INTO categories (category_id, name) VALUES ($1, $2)")
            .bind(category_id)
            .bind(format!("Category {}", category_id.simple()))
            .execute(&self.pool)
            .await
            .expect("insert category");

        let course_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO courses (course_id, tutor_id, category_id, name, modality, price)
            VALUES ($1, $2, $3, 'Calculus I', $4, 25.00)
            "#,
        )
        .bind(course_id)
        .bind(tutor_id)
        .bind(category_id)
        .bind(modality)
        .execute(&self.pool)
        .await
        .expect("insert course");
        course_id
    }

    /// A held session of `course_id` booked by `student_id`, ready for review.
    async fn past_booking(&self, course_id: Uuid, student_id: Uuid) -> Uuid {
        let session_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, course_id, duration_minutes, session_date, modality)
            VALUES ($1, $2, 60, CURRENT_DATE - 2, 'remote')
            "#,
        )
        .bind(session_id)
        .bind(course_id)
        .execute(&self.pool)
        .await
        .expect("insert session");

        let booking_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, student_id, session_id, booked_on)
            VALUES ($1, $2, $3, CURRENT_DATE - 3)
            "#,
        )
        .bind(booking_id)
        .bind(student_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .expect("insert booking");
        booking_id
    }

    async fn conversation_updated_at(&self, conversation_id: &str) -> DateTime<Utc> {
        sqlx::query_scalar("SELECT updated_at FROM conversations WHERE conversation_id = $1")
            .bind(Uuid::parse_str(conversation_id).unwrap())
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn data(response: &axum_test::TestResponse) -> Value {
    let body: Value = response.json();
    body["data"].clone()
}

#[tokio::test]
async fn test_request_accept_review_flow() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, tutor) = h.user(UserRole::Tutor, 45).await;
    let (_, student) = h.user(UserRole::Student, 60).await;
    let course_id = h.course(tutor_id, "both").await;
    let date = (Utc::now().date_naive() + Duration::days(7)).to_string();

    let body = json!({ "course": course_id, "fecha_propuesta": date, "modalidad": "presencial" });
    let created = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student.clone())
        .json(&body)
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let request_id = data(&created)["request_id"].as_str().unwrap().to_string();

    let duplicate = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student.clone())
        .json(&body)
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

    let by_student = h
        .server
        .post(&format!("/booking-requests/{}/accept", request_id))
        .add_header(AUTHORIZATION, student.clone())
        .await;
    assert_eq!(by_student.status_code(), StatusCode::FORBIDDEN);

    let accepted = h
        .server
        .post(&format!("/booking-requests/{}/accept", request_id))
        .add_header(AUTHORIZATION, tutor.clone())
        .await;
    assert_eq!(accepted.status_code(), StatusCode::OK);
    let decision = data(&accepted);
    assert_eq!(decision["estado_solicitud"], "accepted");
    let session_id = decision["tutoria_id"].as_str().unwrap().to_string();
    let booking_id = decision["reserva_id"].as_str().unwrap().to_string();

    let again = h
        .server
        .post(&format!("/booking-requests/{}/accept", request_id))
        .add_header(AUTHORIZATION, tutor.clone())
        .await;
    assert_eq!(again.status_code(), StatusCode::BAD_REQUEST);

    let session = data(
        &h.server
            .get(&format!("/sessions/{}", session_id))
            .add_header(AUTHORIZATION, student.clone())
            .await,
    );
    assert_eq!(session["duration_minutes"], 45);
    assert_eq!(session["modality"], "in_person");

    let booking = data(
        &h.server
            .get(&format!("/bookings/{}", booking_id))
            .add_header(AUTHORIZATION, tutor.clone())
            .await,
    );
    assert_eq!(booking["session_id"], session_id.as_str());
    assert!(booking["payment_id"].is_null());

    let too_early = h
        .server
        .post("/reviews")
        .add_header(AUTHORIZATION, student.clone())
        .json(&json!({ "reserva": booking_id, "puntuacion": 5 }))
        .await;
    assert_eq!(too_early.status_code(), StatusCode::BAD_REQUEST);

    sqlx::query("UPDATE sessions SET session_date = CURRENT_DATE - 1 WHERE session_id = $1")
        .bind(Uuid::parse_str(&session_id).unwrap())
        .execute(&h.pool)
        .await
        .unwrap();

    let out_of_range = h
        .server
        .post("/reviews")
        .add_header(AUTHORIZATION, student.clone())
        .json(&json!({ "reserva": booking_id, "puntuacion": 6 }))
        .await;
    assert_eq!(out_of_range.status_code(), StatusCode::BAD_REQUEST);

    let review = h
        .server
        .post("/reviews")
        .add_header(AUTHORIZATION, student.clone())
        .json(&json!({ "reserva": booking_id, "comentario": "Muy claro", "puntuacion": 5 }))
        .await;
    assert_eq!(review.status_code(), StatusCode::CREATED);
    assert_eq!(data(&review)["tutor_id"], tutor_id.to_string());

    let average: Option<Decimal> =
        sqlx::query_scalar("SELECT average_rating FROM users WHERE user_id = $1")
            .bind(tutor_id)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(average, Some(Decimal::from(5)));

    let second = h
        .server
        .post("/reviews")
        .add_header(AUTHORIZATION, student)
        .json(&json!({ "reserva": booking_id, "puntuacion": 4 }))
        .await;
    assert_eq!(second.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_request_frees_the_date() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, tutor) = h.user(UserRole::Tutor, 60).await;
    let (_, student) = h.user(UserRole::Student, 60).await;
    let course_id = h.course(tutor_id, "in_person").await;
    let date = (Utc::now().date_naive() + Duration::days(3)).to_string();

    let mismatch = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student.clone())
        .json(&json!({ "course": course_id, "fecha_propuesta": date, "modalidad": "remote" }))
        .await;
    assert_eq!(mismatch.status_code(), StatusCode::BAD_REQUEST);

    let body = json!({ "course": course_id, "fecha_propuesta": date, "modalidad": "in_person" });
    let first = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student.clone())
        .json(&body)
        .await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    let request_id = data(&first)["request_id"].as_str().unwrap().to_string();

    let rejected = h
        .server
        .post(&format!("/booking-requests/{}/reject", request_id))
        .add_header(AUTHORIZATION, tutor)
        .await;
    assert_eq!(rejected.status_code(), StatusCode::OK);
    assert!(data(&rejected).get("tutoria_id").is_none());

    let cancel_after_reject = h
        .server
        .post(&format!("/booking-requests/{}/cancel", request_id))
        .add_header(AUTHORIZATION, student.clone())
        .await;
    assert_eq!(cancel_after_reject.status_code(), StatusCode::BAD_REQUEST);

    let third = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student)
        .json(&body)
        .await;
    assert_eq!(third.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_messages_move_unread_counters() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, tutor) = h.user(UserRole::Tutor, 60).await;
    let (_, student) = h.user(UserRole::Student, 60).await;

    let conversation = h
        .server
        .post("/conversations")
        .add_header(AUTHORIZATION, student.clone())
        .json(&json!({ "tutor_id": tutor_id }))
        .await;
    assert_eq!(conversation.status_code(), StatusCode::CREATED);
    let conversation_id = data(&conversation)["conversation_id"].as_str().unwrap().to_string();

    for text in ["Hola", "¿Tienes hueco el martes?"] {
        let posted = h
            .server
            .post("/messages")
            .add_header(AUTHORIZATION, student.clone())
            .json(&json!({ "conversation": conversation_id, "content": text }))
            .await;
        assert_eq!(posted.status_code(), StatusCode::CREATED);
    }

    let current = data(
        &h.server
            .get(&format!("/conversations/{}", conversation_id))
            .add_header(AUTHORIZATION, tutor.clone())
            .await,
    );
    assert_eq!(current["unread_tutor"], 2);
    assert_eq!(current["unread_student"], 0);

    let summary = data(
        &h.server
            .get("/conversations/summary")
            .add_header(AUTHORIZATION, tutor.clone())
            .await,
    );
    let entry = summary
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["conversation_id"] == conversation_id.as_str())
        .unwrap()
        .clone();
    assert_eq!(entry["unread"], 2);
    assert_eq!(entry["last_message"], "¿Tienes hueco el martes?");

    let last_activity = h.conversation_updated_at(&conversation_id).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let read = data(
        &h.server
            .post(&format!("/conversations/{}/mark-read", conversation_id))
            .add_header(AUTHORIZATION, tutor.clone())
            .await,
    );
    assert_eq!(read["unread_tutor"], 0);
    assert_eq!(read["unread_student"], 0);
    assert_eq!(h.conversation_updated_at(&conversation_id).await, last_activity);

    let by_student = h
        .server
        .post(&format!("/conversations/{}/accept", conversation_id))
        .add_header(AUTHORIZATION, student)
        .await;
    assert_eq!(by_student.status_code(), StatusCode::FORBIDDEN);

    let by_tutor = h
        .server
        .post(&format!("/conversations/{}/accept", conversation_id))
        .add_header(AUTHORIZATION, tutor)
        .await;
    assert_eq!(data(&by_tutor)["state"], "accepted");
}

#[tokio::test]
async fn test_overlapping_availability_is_refused() {
    let Some(h) = Harness::start().await else { return };
    let (_, tutor) = h.user(UserRole::Tutor, 60).await;

    let first = h
        .server
        .post("/availability")
        .add_header(AUTHORIZATION, tutor.clone())
        .json(&json!({ "day_of_week": 2, "start_time": "09:00:00", "end_time": "11:00:00" }))
        .await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    let first_id = data(&first)["availability_id"].as_str().unwrap().to_string();

    let overlapping = h
        .server
        .post("/availability")
        .add_header(AUTHORIZATION, tutor.clone())
        .json(&json!({ "day_of_week": 2, "start_time": "10:00:00", "end_time": "12:00:00" }))
        .await;
    assert_eq!(overlapping.status_code(), StatusCode::BAD_REQUEST);

    let other_day = h
        .server
        .post("/availability")
        .add_header(AUTHORIZATION, tutor.clone())
        .json(&json!({ "day_of_week": 3, "start_time": "10:00:00", "end_time": "12:00:00" }))
        .await;
    assert_eq!(other_day.status_code(), StatusCode::CREATED);

    let moved = h
        .server
        .put(&format!("/availability/{}", first_id))
        .add_header(AUTHORIZATION, tutor)
        .json(&json!({ "end_time": "10:30:00" }))
        .await;
    assert_eq!(moved.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_conversation_sides_must_have_matching_roles() {
    let Some(h) = Harness::start().await else { return };
    let (other_student_id, _) = h.user(UserRole::Student, 60).await;
    let (_, student) = h.user(UserRole::Student, 60).await;

    let response = h
        .server
        .post("/conversations")
        .add_header(AUTHORIZATION, student)
        .json(&json!({ "tutor_id": other_student_id }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE tutor_id = $1")
        .bind(other_student_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_concurrent_accepts_create_one_session() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, _) = h.user(UserRole::Tutor, 60).await;
    let (_, student) = h.user(UserRole::Student, 60).await;
    let course_id = h.course(tutor_id, "remote").await;
    let date = (Utc::now().date_naive() + Duration::days(5)).to_string();

    let created = h
        .server
        .post("/booking-requests")
        .add_header(AUTHORIZATION, student)
        .json(&json!({ "course": course_id, "fecha_propuesta": date, "modalidad": "remote" }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let request_id = Uuid::parse_str(data(&created)["request_id"].as_str().unwrap()).unwrap();

    let first = BookingRequestService::new(&h.state);
    let second = BookingRequestService::new(&h.state);
    let (a, b) = tokio::join!(
        first.accept(tutor_id, request_id),
        second.accept(tutor_id, request_id)
    );

    let accepted = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(accepted, 1);
    let refused = if a.is_err() { a } else { b };
    assert!(matches!(refused, Err(AppError::InvalidState(_))));

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(sessions, 1);
}

#[tokio::test]
async fn test_concurrent_overlapping_windows_admit_one() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, _) = h.user(UserRole::Tutor, 60).await;

    let window = |start: u32, end: u32| CreateWeeklyAvailabilityRequest {
        day_of_week: 4,
        start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        is_active: true,
    };

    let first = AvailabilityService::new(&h.state);
    let second = AvailabilityService::new(&h.state);
    let (a, b) = tokio::join!(
        first.create_weekly(tutor_id, window(9, 11)),
        second.create_weekly(tutor_id, window(10, 12))
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let refused = if a.is_err() { a } else { b };
    assert!(matches!(refused, Err(AppError::Validation(_))));

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM weekly_availability WHERE user_id = $1")
            .bind(tutor_id)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_concurrent_reviews_keep_average_current() {
    let Some(h) = Harness::start().await else { return };

    for _ in 0..10 {
        let (tutor_id, _) = h.user(UserRole::Tutor, 60).await;
        let (first_student, _) = h.user(UserRole::Student, 60).await;
        let (second_student, _) = h.user(UserRole::Student, 60).await;
        let course_id = h.course(tutor_id, "remote").await;
        let first_booking = h.past_booking(course_id, first_student).await;
        let second_booking = h.past_booking(course_id, second_student).await;

        let first = ReviewService::new(&h.state);
        let second = ReviewService::new(&h.state);
        let (a, b) = tokio::join!(
            first.submit(
                first_student,
                CreateReviewRequest {
                    booking: first_booking,
                    comment: None,
                    score: Decimal::from(5),
                },
            ),
            second.submit(
                second_student,
                CreateReviewRequest {
                    booking: second_booking,
                    comment: Some("Bien".to_string()),
                    score: Decimal::from(1),
                },
            )
        );
        a.expect("first review");
        b.expect("second review");

        let average: Option<Decimal> =
            sqlx::query_scalar("SELECT average_rating FROM users WHERE user_id = $1")
                .bind(tutor_id)
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert_eq!(average, Some(Decimal::from(3)));
    }
}

#[tokio::test]
async fn test_concurrent_messages_count_every_post() {
    let Some(h) = Harness::start().await else { return };
    let (tutor_id, _) = h.user(UserRole::Tutor, 60).await;
    let (student_id, student) = h.user(UserRole::Student, 60).await;

    let created = h
        .server
        .post("/conversations")
        .add_header(AUTHORIZATION, student)
        .json(&json!({ "tutor_id": tutor_id }))
        .await;
    let conversation = Uuid::parse_str(data(&created)["conversation_id"].as_str().unwrap()).unwrap();

    let post = |content: &str| PostMessageRequest {
        conversation,
        content: content.to_string(),
    };
    let first = MessagingService::new(&h.state);
    let second = MessagingService::new(&h.state);
    let (a, b) = tokio::join!(
        first.post_message(student_id, post("¿Mañana a las 10?")),
        second.post_message(student_id, post("O el jueves"))
    );
    a.expect("first message");
    b.expect("second message");

    let unread: i32 =
        sqlx::query_scalar("SELECT unread_tutor FROM conversations WHERE conversation_id = $1")
            .bind(conversation)
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(unread, 2);
}

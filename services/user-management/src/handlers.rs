use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;
use validator::Validate;

use tutorlink_auth::AuthenticatedUser;
use tutorlink_common::{ApiResponse, AppError, Page};
use tutorlink_database::{Category, Course};

use crate::models::*;
use crate::services::{AppState, CatalogService, UserService};

// Health check
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("User Management Service is healthy".to_string()))
}

// User Registration
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    request.validate()?;

    let user_service = UserService::new(&state);
    let response = user_service.register_user(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

// User Login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    request.validate()?;

    let user_service = UserService::new(&state);
    Ok(Json(ApiResponse::success(user_service.login_user(request).await?)))
}

// Get Current User Info
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserInfo>>, AppError> {
    let user_service = UserService::new(&state);
    Ok(Json(ApiResponse::success(user_service.get_user(user.user_id).await?)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, AppError> {
    request.validate()?;

    let user_service = UserService::new(&state);
    Ok(Json(ApiResponse::success(
        user_service.update_profile(user.user_id, request).await?,
    )))
}

pub async fn get_user_by_id(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserInfo>>, AppError> {
    let user_service = UserService::new(&state);
    Ok(Json(ApiResponse::success(user_service.get_user(user_id).await?)))
}

// Categories
pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<ApiResponse<Page<Category>>>, AppError> {
    let catalog = CatalogService::new(&state);
    Ok(Json(ApiResponse::success(catalog.list_categories(query).await?)))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), AppError> {
    request.validate()?;

    let catalog = CatalogService::new(&state);
    let category = catalog.create_category(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(category))))
}

// Courses
pub async fn list_courses(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<CourseQuery>,
) -> Result<Json<ApiResponse<Page<Course>>>, AppError> {
    let catalog = CatalogService::new(&state);
    Ok(Json(ApiResponse::success(catalog.list_courses(query).await?)))
}

pub async fn get_course(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Course>>, AppError> {
    let catalog = CatalogService::new(&state);
    Ok(Json(ApiResponse::success(catalog.get_course(course_id).await?)))
}

pub async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Course>>), AppError> {
    request.validate()?;

    let catalog = CatalogService::new(&state);
    let course = catalog.create_course(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(course))))
}

pub async fn update_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
    Json(request): Json<UpdateCourseRequest>,
) -> Result<Json<ApiResponse<Course>>, AppError> {
    request.validate()?;

    let catalog = CatalogService::new(&state);
    Ok(Json(ApiResponse::success(
        catalog.update_course(user.user_id, course_id, request).await?,
    )))
}

pub async fn delete_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let catalog = CatalogService::new(&state);
    catalog.delete_course(user.user_id, course_id).await?;
    Ok(Json(ApiResponse::success("Course deleted".to_string())))
}

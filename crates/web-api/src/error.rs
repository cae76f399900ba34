use application::{ApplicationError, RepositoryError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::DomainError;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::UserNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "user not found")
            }
            AppErr::Domain(DomainError::UsernameTaken) => ApiError::new(
                StatusCode::CONFLICT,
                "USERNAME_TAKEN",
                "username already registered",
            ),
            AppErr::Domain(DomainError::RoomNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND", "room not found")
            }
            AppErr::Domain(DomainError::DuplicateRoomName { name }) => ApiError::new(
                StatusCode::CONFLICT,
                "DUPLICATE_ROOM_NAME",
                format!("room name already in use: {}", name),
            ),
            AppErr::Domain(DomainError::NotRoomMember) => {
                ApiError::new(StatusCode::FORBIDDEN, "NOT_ROOM_MEMBER", "user not in room")
            }
            AppErr::Domain(DomainError::DirectRoomNotJoinable) => ApiError::new(
                StatusCode::FORBIDDEN,
                "DIRECT_ROOM_NOT_JOINABLE",
                "direct rooms cannot be joined",
            ),
            AppErr::Domain(DomainError::CounselorRequired) => ApiError::new(
                StatusCode::FORBIDDEN,
                "COUNSELOR_REQUIRED",
                "only counselors can start direct chats",
            ),
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict { message } => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
                }
                RepositoryError::Storage { message } => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    format!("database error: {}", message),
                ),
            },
            AppErr::Registry(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "REGISTRY_ERROR",
                format!("connection registry error: {}", err),
            ),
            AppErr::Notify(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "NOTIFY_ERROR",
                format!("event delivery error: {}", err),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

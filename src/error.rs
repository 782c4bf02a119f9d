//! Unified error handling for the reservation backend
//!
//! Every failure surfaced over HTTP is an `AppError`, which knows its status
//! code, a stable error code and a message safe to show to users.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::services::reservation::ReservationError;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Domain errors (4xx)
    SeatUnavailable,
    BookingNotFound,
    ShowNotFound,
    RoomNotFound,
    Unauthenticated,

    // Infrastructure errors (5xx)
    DatabaseError,

    // External errors (502)
    PaymentInitiationFailed,

    ValidationError,
}

#[derive(Debug, Clone)]
pub enum DomainError {
    /// One or more requested seats are pending or confirmed
    SeatUnavailable { seats: Vec<String> },
    BookingNotFound { booking_id: String },
    ShowNotFound { show_id: String },
    RoomNotFound { room_id: String },
    /// Request carried no caller identity
    Unauthenticated,
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
}

#[derive(Debug, Clone)]
pub enum ExternalError {
    /// The gateway refused or never answered the order; the seats were released
    PaymentInitiation { reason: String },
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    InvalidRequest { message: String },
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::SeatUnavailable { .. } => 409,
                DomainError::BookingNotFound { .. } => 404,
                DomainError::ShowNotFound { .. } => 404,
                DomainError::RoomNotFound { .. } => 404,
                DomainError::Unauthenticated => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(ExternalError::PaymentInitiation { .. }) => 502,
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::SeatUnavailable { .. } => ErrorCode::SeatUnavailable,
                DomainError::BookingNotFound { .. } => ErrorCode::BookingNotFound,
                DomainError::ShowNotFound { .. } => ErrorCode::ShowNotFound,
                DomainError::RoomNotFound { .. } => ErrorCode::RoomNotFound,
                DomainError::Unauthenticated => ErrorCode::Unauthenticated,
            },
            AppErrorKind::Infrastructure(InfrastructureError::Database { .. }) => {
                ErrorCode::DatabaseError
            }
            AppErrorKind::External(ExternalError::PaymentInitiation { .. }) => {
                ErrorCode::PaymentInitiationFailed
            }
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::SeatUnavailable { seats } => {
                    format!("Seats already taken: {}", seats.join(", "))
                }
                DomainError::BookingNotFound { booking_id } => {
                    format!("Booking '{}' not found", booking_id)
                }
                DomainError::ShowNotFound { show_id } => format!("Show '{}' not found", show_id),
                DomainError::RoomNotFound { room_id } => format!("Room '{}' not found", room_id),
                DomainError::Unauthenticated => "Authentication required".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(ExternalError::PaymentInitiation { .. }) => {
                "Could not start the payment. Your seats were released, please try again"
                    .to_string()
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::InvalidRequest { message } => message.clone(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::PaymentInitiation { .. }) => true,
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = match &err.kind {
            DatabaseErrorKind::NotFound { entity, id } if entity == "booking" => {
                AppErrorKind::Domain(DomainError::BookingNotFound {
                    booking_id: id.clone(),
                })
            }
            _ => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };
        AppError::new(kind)
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let kind = match err {
            ReservationError::SeatUnavailable { seats } => {
                AppErrorKind::Domain(DomainError::SeatUnavailable { seats })
            }
            ReservationError::PaymentInitiationFailed { reason } => {
                AppErrorKind::External(ExternalError::PaymentInitiation { reason })
            }
            ReservationError::NotFound { entity, id } => match entity {
                "show" => AppErrorKind::Domain(DomainError::ShowNotFound { show_id: id }),
                "room" => AppErrorKind::Domain(DomainError::RoomNotFound { room_id: id }),
                _ => AppErrorKind::Domain(DomainError::BookingNotFound { booking_id: id }),
            },
            ReservationError::InvalidRequest { message } => {
                AppErrorKind::Validation(ValidationError::InvalidRequest { message })
            }
            ReservationError::Storage(e) => return AppError::from(e),
        };
        AppError::new(kind)
    }
}

pub type AppResult<T> = Result<T, AppError>;

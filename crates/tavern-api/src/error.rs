use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use thiserror::Error;
use tracing::error;

use crate::flash::{self, Level};

/// Failures a handler can end with. Every variant collapses to a short
/// user-facing message; details only go to the log.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Login required for {next}")]
    LoginRequired { next: String },

    /// Flash the message and send the user back to the board.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// A well-formed request the current state doesn't allow.
    #[error("Rejected: {message}")]
    Rejected {
        message: &'static str,
        redirect: String,
    },

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::LoginRequired { next } => {
                let target = if next == "/" {
                    "/login".to_string()
                } else {
                    format!("/login?next={}", next)
                };
                Redirect::to(&target).into_response()
            }
            AppError::Forbidden(message) => {
                let jar = flash::push(CookieJar::new(), Level::Error, message);
                (jar, Redirect::to("/")).into_response()
            }
            AppError::Rejected { message, redirect } => {
                let jar = flash::push(CookieJar::new(), Level::Error, message);
                (jar, Redirect::to(&redirect)).into_response()
            }
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Html("<h1>404</h1><p>Nie znaleziono strony.</p><p><a href=\"/\">Wróć</a></p>"),
            )
                .into_response(),
            AppError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>500</h1><p>Coś poszło nie tak.</p><p><a href=\"/\">Wróć</a></p>"),
                )
                    .into_response()
            }
        }
    }
}

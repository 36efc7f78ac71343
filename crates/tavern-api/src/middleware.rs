use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::AppState;
use crate::error::AppError;
use crate::session;

/// Validate the session cookie and expose its claims to the handler as an
/// `Extension<Claims>`. Anonymous requests are sent to the login form.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(claims) = session::current(&jar, &state.session) else {
        return Err(AppError::LoginRequired {
            next: req.uri().path().to_string(),
        });
    };

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

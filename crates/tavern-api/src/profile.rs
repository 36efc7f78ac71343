use axum::{
    Extension,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use tavern_types::api::Claims;
use tavern_types::models::{Game, Profile};

use crate::auth::{AppState, blocking};
use crate::error::AppError;
use crate::flash;
use crate::games::into_games;
use crate::session;
use crate::views::Page;

struct ProfileView {
    profile: Profile,
    hosted: Vec<Game>,
    joined: Vec<Game>,
    pending: Vec<Game>,
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let user_id = claims.sub;
    let view = blocking(&state, move |state| {
        let Some(user) = state.db.get_user_by_id(user_id)? else {
            return Ok(None);
        };
        let roles = state.db.get_roles(user_id)?;
        Ok(Some(ProfileView {
            profile: user.into_profile(roles),
            hosted: into_games(state.db.games_by_gm(user_id)?),
            joined: into_games(state.db.games_joined(user_id)?),
            pending: into_games(state.db.games_pending(user_id)?),
        }))
    })
    .await?;

    // A valid token for a user that no longer exists.
    let Some(view) = view else {
        warn!(user_id, "Session refers to a missing user");
        return Ok((session::end(jar), Redirect::to("/login")).into_response());
    };

    let (jar, flash) = flash::take(jar);
    let page = Page::new(Some(&claims), flash)
        .with("profile", &view.profile)
        .with("hosted", &view.hosted)
        .with("joined", &view.joined)
        .with("pending", &view.pending);
    Ok((jar, state.views.render("profile.html", page)?).into_response())
}

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{Form, cookie::CookieJar};
use tracing::info;

use tavern_types::api::{Claims, PreferencesForm};
use tavern_types::models::Roles;

use crate::auth::{AppState, blocking};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::session;
use crate::views::Page;

pub async fn preferences_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let user_id = claims.sub;
    let roles = blocking(&state, move |state| state.db.get_roles(user_id)).await?;

    let (jar, flash) = flash::take(jar);
    let page = Page::new(Some(&claims), flash).with("roles", &roles);
    Ok((jar, state.views.render("preferences.html", page)?).into_response())
}

/// `roles` arrives as a repeated field (`roles=player&roles=gm`), hence the
/// axum-extra form extractor.
pub async fn submit_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    Form(form): Form<PreferencesForm>,
) -> Result<Response, AppError> {
    let selected = Roles::from_names(&form.roles);
    if selected.is_empty() {
        let page = Page::new(Some(&claims), None).with("roles", &claims.roles());
        return state.views.reject("preferences.html", page, StatusCode::BAD_REQUEST, "Brak preferencji");
    }

    let user_id = claims.sub;
    let roles = blocking(&state, move |state| state.db.set_preferences(user_id, selected)).await?;
    info!(user_id, ?roles, "Preferences saved");

    // Re-issue the session so the navigation reflects the new roles.
    let jar = session::start(jar, &state.session, user_id, &claims.name, roles)?;
    let jar = flash::push(jar, Level::Success, "Wypełniono ankietę");
    Ok((jar, Redirect::to("/")).into_response())
}

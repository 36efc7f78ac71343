use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error, info};

use tavern_db::Database;
use tavern_db::models::{CreateUserOutcome, LoginColumn};
use tavern_types::api::{LoginForm, LoginQuery, RegisterForm};

use crate::error::AppError;
use crate::flash::{self, Level};
use crate::session::{self, SessionConfig};
use crate::views::{Page, Views};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub session: SessionConfig,
    pub views: Views,
}

/// Run database (and password hashing) work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&AppStateInner) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(AppError::Internal)
}

struct NewAccount {
    username: String,
    email: String,
    password: String,
}

fn validate_registration(form: RegisterForm) -> Result<NewAccount, &'static str> {
    let username = form.username.trim();
    if username.is_empty() {
        return Err("Brak nazwy użytkownika");
    }
    let email = form.email.trim().to_lowercase();
    if email.is_empty() {
        return Err("Brak maila");
    }
    if form.password.is_empty() {
        return Err("Brak hasła");
    }
    if form.confirmation.is_empty() {
        return Err("Brak potwierdzenia hasła");
    }
    if form.password != form.confirmation {
        return Err("Hasła nie są zgodne");
    }

    // Login picks the lookup column by '@', so names must never carry one.
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) || username.contains('@') {
        return Err("Nazwa użytkownika musi mieć od 3 do 32 znaków i nie może zawierać znaku @");
    }
    if !email.contains('@') || email.chars().count() > 120 {
        return Err("Niepoprawny adres e-mail");
    }
    if form.password.chars().count() < 8 {
        return Err("Hasło musi mieć co najmniej 8 znaków");
    }

    Ok(NewAccount {
        username: username.to_string(),
        email,
        password: form.password,
    })
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Malformed password hash in database: {}", e);
            false
        }
    }
}

/// Only same-site paths are honoured as post-login targets. Browsers drop
/// tabs and newlines from URLs, so any control or whitespace character could
/// turn `/\t/host` into `//host`.
fn local_redirect(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(|c| c.is_control() || c.is_whitespace()) =>
        {
            path
        }
        _ => "/",
    }
}

pub async fn register_page(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let user = session::current(&jar, &state.session);
    let (jar, flash) = flash::take(jar);
    let page = Page::new(user.as_ref(), flash);
    Ok((jar, state.views.render("register.html", page)?).into_response())
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let user = session::current(&jar, &state.session);

    let account = match validate_registration(form) {
        Ok(account) => account,
        Err(message) => {
            let page = Page::new(user.as_ref(), None);
            return state.views.reject("register.html", page, StatusCode::BAD_REQUEST, message);
        }
    };

    let outcome = blocking(&state, move |state| {
        let hash = hash_password(&account.password)?;
        state.db.create_user(&account.username, &account.email, &hash)
    })
    .await?;

    match outcome {
        CreateUserOutcome::Created(_) => {
            let jar = flash::push(jar, Level::Success, "Dodano użytkownika");
            Ok((jar, Redirect::to("/login")).into_response())
        }
        CreateUserOutcome::Duplicate => {
            let page = Page::new(user.as_ref(), None);
            state.views.reject("register.html", page, StatusCode::CONFLICT, "Użytkownik już istnieje")
        }
    }
}

/// Showing the login form drops whatever session was active.
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AppError> {
    let jar = session::end(jar);
    let (jar, flash) = flash::take(jar);
    let page = Page::new(None, flash).with("next", &query.next);
    Ok((jar, state.views.render("login.html", page)?).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let jar = session::end(jar);
    let next = form.next;
    let page = Page::new(None, None).with("next", &next);

    let identifier = form.user.trim().to_string();
    if identifier.is_empty() {
        return state.views.reject("login.html", page, StatusCode::BAD_REQUEST, "Brak nazwy użytkownika lub maila");
    }
    if form.password.is_empty() {
        return state.views.reject("login.html", page, StatusCode::BAD_REQUEST, "Brak hasła");
    }

    let column = LoginColumn::for_identifier(&identifier);
    let lookup = match column {
        LoginColumn::Email => identifier.to_lowercase(),
        LoginColumn::Name => identifier,
    };
    let password = form.password;

    let found = blocking(&state, move |state| {
        let Some(user) = state.db.get_user_by_login(column, &lookup)? else {
            return Ok(None);
        };
        if !verify_password(&password, &user.hash) {
            return Ok(None);
        }
        state.db.update_last_login(user.id)?;
        let roles = state.db.get_roles(user.id)?;
        Ok(Some((user, roles)))
    })
    .await?;

    // Unknown identifier and wrong password look the same from outside.
    let Some((user, roles)) = found else {
        debug!(?column, "Failed login attempt");
        return state.views.reject("login.html", page, StatusCode::UNAUTHORIZED, "Niepoprawne dane");
    };

    let jar = session::start(jar, &state.session, user.id, &user.name, roles)?;
    let jar = flash::push(jar, Level::Success, "Zalogowano");
    info!(user_id = user.id, "User logged in");

    let target = if user.filled_preferences {
        local_redirect(next.as_deref()).to_string()
    } else {
        "/preferences".to_string()
    };
    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (session::end(jar), Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, email: &str, password: &str, confirmation: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            confirmation: confirmation.into(),
        }
    }

    #[test]
    fn registration_requires_every_field() {
        let cases = [
            (form("", "a@b.pl", "sekret123", "sekret123"), "Brak nazwy użytkownika"),
            (form("samwise", " ", "sekret123", "sekret123"), "Brak maila"),
            (form("samwise", "a@b.pl", "", "sekret123"), "Brak hasła"),
            (form("samwise", "a@b.pl", "sekret123", ""), "Brak potwierdzenia hasła"),
            (form("samwise", "a@b.pl", "sekret123", "sekret124"), "Hasła nie są zgodne"),
        ];
        for (form, expected) in cases {
            assert_eq!(validate_registration(form).err(), Some(expected));
        }
    }

    #[test]
    fn registration_rejects_names_with_at_sign() {
        let err = validate_registration(form("sam@shire", "s@b.pl", "sekret123", "sekret123")).err();
        assert!(err.is_some());
    }

    #[test]
    fn registration_normalizes_email() {
        let account = validate_registration(form(" samwise ", " Sam@Shire.PL ", "sekret123", "sekret123")).unwrap();
        assert_eq!(account.username, "samwise");
        assert_eq!(account.email, "sam@shire.pl");
    }

    #[test]
    fn short_password_rejected() {
        let err = validate_registration(form("samwise", "s@b.pl", "krótkie", "krótkie")).err();
        assert_eq!(err, Some("Hasło musi mieć co najmniej 8 znaków"));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn only_local_redirects() {
        assert_eq!(local_redirect(Some("/profile")), "/profile");
        assert_eq!(local_redirect(Some("//evil.example")), "/");
        assert_eq!(local_redirect(Some("https://evil.example")), "/");
        assert_eq!(local_redirect(None), "/");
    }

    #[test]
    fn redirect_rejects_control_and_whitespace() {
        assert_eq!(local_redirect(Some("/\t/evil.example")), "/");
        assert_eq!(local_redirect(Some("/profile\n")), "/");
        assert_eq!(local_redirect(Some("/ /evil.example")), "/");
        assert_eq!(local_redirect(Some("/game_chat/3?x=1")), "/game_chat/3?x=1");
    }
}

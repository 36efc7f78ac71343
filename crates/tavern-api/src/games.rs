use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use tavern_db::models::{CreateGameOutcome, GameRow, NewGame};
use tavern_types::api::{Claims, ErrorResponse, PostGameForm};
use tavern_types::models::{Game, GameSystem};

use crate::auth::{AppState, blocking};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::session;
use crate::views::Page;

const MAX_PLAYERS: i64 = 100;

pub(crate) fn into_games(rows: Vec<GameRow>) -> Vec<Game> {
    rows.into_iter().map(Game::from).collect()
}

fn validate_game(form: PostGameForm, gm_id: i64) -> Result<NewGame, &'static str> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err("Brak tytułu");
    }
    if title.chars().count() > 120 {
        return Err("Tytuł może mieć najwyżej 120 znaków");
    }

    let system = form.system.trim();
    if system.is_empty() {
        return Err("Brak systemu");
    }
    let system_id: i64 = system.parse().map_err(|_| "Nieznany system")?;

    let players = form.players.trim();
    if players.is_empty() {
        return Err("Brak liczby graczy");
    }
    let max_players = match players.parse::<i64>() {
        Ok(n) if (1..=MAX_PLAYERS).contains(&n) => n,
        _ => return Err("Liczba graczy musi być od 1 do 100"),
    };

    let description = form
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(NewGame {
        title: title.to_string(),
        system_id,
        max_players,
        description,
        gm_id,
    })
}

pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let user = session::current(&jar, &state.session);
    let user_id = user.as_ref().map(|claims| claims.sub);
    let (games, involved) = blocking(&state, move |state| {
        let games = into_games(state.db.list_games()?);
        // Games the user already waits on or plays in get a chat link.
        let mut involved = Vec::new();
        if let Some(user_id) = user_id {
            for row in state.db.games_joined(user_id)?.into_iter().chain(state.db.games_pending(user_id)?) {
                involved.push(row.id);
            }
        }
        Ok((games, involved))
    })
    .await?;

    let (jar, flash) = flash::take(jar);
    let page = Page::new(user.as_ref(), flash)
        .with("games", &games)
        .with("involved", &involved);
    Ok((jar, state.views.render("index.html", page)?).into_response())
}

/// JSON details for the game modal on the board.
pub async fn game_data(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> Result<Response, AppError> {
    let game = blocking(&state, move |state| state.db.get_game(game_id)).await?;

    Ok(match game {
        Some(row) => Json(Game::from(row)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Nie znaleziono gry".into(),
            }),
        )
            .into_response(),
    })
}

/// The role tables, not the session flag, decide who is a GM.
async fn gm_systems(state: &AppState, user_id: i64) -> Result<Vec<GameSystem>, AppError> {
    let (is_gm, systems) = blocking(state, move |state| {
        let is_gm = state.db.get_roles(user_id)?.is_gm();
        let systems = state.db.get_systems()?.into_iter().map(GameSystem::from).collect::<Vec<_>>();
        Ok((is_gm, systems))
    })
    .await?;

    if !is_gm {
        return Err(AppError::Forbidden("Tylko MG może dodawać gry"));
    }
    Ok(systems)
}

pub async fn post_game_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let systems = gm_systems(&state, claims.sub).await?;

    let (jar, flash) = flash::take(jar);
    let page = Page::new(Some(&claims), flash).with("systems", &systems);
    Ok((jar, state.views.render("post_game.html", page)?).into_response())
}

pub async fn post_game(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    Form(form): Form<PostGameForm>,
) -> Result<Response, AppError> {
    let systems = gm_systems(&state, claims.sub).await?;
    let page = Page::new(Some(&claims), None).with("systems", &systems);

    let game = match validate_game(form, claims.sub) {
        Ok(game) => game,
        Err(message) => {
            return state.views.reject("post_game.html", page, StatusCode::BAD_REQUEST, message);
        }
    };

    match blocking(&state, move |state| state.db.create_game(&game)).await? {
        CreateGameOutcome::Created(_) => {
            let jar = flash::push(jar, Level::Success, "Dodano grę");
            Ok((jar, Redirect::to("/")).into_response())
        }
        CreateGameOutcome::UnknownSystem => {
            state.views.reject("post_game.html", page, StatusCode::BAD_REQUEST, "Nieznany system")
        }
    }
}

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use tavern_db::models::{AcceptOutcome, ApplyOutcome, PostMessageOutcome, RejectOutcome};
use tavern_types::api::{ApplyForm, ChatMessageForm, Claims};
use tavern_types::models::{ChatMessage, Game, Participant, Participation};

use crate::auth::{AppState, blocking};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::views::Page;

const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_APPLICATION: &str = "Chcę dołączyć do gry!";

struct ChatView {
    game: Game,
    participation: Participation,
    messages: Vec<ChatMessage>,
    members: Vec<Participant>,
    waiting: Vec<Participant>,
}

enum ChatLookup {
    Missing,
    Closed,
    Open(ChatView),
}

fn chat_path(game_id: i64) -> String {
    format!("/game_chat/{}", game_id)
}

fn clean_message(raw: &str) -> Result<String, &'static str> {
    let message = raw.trim();
    if message.is_empty() {
        return Err("Pusta wiadomość");
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err("Wiadomość jest za długa");
    }
    Ok(message.to_string())
}

pub async fn apply_for_game(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(game_id): Path<i64>,
    Form(form): Form<ApplyForm>,
) -> Result<Response, AppError> {
    let message = match form.message.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_APPLICATION.to_string(),
        Some(text) => clean_message(text).map_err(|message| AppError::Rejected {
            message,
            redirect: "/".into(),
        })?,
    };

    let user_id = claims.sub;
    let outcome = blocking(&state, move |state| state.db.apply_for_game(game_id, user_id, &message)).await?;

    let refusal = match outcome {
        ApplyOutcome::Applied { .. } => {
            let jar = flash::push(CookieJar::new(), Level::Success, "Zgłoszenie wysłane");
            return Ok((jar, Redirect::to(&chat_path(game_id))).into_response());
        }
        ApplyOutcome::GameNotFound => return Err(AppError::NotFound),
        ApplyOutcome::OwnGame => "Nie możesz zgłosić się do własnej gry",
        ApplyOutcome::NotPlayer => "Tylko gracze mogą zgłaszać się do gier",
        ApplyOutcome::AlreadyApplied => "Już zgłoszono się do tej gry",
    };

    warn!(game_id, user_id, ?outcome, "Application refused");
    Err(AppError::Rejected {
        message: refusal,
        redirect: "/".into(),
    })
}

pub async fn game_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    Path(game_id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = claims.sub;
    let lookup = blocking(&state, move |state| {
        let Some(game) = state.db.get_game(game_id)? else {
            return Ok(ChatLookup::Missing);
        };
        let participation = state
            .db
            .participation(game_id, user_id)?
            .unwrap_or(Participation::Outsider);
        if !participation.can_chat() {
            return Ok(ChatLookup::Closed);
        }

        Ok(ChatLookup::Open(ChatView {
            game: game.into(),
            participation,
            messages: state.db.get_chat_messages(game_id)?.into_iter().map(ChatMessage::from).collect(),
            members: state.db.members(game_id)?.into_iter().map(Participant::from).collect(),
            waiting: state.db.waiting_list(game_id)?.into_iter().map(Participant::from).collect(),
        }))
    })
    .await?;

    let view = match lookup {
        ChatLookup::Open(view) => view,
        ChatLookup::Missing => return Err(AppError::NotFound),
        ChatLookup::Closed => return Err(AppError::Forbidden("Brak dostępu do czatu")),
    };

    let (jar, flash) = flash::take(jar);
    let page = Page::new(Some(&claims), flash)
        .with("game", &view.game)
        .with("participation", &view.participation)
        .with("messages", &view.messages)
        .with("members", &view.members)
        .with("waiting", &view.waiting);
    Ok((jar, state.views.render("game_chat.html", page)?).into_response())
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(game_id): Path<i64>,
    Form(form): Form<ChatMessageForm>,
) -> Result<Response, AppError> {
    let message = clean_message(&form.message).map_err(|message| AppError::Rejected {
        message,
        redirect: chat_path(game_id),
    })?;

    let user_id = claims.sub;
    match blocking(&state, move |state| state.db.post_message(game_id, user_id, &message)).await? {
        PostMessageOutcome::Posted => Ok(Redirect::to(&chat_path(game_id)).into_response()),
        PostMessageOutcome::GameNotFound => Err(AppError::NotFound),
        PostMessageOutcome::NotAllowed => Err(AppError::Forbidden("Brak dostępu do czatu")),
    }
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((game_id, applicant_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let gm_id = claims.sub;
    let outcome = blocking(&state, move |state| state.db.accept_applicant(game_id, gm_id, applicant_id)).await?;

    let refusal = match outcome {
        AcceptOutcome::Accepted => {
            let jar = flash::push(CookieJar::new(), Level::Success, "Przyjęto gracza");
            return Ok((jar, Redirect::to(&chat_path(game_id))).into_response());
        }
        AcceptOutcome::GameNotFound => return Err(AppError::NotFound),
        AcceptOutcome::NotGm => return Err(AppError::Forbidden("Tylko MG tej gry decyduje o zgłoszeniach")),
        AcceptOutcome::NotWaiting => "Brak zgłoszenia",
        AcceptOutcome::GameFull => "Brak wolnych miejsc",
    };

    Err(AppError::Rejected {
        message: refusal,
        redirect: chat_path(game_id),
    })
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((game_id, applicant_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let gm_id = claims.sub;
    let outcome = blocking(&state, move |state| state.db.reject_applicant(game_id, gm_id, applicant_id)).await?;

    match outcome {
        RejectOutcome::Rejected => {
            let jar = flash::push(CookieJar::new(), Level::Success, "Odrzucono zgłoszenie");
            Ok((jar, Redirect::to(&chat_path(game_id))).into_response())
        }
        RejectOutcome::GameNotFound => Err(AppError::NotFound),
        RejectOutcome::NotGm => Err(AppError::Forbidden("Tylko MG tej gry decyduje o zgłoszeniach")),
        RejectOutcome::NotWaiting => Err(AppError::Rejected {
            message: "Brak zgłoszenia",
            redirect: chat_path(game_id),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_trimmed_and_bounded() {
        assert_eq!(clean_message("  hej  ").unwrap(), "hej");
        assert_eq!(clean_message(" \n ").err(), Some("Pusta wiadomość"));
        assert_eq!(clean_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)).err(), Some("Wiadomość jest za długa"));
        assert!(clean_message(&"ż".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }
}

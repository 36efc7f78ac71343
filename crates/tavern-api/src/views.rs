use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use tera::{Context, Tera};

use tavern_types::api::Claims;

use crate::error::AppError;
use crate::flash::Flash;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("preferences.html", include_str!("../templates/preferences.html")),
    ("profile.html", include_str!("../templates/profile.html")),
    ("post_game.html", include_str!("../templates/post_game.html")),
    ("game_chat.html", include_str!("../templates/game_chat.html")),
];

/// Compiled HTML templates, built once at startup.
pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, page: Page) -> Result<Html<String>, AppError> {
        self.tera
            .render(template, &page.context)
            .map(Html)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context(format!("rendering {template}"))))
    }

    /// Re-render a form with the reason it was refused.
    pub fn reject(
        &self,
        template: &str,
        page: Page,
        status: StatusCode,
        message: &str,
    ) -> Result<Response, AppError> {
        Ok((status, self.render(template, page.error(message))?).into_response())
    }
}

/// Template context every page starts from: who is logged in and the
/// pending flash message.
pub struct Page {
    context: Context,
}

impl Page {
    pub fn new(user: Option<&Claims>, flash: Option<Flash>) -> Self {
        let mut context = Context::new();
        context.insert("user", &user);
        context.insert("flash", &flash);
        context.insert("error", &None::<String>);
        Self { context }
    }

    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn error(self, message: &str) -> Self {
        self.with("error", message)
    }
}

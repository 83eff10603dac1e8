//! The browser client page and the files it loads.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// `GET /`: the index page, verbatim.
pub async fn index(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let path = PathBuf::from(&state.config.assets.index_page);
    let body = read_asset(&path).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

/// `GET /static/{file}`
pub async fn static_asset(state: web::Data<AppState>, file: web::Path<String>) -> AppResult<HttpResponse> {
    let path = resolve_static(Path::new(&state.config.assets.static_dir), &file)?;
    let body = read_asset(&path).await?;
    Ok(HttpResponse::Ok().content_type(content_type(&path)).body(body))
}

/// Joins `name` onto `dir`, refusing anything that could leave `dir`.
fn resolve_static(dir: &Path, name: &str) -> AppResult<PathBuf> {
    let requested = Path::new(name);
    let plain = !name.is_empty()
        && requested
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !plain {
        return Err(AppError::BadRequest(format!("invalid asset path: {}", name)));
    }
    Ok(dir.join(requested))
}

async fn read_asset(path: &Path) -> AppResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|err| match err.kind() {
        ErrorKind::NotFound => AppError::NotFound(path.display().to_string()),
        _ => {
            warn!(path = %path.display(), "Failed to read asset: {}", err);
            AppError::Internal(format!("failed to read {}", path.display()))
        }
    })
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

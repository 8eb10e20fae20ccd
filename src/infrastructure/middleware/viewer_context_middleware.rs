// ViewerContext Middleware - resolves the caller from the Authorization
// header and injects the ViewerContext into request extensions

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::{database::EntityStore, viewer::ViewerContext};

/// Authentication information extracted from request headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInfo {
    Anonymous,
    /// `Bearer <username>`
    Bearer(String),
    /// `System <token>`
    System(String),
}

/// Application state the middleware needs to resolve viewers
pub trait HasViewerResolver {
    fn entity_store(&self) -> &Arc<dyn EntityStore>;
    fn admin_token(&self) -> Option<&str>;
}

pub async fn viewer_context_middleware<T>(
    State(app_state): State<T>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    T: HasViewerResolver + Clone + Send + Sync + 'static,
{
    let auth_info = extract_auth_from_request(request.headers())?;
    let viewer_context = create_viewer_context(auth_info, &app_state).await?;

    request.extensions_mut().insert(viewer_context);

    Ok(next.run(request).await)
}

pub fn extract_auth_from_request(headers: &HeaderMap) -> AppResult<AuthInfo> {
    let Some(auth_header) = headers.get("authorization") else {
        return Ok(AuthInfo::Anonymous);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::BadRequest("malformed Authorization header".to_string()))?;

    if let Some(username) = auth_str.strip_prefix("Bearer ") {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Unauthorized("empty bearer credential".to_string()));
        }
        return Ok(AuthInfo::Bearer(username.to_string()));
    }
    if let Some(token) = auth_str.strip_prefix("System ") {
        return Ok(AuthInfo::System(token.trim().to_string()));
    }

    debug!("Unrecognised Authorization scheme, treating as anonymous");
    Ok(AuthInfo::Anonymous)
}

async fn create_viewer_context<T: HasViewerResolver>(
    auth_info: AuthInfo,
    app_state: &T,
) -> AppResult<Arc<ViewerContext>> {
    let request_id = format!("req-{}", Uuid::new_v4());

    let viewer_context = match auth_info {
        AuthInfo::Anonymous => ViewerContext::anonymous(request_id),
        AuthInfo::Bearer(username) => {
            let user = app_state
                .entity_store()
                .get_user_by_username(&username)
                .await?
                .ok_or_else(|| AppError::Unauthorized(format!("unknown user {}", username)))?;
            ViewerContext::authenticated_user(user, request_id)
        }
        AuthInfo::System(token) => match app_state.admin_token() {
            Some(expected) if expected == token => ViewerContext::system(request_id),
            _ => {
                warn!("Rejected system credential");
                return Err(AppError::Unauthorized("invalid admin token".to_string()));
            }
        },
    };

    Ok(Arc::new(viewer_context))
}

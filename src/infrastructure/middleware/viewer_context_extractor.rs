// ViewerContext Extractor - handler-side access to the request's viewer

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use crate::error::AppError;
use crate::infrastructure::viewer::ViewerContext;

/// Cheap-to-clone handle on the request's `ViewerContext`.
#[derive(Debug, Clone)]
pub struct Vc(Arc<ViewerContext>);

impl Vc {
    pub fn new(vc: Arc<ViewerContext>) -> Self {
        Self(vc)
    }

    pub fn arc(self) -> Arc<ViewerContext> {
        self.0
    }
}

impl std::ops::Deref for Vc {
    type Target = ViewerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vc> for Arc<ViewerContext> {
    fn from(vc: Vc) -> Self {
        vc.0
    }
}

impl AsRef<ViewerContext> for Vc {
    fn as_ref(&self) -> &ViewerContext {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Vc
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let vc = parts
            .extensions
            .get::<Arc<ViewerContext>>()
            .map(|vc| Vc(vc.clone()))
            .ok_or_else(|| AppError::Internal("viewer context missing from request".to_string()));

        async move { vc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vc_deref() {
        let viewer_context = Arc::new(ViewerContext::system("test-request".to_string()));
        let vc = Vc::new(viewer_context);

        assert_eq!(vc.request_id, "test-request");
        assert!(vc.is_system());

        let vc_arc = vc.arc();
        assert_eq!(vc_arc.request_id, "test-request");
    }
}

// Viewer context - who is making the current request

use crate::error::{AppError, AppResult};
use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(User),
    /// Administrative caller authenticated by the configured token.
    System,
}

#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub viewer: Viewer,
    pub request_id: String,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        ViewerContext {
            viewer: Viewer::Anonymous,
            request_id,
        }
    }

    pub fn authenticated_user(user: User, request_id: String) -> Self {
        ViewerContext {
            viewer: Viewer::User(user),
            request_id,
        }
    }

    pub fn system(request_id: String) -> Self {
        ViewerContext {
            viewer: Viewer::System,
            request_id,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match &self.viewer {
            Viewer::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.viewer, Viewer::Anonymous)
    }

    pub fn is_system(&self) -> bool {
        matches!(self.viewer, Viewer::System)
    }

    /// Writes on behalf of a user need a signed-in user.
    pub fn require_user(&self) -> AppResult<&User> {
        self.user()
            .ok_or_else(|| AppError::Unauthorized("login required".to_string()))
    }

    pub fn require_system(&self) -> AppResult<()> {
        match self.viewer {
            Viewer::System => Ok(()),
            Viewer::Anonymous => Err(AppError::Unauthorized("admin token required".to_string())),
            Viewer::User(_) => Err(AppError::Forbidden("admin access required".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1,
            username: "auth".to_string(),
            display_name: String::new(),
        }
    }

    #[test]
    fn test_anonymous_cannot_write() {
        let vc = ViewerContext::anonymous("req-1".to_string());
        assert!(!vc.is_authenticated());
        assert!(matches!(vc.require_user(), Err(AppError::Unauthorized(_))));
        assert!(matches!(vc.require_system(), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_user_is_not_system() {
        let vc = ViewerContext::authenticated_user(user(), "req-2".to_string());
        assert_eq!(vc.user_id(), Some(1));
        assert!(vc.require_user().is_ok());
        assert!(matches!(vc.require_system(), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_system_has_no_user() {
        let vc = ViewerContext::system("req-3".to_string());
        assert!(vc.is_authenticated());
        assert!(vc.is_system());
        assert_eq!(vc.user_id(), None);
        assert!(vc.require_system().is_ok());
    }
}

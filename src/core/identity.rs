/// Who is making a request. Resolved once by the identity middleware and passed down explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    AuthenticatedUser(i32),
    AnonymousSession(String),
}

impl Identity {
    pub fn user_id(&self) -> Option<i32> {
        match self {
            Self::AuthenticatedUser(id) => Some(*id),
            Self::AnonymousSession(_) => None,
        }
    }

    pub fn session_key(&self) -> Option<&str> {
        match self {
            Self::AuthenticatedUser(_) => None,
            Self::AnonymousSession(key) => Some(key),
        }
    }

    /// Exact match against an owner column pair; a user never matches a session row or vice versa.
    pub fn owns(&self, user_id: Option<i32>, session_key: Option<&str>) -> bool {
        match self {
            Self::AuthenticatedUser(id) => user_id == Some(*id),
            Self::AnonymousSession(key) => session_key == Some(key.as_str()),
        }
    }
}

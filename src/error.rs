use crate::model::Collection;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("a student may have at most {limit} open tickets")]
    TicketLimit { limit: usize },

    #[error("a student with class {class_name} and initials {initials} already exists")]
    DuplicateStudent {
        class_name: String,
        initials: String,
    },

    #[error("ticket {id} is already done")]
    InvalidTransition { id: String },

    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: String },

    #[error("{0} login required")]
    NotLoggedIn(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("login failed")]
    LoginFailed,

    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    #[error("local store: {0}")]
    Local(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Stable code used in sidecar error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::TicketLimit { .. } => "ticket_limit",
            Self::DuplicateStudent { .. } => "duplicate_student",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound { .. } => "not_found",
            Self::NotLoggedIn(_) => "not_logged_in",
            Self::Forbidden(_) => "forbidden",
            Self::LoginFailed => "login_failed",
            Self::RemoteWrite(_) => "remote_write_failed",
            Self::Local(_) => "local_store_failed",
            Self::Json(_) => "serialize_failed",
        }
    }

    /// Whether the UI should raise a notification for this failure.
    pub fn notify(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::TicketLimit { .. }
                | Self::DuplicateStudent { .. }
                | Self::InvalidTransition { .. }
                | Self::LoginFailed
                | Self::RemoteWrite(_)
        )
    }
}

use thiserror::Error;

/// Caller-visible failure of a preview, fetch or push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },
    #[error("{}", missing_message(.title, .reason.as_deref()))]
    MissingPage {
        title: String,
        reason: Option<String>,
    },
    #[error("\"{title}\" is an interwiki link to \"{interwiki}\" and cannot be shown here")]
    Interwiki { title: String, interwiki: String },
    #[error("request to the wiki failed: {0}")]
    Transport(String),
    #[error("MediaWiki edit failed for {title}: {result}")]
    EditFailed { title: String, result: String },
}

impl PreviewError {
    /// Soft failures are reported as warnings and leave the surface alone.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::MissingPage { .. } | Self::Interwiki { .. })
    }

    pub fn transport(error: &anyhow::Error) -> Self {
        Self::Transport(format!("{error:#}"))
    }
}

fn missing_message(title: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("page \"{title}\" is invalid: {reason}"),
        None => format!("page \"{title}\" does not exist"),
    }
}

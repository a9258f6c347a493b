use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("course directory '{0}' does not exist or is not a directory")]
    MissingRoot(String),

    #[error("course {0} not found")]
    CourseNotFound(i64),

    #[error("video {0} not found")]
    VideoNotFound(i64),

    #[error("a course named '{name}' already exists for a different folder ({existing_root})")]
    NameConflict { name: String, existing_root: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolverError>;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Annotate error: {0}")]
    AnnotateError(#[from] blame_annotate::AnnotateError),

    #[error("refresh scheduler is no longer running")]
    SchedulerClosed,
}

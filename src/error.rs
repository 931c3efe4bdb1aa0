use std::io;
use thiserror::Error;

use crate::{harness::HarnessError, parse::ConfigError};

#[derive(Debug, Error)]
pub enum AppError{
    #[error("unable to load settings")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error("unable to write output")]
    Io(#[from] io::Error),
    #[error("unable to serialize report")]
    Json(#[from] serde_json::Error),
    #[error("unable to build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("invalid progress bar template")]
    Template(#[from] indicatif::style::TemplateError)
}

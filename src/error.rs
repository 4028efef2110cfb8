//! Error types shared across the report pipelines

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing configuration (connection string, malformed file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Connectivity or query failure against the store
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A column the pipeline relies on is absent from the result set
    #[error("column `{column}` missing from `{table}` result")]
    Schema {
        table: &'static str,
        column: String,
    },

    /// The pipeline's query matched nothing
    #[error("query on `{table}` returned no rows")]
    EmptyResult { table: &'static str },

    /// Classifier rejected its training input
    #[error(transparent)]
    Model(#[from] crate::model::ModelError),

    /// Predictions export failed
    #[error("csv export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Supabase client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Supabase rejected insert into {table}: HTTP {status}: {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },
}

impl From<PersistenceError> for trifivend_core::Error {
    fn from(err: PersistenceError) -> Self {
        trifivend_core::Error::Recorder(err.to_string())
    }
}

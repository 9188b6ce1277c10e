use thiserror::Error;

use crate::model::location::{LocationKey, ProfileKey};

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("invalid engine configuration: {0}")]
    ConfigurationError(String),
    #[error("failure reading .pbf file: {source}")]
    PbfLibError { source: osmpbf::Error },
    #[error("failure reading timetable from {0}: {1}")]
    TimetableReadError(String, String),
    #[error("failure writing timetable to {0}: {1}")]
    TimetableWriteError(String, String),
    #[error("failure opening database: {0}")]
    DatabaseOpenError(#[from] redb::DatabaseError),
    #[error("database transaction failure: {0}")]
    DatabaseTransactionError(#[from] redb::TransactionError),
    #[error("database table failure: {0}")]
    DatabaseTableError(#[from] redb::TableError),
    #[error("database storage failure: {0}")]
    DatabaseStorageError(#[from] redb::StorageError),
    #[error("database commit failure: {0}")]
    DatabaseCommitError(#[from] redb::CommitError),
    #[error("failure encoding value for the database: {0}")]
    SerializationError(String),
    #[error("cannot merge transfer data at (from: {from}, profile: {profile}): {reason}")]
    MergePreconditionViolated {
        from: LocationKey,
        profile: ProfileKey,
        reason: String,
    },
    #[error("location key '{0}' has no matched platform")]
    UnmatchedLocation(LocationKey),
    #[error("unknown search profile key '{0}'")]
    UnknownProfile(ProfileKey),
    #[error("routing failure: {0}")]
    RoutingError(String),
    #[error("{0}")]
    InternalError(String),
}

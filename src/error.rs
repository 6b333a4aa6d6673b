use std::{error::Error, fmt};

/// The error surface of the storage engine.
///
/// The "logical" variants (missing table, duplicate key, ...) are status
/// codes the caller is expected to handle; `Io`, `Corruption` and
/// `OutOfFrames` are fatal to the operation that raised them.
#[derive(Debug, Clone, PartialEq)]
pub enum DbError {
    Io(String),
    Corruption(String),
    /// All buffer pool frames are pinned, no page can be brought in.
    OutOfFrames,
    Failed(String),
    TableNotExist(String),
    TableAlreadyExist(String),
    IndexAlreadyExist(String),
    IndexNotFound(String),
    ColumnNameNotExist(String),
    ColumnNotUnique(String),
    PrimaryKeyNotDefined,
    KeyNotFound,
    PrimaryKeyCollision,
    UniqueKeyCollision,
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::Io(msg) => write!(f, "io error: {}", msg),
            DbError::Corruption(msg) => write!(f, "corruption: {}", msg),
            DbError::OutOfFrames => write!(f, "all buffer pool frames are pinned"),
            DbError::Failed(msg) => write!(f, "operation failed: {}", msg),
            DbError::TableNotExist(name) => write!(f, "table not exist: {}", name),
            DbError::TableAlreadyExist(name) => write!(f, "table already exist: {}", name),
            DbError::IndexAlreadyExist(name) => write!(f, "index already exist: {}", name),
            DbError::IndexNotFound(name) => write!(f, "index not found: {}", name),
            DbError::ColumnNameNotExist(name) => write!(f, "column name not exist: {}", name),
            DbError::ColumnNotUnique(name) => write!(f, "column not unique: {}", name),
            DbError::PrimaryKeyNotDefined => write!(f, "primary key not defined"),
            DbError::KeyNotFound => write!(f, "key not found"),
            DbError::PrimaryKeyCollision => write!(f, "primary key collision"),
            DbError::UniqueKeyCollision => write!(f, "unique key collision"),
        }
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e.to_string())
    }
}

pub type DbResult<T = ()> = Result<T, DbError>;

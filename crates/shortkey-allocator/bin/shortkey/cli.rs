use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};

pub const COUNT_ENV: &str = "SHORTKEY_COUNT";
pub const MIN_KEY_LEN_ENV: &str = "SHORTKEY_MIN_KEY_LEN";
pub const MAX_KEY_LEN_ENV: &str = "SHORTKEY_MAX_KEY_LEN";
pub const PREFIX_ENV: &str = "SHORTKEY_PREFIX";
pub const SUFFIX_ENV: &str = "SHORTKEY_SUFFIX";
pub const STORAGE_BACKEND_ENV: &str = "SHORTKEY_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SHORTKEY_MYSQL_DSN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "shortkey", about = "Allocate random keys for demo notes")]
pub struct CLI {
    /// Number of notes to insert.
    #[arg(long, env = COUNT_ENV, default_value_t = 10)]
    pub count: usize,

    #[arg(long, env = MIN_KEY_LEN_ENV, default_value_t = 5)]
    pub min_key_len: usize,

    #[arg(long, env = MAX_KEY_LEN_ENV, default_value_t = 9)]
    pub max_key_len: usize,

    #[arg(long, env = PREFIX_ENV, default_value = "")]
    pub prefix: String,

    #[arg(long, env = SUFFIX_ENV, default_value = "")]
    pub suffix: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,
}

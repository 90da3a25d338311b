use std::path::Path;

use time::{macros::format_description, UtcOffset};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::time::OffsetTime, EnvFilter};

pub mod error;
pub mod job;
pub mod map;
pub mod merge;
pub mod naming;
pub mod reduce;
pub mod server;
pub mod store;
pub mod task;
pub mod transfer;
pub mod workspace;

pub use error::{ConfigError, TaskError, TaskKind};
pub use job::{Job, JobReport};
pub use map::MapSummary;
pub use naming::StoreName;
pub use reduce::ReduceSummary;
pub use server::FileServer;
pub use store::{Store, StoreError};
pub use task::{Endpoint, MapTask, ReduceTask};
pub use transfer::Fetcher;
pub use workspace::Workspace;

pub const ADDR: &str = "127.0.0.1:8080";

/// Installs the global subscriber. Logs go to stderr, or to
/// `mapreduce.log` under `log_dir`. Keep the guard alive until exit.
pub fn init_logger(log_dir: Option<&Path>) -> WorkerGuard {
    let sink: Box<dyn std::io::Write + Send> = match log_dir {
        Some(dir) => Box::new(tracing_appender::rolling::never(dir, "mapreduce.log")),
        None => Box::new(std::io::stderr()),
    };
    let (writer, guard) = tracing_appender::non_blocking(sink);

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[hour]:[minute]:[second].[subsecond digits:3]"),
    );

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(timer)
        .with_writer(writer)
        .with_ansi(log_dir.is_none())
        .init();
    guard
}

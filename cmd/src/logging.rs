use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use abi::config::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log.level`. With `log.dir` set, lines also go to a
/// daily rolling file; keep the returned guard alive to flush it.
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true);

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (file, guard) = tracing_appender::non_blocking(appender);
            builder
                .with_writer(std::io::stdout.and(file))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            builder.init();
            None
        }
    }
}

use std::path::Path;

use dotenv::dotenv;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::AppResult;

/// Console only subscriber, used by tests and quick local runs.
///
/// Returns an error when a global subscriber has already been installed.
pub fn setup_local_tracing() -> AppResult<()> {
    // 加载 .env 文件
    dotenv().ok();
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true) // 是否显示日志目标
        .with_thread_names(true) // 是否显示线程名称
        .with_thread_ids(true) // 是否显示线程ID
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| super::AppError::InvalidConfig(format!("tracing already set up: {}", e)))?;
    Ok(())
}

/// Console plus hourly rolling file output under `log_dir`.
///
/// The returned guard flushes the non blocking file writer on drop, keep it
/// alive for the lifetime of the process.
pub fn setup_tracing<P: AsRef<Path>>(log_dir: P, verbose: u8) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::hourly(log_dir, "stonetcp.log");

    // 创建一个非阻塞的写入器
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    // 创建同时写入到控制台和文件的写入器
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_writer(writer);

    // RUST_LOG wins over the -v flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    });

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    worker_guard
}

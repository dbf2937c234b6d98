use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FALLBACK_FILTER: &str = "academic_organizer=info";

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose` and the configured level.
pub fn init_cli_logger(verbose: bool, configured_level: &str) {
    let directive = if verbose {
        "academic_organizer=debug".to_string()
    } else {
        format!("academic_organizer={}", configured_level.trim().to_ascii_lowercase())
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

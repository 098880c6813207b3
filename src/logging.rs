use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `PATCHKIT_LOG` first, then `RUST_LOG`, then `info`.
///
/// Index builds log one `debug` line per scanned file; run start, archive
/// and upload are logged at `info`, tolerated upload failures at `warn`.
pub fn init_tracing() {
    let filter = env_filter();
    // A subscriber may already be installed (tests, embedding programs)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("PATCHKIT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

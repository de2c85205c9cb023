//! Logger setup shared by the binaries

/// Initialise `env_logger` on stderr. `RUST_LOG` wins when set; otherwise
/// `default_filter` applies. Noisy HTTP/WebSocket internals are capped at
/// `warn` unless `RUST_LOG` names them explicitly.
pub fn init(default_filter: &str) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    for module in ["hyper", "hyper_util", "reqwest", "rustls", "tungstenite", "tokio_tungstenite"] {
        if !log_level.contains(module) {
            builder.filter_module(module, log::LevelFilter::Warn);
        }
    }

    // A second init (e.g. tests) is harmless
    let _ = builder.target(env_logger::Target::Stderr).try_init();
}

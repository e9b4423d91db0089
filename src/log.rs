//! Structured logging setup (§9 ambient stack). Installed once from
//! `main.rs`; every module logs through the `log` macros rather than
//! `eprintln!`.

/// Initializes `env_logger` with `info` as the default level when
/// `RUST_LOG` isn't set. Safe to call more than once; only the first call
/// takes effect.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}

//! Logging setup for the binary

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` directives win when set. Otherwise `LOG_LEVEL` picks the
/// level, defaulting to `debug` in debug builds and `info` in release
/// builds. Wire traffic is logged at `trace` under `spoolmail::io`.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
            LevelFilter::from_str(&level).unwrap_or_else(|_| {
                eprintln!("Invalid log level specified {level}, defaulting to {default}");
                default
            })
        });
        EnvFilter::default().add_directive(level.into())
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_filter(filter),
        )
        .init();
}

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::FilterFn, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(target: "blackhole", $level, $span);
        let _enter = span.enter();

        $crate::tracing::event!(target: "blackhole", $level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

fn level_from_env(value: Option<&str>) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber. Only events targeting `blackhole` are emitted.
///
/// The level comes from `LOG_LEVEL`. Calling this more than once is harmless,
/// later calls leave the first subscriber in place.
pub fn init() {
    let level = level_from_env(std::env::var("LOG_LEVEL").ok().as_deref());

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("blackhole")
                })),
        )
        .try_init();
}

#[cfg(test)]
mod test {
    use tracing::level_filters::LevelFilter;

    use super::level_from_env;

    #[test]
    fn log_level_parsing() {
        assert_eq!(level_from_env(Some("warn")), LevelFilter::WARN);
        assert_eq!(level_from_env(Some("INFO")), LevelFilter::INFO);
        assert_eq!(level_from_env(Some("off")), LevelFilter::OFF);

        let default = level_from_env(None);
        assert_eq!(level_from_env(Some("loud")), default);
    }
}

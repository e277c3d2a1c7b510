use tracing_core::{Level, LevelFilter};
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber, writing compact events to stderr.
///
/// AWS SDK internals are capped at [`Level::WARN`] regardless of `level`.
pub fn init(level: LevelFilter) {
    let fmt = fmt::format().with_target(false).compact();

    let target_filters = Targets::new()
        .with_target("aws_config", Level::WARN)
        .with_target("aws_smithy_runtime", Level::WARN)
        .with_target("hyper", Level::WARN)
        .with_default(level);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .event_format(fmt)
                .with_writer(std::io::stderr),
        )
        .with(target_filters)
        .init();
}

use std::{num::NonZeroU8, panic, path::Path};

use time::format_description::well_known::{iso8601, Iso8601};
use tracing::{error, subscriber::SetGlobalDefaultError, Level};
use tracing_subscriber::{
    fmt::{time::LocalTime, writer::MakeWriterExt},
    prelude::__tracing_subscriber_SubscriberExt,
    EnvFilter, Layer,
};

const TIMESTAMP_CONFIG: iso8601::EncodedConfig = iso8601::Config::DEFAULT
    .set_time_precision(iso8601::TimePrecision::Second {
        decimal_digits: NonZeroU8::new(3),
    })
    .encode();

/// Console output plus a WARN+ copy in `dir/file_name`.
pub fn init_tracing(dir: &Path, file_name: &str, verbose: bool) -> Result<(), SetGlobalDefaultError> {
    let default_layer = || {
        const WITH_FILE_PATH: bool = cfg!(debug_assertions);
        tracing_subscriber::fmt::layer()
            .compact()
            .with_file(WITH_FILE_PATH)
            .with_line_number(WITH_FILE_PATH)
            .with_target(!WITH_FILE_PATH)
            .with_thread_ids(true)
            .with_timer(LocalTime::new(Iso8601::<TIMESTAMP_CONFIG>))
    };
    let writer = tracing_appender::rolling::never(dir, file_name).with_max_level(Level::WARN);
    let file_layer = default_layer().with_ansi(false).with_writer(writer);

    let level = if verbose || cfg!(debug_assertions) {
        "trace"
    } else {
        "info"
    };
    let make_filter = || {
        EnvFilter::new(format!(
            "{}={level},gametrainer_lib={level}",
            env!("CARGO_CRATE_NAME")
        ))
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(
            file_layer
                .with_filter(make_filter())
                .and_then(default_layer().with_writer(std::io::stderr).with_filter(make_filter())),
        ),
    )?;

    panic::set_hook(Box::new(|panic| error!("{}", panic)));
    Ok(())
}

//! `tracing-subscriber` initialization (§6 ambient logging config),
//! driven by `logging.level`/`logging.json` the way the teacher's
//! `main.rs` calls `tracing_subscriber::fmt::init()` — generalized to
//! take the level/format from config instead of a fixed default.

use crate::config::LoggingSection;
use tracing_subscriber::EnvFilter;

pub fn init(logging: &LoggingSection) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

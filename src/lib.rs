pub mod api;
pub mod core;

use std::sync::Once;

static LOGGING: Once = Once::new();

pub fn init_logging() {
    LOGGING.call_once(|| {
        // RUST_LOG overrides the default filter
        let env = env_logger::Env::default().default_filter_or("vidsum=info");
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}

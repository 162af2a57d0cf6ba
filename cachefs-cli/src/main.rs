mod application;
mod fsremote;
mod presentation;

use cachefs_core::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    application::run()
}

pub mod env;
pub mod settings;
pub mod tracing_init;

pub use env::AppConfig;
pub use settings::{NotifyPolicySetting, SyncSettings};
pub use tracing_init::init_tracing;

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

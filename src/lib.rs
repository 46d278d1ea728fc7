pub mod audit;
pub mod backends;
pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod proxy;
pub mod server;

pub use audit::AuditLog;
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use logging::SharedLogger;
pub use prompt::PromptResolver;
pub use server::{build_router, AppState};

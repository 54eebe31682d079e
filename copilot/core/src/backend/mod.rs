//! Copilot Service Integration
//!
//! Abstracted access to the remote copilot service through a common trait.
//!
//! # Available Backends
//!
//! - **HTTP**: JSON endpoints of the dashboard's copilot API (default)
//!
//! # Usage
//!
//! ```ignore
//! use copilot_core::backend::{CopilotService, HttpCopilotService};
//!
//! let service = HttpCopilotService::new("http://localhost:8080", Duration::from_secs(30))?;
//! let reply = service.start_session().await?;
//! ```

mod http;
mod traits;

pub use http::HttpCopilotService;
pub use traits::{CopilotService, FailureKind, RemoteError, Reply, ReplyState};

//! Inference Client.
//!
//! # Module layout
//!
//! - [`types`]: `Message`, `Role`, `CompletionRequest`, `InferenceBackend`
//! - [`error`]: `InferenceError`
//! - [`extract`]: code-fence stripping, JSON and HTML extraction
//! - [`client`]: `InferenceClient` with linear-backoff retries
//! - [`http`]: `OpenAiCompatibleBackend`

pub mod client;
pub mod error;
pub mod extract;
pub mod http;
pub mod types;

pub use client::{InferenceClient, RetryPolicy};
pub use error::InferenceError;
pub use extract::{extract_html, extract_json, strip_code_fences};
pub use http::OpenAiCompatibleBackend;
pub use types::{CompletionRequest, InferenceBackend, Message, Role};

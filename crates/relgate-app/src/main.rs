#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Binary entrypoint that wires the pipeline together and runs it until Ctrl-C.

use relgate_app::{AppResult, run_app};

/// Bootstraps the pipeline and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}

//! Background removal CLI entry point
//!
//! Thin wrapper around the library's CLI module; all argument parsing and
//! processing logic lives in `rmbg::cli`.

#[cfg(feature = "cli")]
use rmbg::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}

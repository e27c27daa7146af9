//! Passport photo server
//!
//! Serves the photo workflow over HTTP; see `passport-photo --help`.

#[cfg(feature = "cli")]
use passport_photo::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}

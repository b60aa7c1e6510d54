//! Mailer worker
//!
//! Binary entry point for the SMTP stream worker.

#[tokio::main]
async fn main() {
    core_config::tracing::install_color_eyre();

    if let Err(e) = mailer_worker::run().await {
        eprintln!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

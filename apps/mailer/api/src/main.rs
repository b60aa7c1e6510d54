//! Mailer API
//!
//! Binary entry point for the email HTTP front end.

#[tokio::main]
async fn main() {
    core_config::tracing::install_color_eyre();

    if let Err(e) = mailer_api::run().await {
        eprintln!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

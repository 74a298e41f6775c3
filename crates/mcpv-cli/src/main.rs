#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = mcpv_cli::run_cli().await {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

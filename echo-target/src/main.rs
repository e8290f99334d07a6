use std::env;
use std::error::Error;

mod http;

/// Name reported in responses: the pod name injected through the downward
/// API, falling back to the hostname Kubernetes sets to the same value.
fn identity() -> String {
    env::var("POD_NAME")
        .or_else(|_| env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port: u16 = env::var("HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(80);
    let identity = identity();
    log::info!("Answering as {}", identity);

    http::serve(identity, port).await?;
    Ok(())
}

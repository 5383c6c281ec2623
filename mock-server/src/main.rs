use mock_server::MockConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MockConfig {
        bearer_token: std::env::var("MOCK_TOKEN").ok(),
        credentials: match (std::env::var("MOCK_USERNAME"), std::env::var("MOCK_PASSWORD")) {
            (Ok(username), Ok(password)) => Some((username, password)),
            _ => None,
        },
        narrative_bytes: std::env::var("MOCK_NARRATIVE_BYTES")
            .ok()
            .and_then(|raw| raw.parse().ok()),
    };

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}, FHIR base http://{addr}/fhir");
    mock_server::run_with(listener, config).await
}

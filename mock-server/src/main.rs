use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let patients = std::env::var("MOCK_PATIENTS").unwrap_or_else(|_| "1001".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;

    let mut store = mock_server::Store::new(&format!("http://{addr}"));
    for patient in patients.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        store = store.with_patient(patient);
    }
    tracing::info!(%addr, "listening");
    mock_server::run_with(listener, store.shared()).await
}

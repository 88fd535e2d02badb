use foodlabel_http::{CallContext, Dispatched, HttpRequest, LabelClient};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let image_path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: analyze <label.jpg>"))?;
    let token = std::env::var("FOODLABEL_TOKEN")?;
    let image = std::fs::read(&image_path)?;

    let client = LabelClient::from_env()?.with_bearer(token)?;

    let profile = client
        .get_json::<Value>("/profile", CallContext::FetchProfile)
        .await?;
    if let Some(profile) = profile.into_value() {
        println!("profile: {profile}");
    }

    let request = HttpRequest::post_bytes(client.url("/analyze"), image, "image/jpeg");
    match client.send_json::<Value>(request, CallContext::AnalyzeLabel).await {
        Ok(Dispatched::Completed(analysis)) => println!("{analysis:#}"),
        Ok(Dispatched::AssumedCompleted) => println!("analysis accepted"),
        Err(err) if err.retryable() => {
            eprintln!("{} ({}), try again later", err.message(), err.kind().as_str());
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

//! A small WAMP service: registers `com.example.add` and
//! `com.example.echo`, listens on `com.example.news`, then exercises its
//! own procedures and topic through the router.
//!
//! ```text
//! WAMPKIT_ROUTER_URL=ws://localhost:8080/ws RUST_LOG=info cargo run -p echo-service
//! ```

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use wampkit::prelude::*;

const ADD: &str = "com.example.add";
const ECHO: &str = "com.example.echo";
const NEWS: &str = "com.example.news";

#[tokio::main]
async fn main() -> Result<(), WampError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("WAMPKIT_ROUTER_URL")
        .unwrap_or_else(|_| wampkit::DEFAULT_ROUTER_URL.to_string());

    let client = Client::builder()
        .url(url)
        .procedure(ADD, InvocationPolicy::Single, |inv| async move {
            let a: i64 = inv.arg(0)?;
            let b: i64 = inv.arg(1)?;
            Ok(Payload::from_args(vec![json!(a + b)]))
        })
        .procedure(ECHO, InvocationPolicy::RoundRobin, |inv| async move {
            Ok(inv.payload)
        })
        .topic("on_news", NEWS, |event| async move {
            tracing::info!(args = ?event.payload.args, "news received");
        })
        .service()
        .build();

    client.start().await?;
    tracing::info!(id = %client.id(), registrations = ?client.registration_map(), "service up");

    let sum = client.call(ADD).arg(2).arg(3).send().await?;
    tracing::info!(result = %sum.into_value(), "add(2, 3)");

    let echoed = client
        .call(ECHO)
        .arg("hello")
        .kwarg("loud", true)
        .send()
        .await?;
    tracing::info!(args = ?echoed.args, kwargs = ?echoed.kwargs, "echo");

    let publication = client
        .publish(NEWS)
        .arg("wampkit is up")
        .acknowledge(true)
        .send()
        .await?;
    tracing::info!(?publication, "published");

    if let Some(&registration) = client.registration_map().get(ADD) {
        match client.count_callees(registration).await {
            Ok(count) => tracing::info!(count, "callees of add"),
            Err(e) => tracing::warn!(error = %e, "meta API unavailable"),
        }
    }

    // Give the router a moment to deliver our own publication back, if
    // it is configured to.
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.stop().await;
    Ok(())
}

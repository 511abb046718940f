use std::io::Read;

use edge_image_derive::{EdgeEvent, HttpObjectStore, ImageDeriverBuilder};
use tower::{Service, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Reads one edge event as JSON from stdin and prints the response as JSON.
//
//   IMAGE_STORE_URL=http://localhost:9000/images/ \
//       cargo run < event.json
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(
            |_| "demo_basic=debug,edge_image_derive=debug".into(),
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    // Service set up, once per process.
    let store = HttpObjectStore::from_env()?;
    let mut deriver = ImageDeriverBuilder::new(store).build();

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let event = EdgeEvent::from_json(&input)?;

    let response = deriver.ready().await?.call(event).await?;
    tracing::info!(status = %response.status, "derived");

    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

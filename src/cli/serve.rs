use crate::models::GateConfig;
use crate::store::{JsonFileStore, KeyValueStore};
use crate::Result;
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Start the gate server
pub async fn run(config: GateConfig, port: Option<u16>, open_browser: bool) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();

    let store_path = config.storage_path()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&store_path));

    let url = format!("http://{}", addr);
    println!("{}", format!("✓ Gate running on {}", url).green());
    println!("{}", format!("  Destination: {}", config.destination).cyan());
    println!("{}", format!("  Store:       {}", store_path.display()).cyan());
    println!("Press Ctrl+C to stop");

    if open_browser {
        open_in_browser(&url);
    }

    crate::server::serve(config, store, addr).await
}

#[cfg(feature = "ui")]
fn open_in_browser(url: &str) {
    if let Err(e) = open::that(url) {
        eprintln!(
            "{}",
            format!("⚠ Failed to open browser: {}. Please open {} manually.", e, url).yellow()
        );
    }
}

#[cfg(not(feature = "ui"))]
fn open_in_browser(url: &str) {
    println!(
        "{}",
        format!("⚠ Built without the `ui` feature; open {} manually", url).yellow()
    );
}

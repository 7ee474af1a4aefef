/// Smoke-test for `ChromiumEngine`.
///
/// Launches a headless Chromium, fetches <https://example.com>, and verifies
/// the rendered HTML contains the expected `<h1>`.
///
/// Run with:
///   cargo run --example browser_smoke
use argus_browser::ChromiumEngine;
use argus_core::engine::PageEngine;
use argus_core::ScraperConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let engine = ChromiumEngine::launch(ScraperConfig::default()).await?;

    let url = "https://example.com";
    println!("Fetching {url} …");
    let page = engine.fetch(url).await?;

    // Basic sanity checks
    assert_eq!(page.http_status, Some(200));
    assert!(
        page.content.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );
    assert!(
        page.content.len() > 500,
        "HTML suspiciously short ({} bytes)",
        page.content.len()
    );

    println!("OK — got {} bytes of rendered HTML", page.content.len());
    println!("Final URL: {}", page.final_url);
    Ok(())
}

//! Run a shell command that emits JSON lines and print the parsed metrics.
//!
//!     cargo run --example json_lines

use std::sync::Arc;
use std::time::Duration;

use spigot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    spigot::util::logging::init(&LogLevel::Debug);

    let mut config = ExecConfig::new([
        "/bin/sh",
        "-c",
        r#"while true; do echo "{\"metric\":\"uptime\",\"seconds\":$(cut -d. -f1 /proc/uptime)}"; sleep 1; done"#,
    ]);
    config.signal = "SIGTERM".to_string();

    let mut source = ExecSource::new(config);
    source.set_streaming_parser(Arc::new(JsonLinesParser::<serde_json::Value>::new()));
    source.init()?;

    let (sink, mut rx) = ChannelSink::channel(64);
    source.start(Arc::new(sink)).await?;

    let collect = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(metric) = rx.recv().await {
            println!("metric: {metric}");
        }
    });
    let _ = collect.await;

    source.stop().await;
    Ok(())
}

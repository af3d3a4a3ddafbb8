use esperantose::{run_relay, startup, RelayMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = startup("esperantose-watch")?;
    run_relay(cfg, RelayMode::Forever).await
}

use esperantose::{run_relay, startup, RelayMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = startup("esperantose-relay")?;
    run_relay(cfg, RelayMode::Once).await
}

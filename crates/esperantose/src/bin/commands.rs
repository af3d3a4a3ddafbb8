use esperantose::{run_inline_bot, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = startup("esperantose-commands")?;
    run_inline_bot(cfg).await
}

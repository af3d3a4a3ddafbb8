use crate::{errors::Error, Result};

/// Initialize tracing for one of the esperantose processes.
///
/// Output goes to stderr; operators watch it for fetch/forward failures.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,esperantose=info,esperantose_core=info,esperantose_telegram=info,\
             esperantose_stackexchange=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;

    Ok(())
}

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const FILTER_VARS: [&str; 2] = ["RMP_LOG", "RUST_LOG"];

/// Installs the global fmt subscriber on stderr, keeping stdout free for the
/// chat transcript.
pub fn init_tracing(component: &str) {
    let filter = EnvFilter::new(directives(component, |name| std::env::var(name).ok()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// First parseable value of `RMP_LOG`, then `RUST_LOG`, else the crate default.
fn directives<F>(component: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    FILTER_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| format!("info,rmp_assistant=debug,{component}=debug"))
}

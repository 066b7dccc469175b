//! ACE Playbook - self-curating strategy playbook CLI

use ace_playbook::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // WARN by default; RUST_LOG=ace_playbook=debug to follow a learning cycle
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run().await
}

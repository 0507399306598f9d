// ABOUTME: Shared logging setup for mesh binaries
// ABOUTME: init() for plain stderr logging, init_for() to focus on the mesh's own crates

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. Default: INFO for the named crates, WARN for everything else.
/// Keeps tonic/hyper/sqlx chatter out of collector logs.
pub fn init_for(crate_names: &[&str]) {
    tracing_subscriber::fmt()
        .with_env_filter(crate_filter(crate_names))
        .init();
}

fn crate_filter(crate_names: &[&str]) -> EnvFilter {
    crate_names.iter().fold(
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        |filter, name| {
            let directive = format!("{}=info", name.replace('-', "_"));
            filter.add_directive(
                directive
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_for() {
        let _ = super::init_for as fn(&[&str]);
    }

    #[test]
    fn crate_filter_normalizes_dashes() {
        let filter = super::crate_filter(&["mesh-node", "mesh-dispatch"]).to_string();
        assert!(filter.contains("mesh_node=info"));
        assert!(filter.contains("mesh_dispatch=info"));
    }
}

/// Initializes the tracing/logging infrastructure for the application.
///
/// This sets up structured logging using the `tracing` crate with:
/// - **Environment-based filtering**: Controlled via `RUST_LOG` environment variable
/// - **Compact formatting**: One line per event, no module path (pids and names are fields)
///
/// # Environment Variables
///
/// Set `RUST_LOG` to control log verbosity:
/// - `RUST_LOG=info` - Supervision decisions, process start/stop
/// - `RUST_LOG=debug` - Every exit request, link notification and saga hop
/// - `RUST_LOG=actor_supervisor::saga=debug` - Debug only for the saga overlay
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Node started");
/// ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

// Startup module - displays banner and module loading status
//
// Prints a banner, then a line per module with a checkmark: routing,
// reasoning injection, thinking-tag filtering, the thinking bus, and the
// config REST surface.

use crate::config::AppConfig;

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print the startup banner before the server starts accepting connections.
pub fn print_startup(config: &AppConfig, port: u16, profile_count: usize, default_profile: Option<&str>) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}reasoning-proxy{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Strips <think> chains-of-thought from OpenAI-compatible traffic{RESET}");
    println!();
    println!("  {DIM}Config:{RESET} {GREEN}\u{2713}{RESET} {}", config.config_doc_path.display());
    println!();
    println!("  {DIM}Loading modules...{RESET}");
    for (name, description) in [
        ("routing", "Profile resolution"),
        ("format", "Dialect translation"),
        ("reasoning", "Reasoning-param injection"),
        ("stream-filter", "<think> tag stripping"),
        ("thinking-bus", "Diagnostic thinking stream"),
        ("config-api", "Profile/settings REST surface"),
    ] {
        println!("    {GREEN}\u{2713}{RESET} {:<14} {DIM}{}{RESET}", name, description);
    }
    println!();
    println!("  {DIM}Profiles:{RESET} {profile_count} loaded{}", match default_profile {
        Some(id) => format!(", default = {id}"),
        None => ", no default set".to_string(),
    });
    println!("  \u{25b8} Proxy listening on {BOLD}{}:{}{RESET}", config.bind_host, port);
    println!();
}

/// Mirror the banner into the tracing log at startup, for deployments
/// running headless with logs as the only record of what came up.
pub fn log_startup(config: &AppConfig, port: u16, profile_count: usize) {
    tracing::info!("reasoning-proxy v{VERSION} starting");
    tracing::info!("config document: {}", config.config_doc_path.display());
    tracing::info!("profiles loaded: {profile_count}");
    tracing::info!("listening on {}:{}", config.bind_host, port);
}

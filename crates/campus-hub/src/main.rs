//! # campus-hub
//!
//! Campus event hub binary: loads settings, wires the JWT verifier into the
//! server, and serves until ctrl-c. `mint-token` issues a test credential
//! signed with the configured secret.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use campus_auth::{Claims, JwtVerifier, issue_token};
use campus_core::{Identity, Role};
use campus_server::config::ServerConfig;
use campus_server::server::CampusServer;
use campus_settings::HubSettings;
use clap::{Parser, Subcommand};

const DEFAULT_DRAIN_SECS: u64 = 10;

/// Real-time event hub for the campus app.
#[derive(Parser, Debug)]
#[command(name = "campus-hub", about = "Campus real-time event hub")]
struct Cli {
    /// Settings file (defaults to `~/.campus/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the hub (default).
    Serve {
        /// Seconds to wait for sessions to close on shutdown.
        #[arg(long, default_value = "10")]
        drain_secs: u64,
    },
    /// Print a signed access token for local testing.
    MintToken {
        /// Subject (user) id.
        #[arg(long)]
        sub: String,
        /// Role, e.g. `teacher` or `super-admin`.
        #[arg(long)]
        role: String,
        /// Tenant (school) id; required for every role except super-admin.
        #[arg(long)]
        tenant: Option<String>,
        /// Token lifetime.
        #[arg(long, default_value = "3600")]
        ttl_secs: i64,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<HubSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(campus_settings::settings_path);
        let mut settings = campus_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

fn mint_token(
    settings: &HubSettings,
    sub: &str,
    role: &str,
    tenant: Option<String>,
    ttl_secs: i64,
) -> Result<String> {
    let role: Role = role.parse().context("Invalid role")?;
    let identity = Identity::new(sub, role, tenant).context("Invalid identity")?;
    let claims = Claims::for_identity(&identity, ttl_secs, settings.auth.issuer.clone());
    issue_token(settings.auth.jwt_secret.as_bytes(), &claims).context("Failed to sign token")
}

async fn serve(settings: HubSettings, drain: Duration) -> Result<()> {
    let metrics_handle =
        campus_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let verifier = Arc::new(JwtVerifier::new(
        settings.auth.jwt_secret.as_bytes(),
        settings.auth.issuer.as_deref(),
        settings.auth.leeway_secs,
    ));

    let config = ServerConfig::from_settings(&settings);
    let publish_enabled = config.publish_key.is_some();
    let server = CampusServer::new(config, verifier, metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(%addr, publish_enabled, "campus hub listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown_gracefully(handle, Some(drain)).await {
        tracing::warn!(open = server.open_sessions(), "sessions still open after drain timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    settings.validate().context("Invalid settings")?;

    let drain_secs = match cli.command {
        Some(Command::MintToken {
            sub,
            role,
            tenant,
            ttl_secs,
        }) => {
            println!("{}", mint_token(&settings, &sub, &role, tenant, ttl_secs)?);
            return Ok(());
        }
        Some(Command::Serve { drain_secs }) => drain_secs,
        None => DEFAULT_DRAIN_SECS,
    };

    campus_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    serve(settings, Duration::from_secs(drain_secs)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_auth::IdentityVerifier;

    fn settings_with_secret() -> HubSettings {
        let mut s = HubSettings::default();
        s.auth.jwt_secret = "cli-secret".into();
        s
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::parse_from(["campus-hub"]);
        assert!(cli.command.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn cli_serve_with_overrides() {
        let cli = Cli::parse_from(["campus-hub", "serve", "--port", "9000", "--drain-secs", "3"]);
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.command, Some(Command::Serve { drain_secs: 3 }));
    }

    #[test]
    fn cli_mint_token_args() {
        let cli = Cli::parse_from([
            "campus-hub", "mint-token", "--sub", "t-1", "--role", "teacher", "--tenant", "school-1",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::MintToken {
                sub: "t-1".into(),
                role: "teacher".into(),
                tenant: Some("school-1".into()),
                ttl_secs: 3600,
            })
        );
    }

    #[test]
    fn settings_file_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000, "host": "10.0.0.1"}}"#).unwrap();

        let cli = Cli::parse_from([
            "campus-hub".to_owned(),
            "--settings".to_owned(),
            path.display().to_string(),
            "--host".to_owned(),
            "127.0.0.1".to_owned(),
        ]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 7000);
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "campus-hub".to_owned(),
            "--settings".to_owned(),
            dir.path().join("absent.json").display().to_string(),
        ]);
        assert_eq!(cli.load_settings().unwrap().server.max_connections, 10_000);
    }

    #[tokio::test]
    async fn minted_token_verifies() {
        let settings = settings_with_secret();
        let token = mint_token(&settings, "t-1", "teacher", Some("school-1".into()), 60).unwrap();

        let verifier = JwtVerifier::new(b"cli-secret", None, 0);
        let identity = verifier.verify_token(&token).await.unwrap();
        assert_eq!(identity.subject_id(), "t-1");
        assert_eq!(identity.role(), Role::Teacher);
        assert_eq!(identity.tenant_id(), Some("school-1"));
    }

    #[test]
    fn mint_token_rejects_bad_input() {
        let settings = settings_with_secret();
        assert!(mint_token(&settings, "u", "janitor", Some("s".into()), 60).is_err());
        assert!(mint_token(&settings, "u", "teacher", None, 60).is_err());
        assert!(mint_token(&settings, "sa", "super-admin", None, 60).is_ok());
    }

    #[tokio::test]
    async fn server_graceful_shutdown() {
        let mut settings = settings_with_secret();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let verifier = Arc::new(JwtVerifier::new(b"cli-secret", None, 0));
        let handle = campus_server::metrics::install_recorder().unwrap();
        let server = CampusServer::new(ServerConfig::from_settings(&settings), verifier, handle);
        let (_, join) = server.listen().await.unwrap();
        assert!(server.shutdown_gracefully(join, Some(Duration::from_secs(5))).await);
    }
}

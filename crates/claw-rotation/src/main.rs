//! claw-rotate binary entrypoint.
//!
//! A local invoker for the rotation engine: each subcommand reads the JSON
//! configuration, opens the encrypted file store and the credential file
//! target, and drives one step or a full rotation.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use claw_rotation::{
    CredentialFileTarget, DatabaseCredential, FileSecretStore, InvocationContext, MasterKey,
    RotationRequest, Rotator, RotatorConfig, SecretId, SecretStore, SecretString, Step, VersionId,
};

mod cli;

use cli::{Cli, Commands, LogFormat};

type FileRotator = Rotator<FileSecretStore, CredentialFileTarget, DatabaseCredential>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claw_rotation=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Invoke { event } => {
            let (config, rotator) = open(&cli.config)?;
            let event = match event {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading event {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("reading event from stdin")?;
                    buf
                }
            };
            let request = RotationRequest::from_json(&event)?;
            let ctx = cancel_on_ctrl_c(InvocationContext::with_timeout(config.step_timeout()));

            if let Err(e) = rotator.handle(&ctx, &request).await {
                error!(
                    secret_id = %request.secret_id,
                    step = %request.step,
                    retryable = e.is_retryable(),
                    error = %e,
                    "rotation step failed"
                );
                return Err(e.into());
            }
        }
        Commands::Rotate { secret_id, token } => {
            let (config, rotator) = open(&cli.config)?;
            let secret_id = SecretId::new(secret_id)?;
            let token = match token {
                Some(token) => VersionId::new(token)?,
                None => VersionId::generate(),
            };
            let budget = config.step_timeout() * Step::ALL.len() as u32;
            let ctx = cancel_on_ctrl_c(InvocationContext::with_timeout(budget));

            if let Err(e) = rotator.rotate(&ctx, &secret_id, &token).await {
                error!(
                    %secret_id,
                    %token,
                    retryable = e.is_retryable(),
                    error = %e,
                    "rotation failed"
                );
                return Err(e.into());
            }
            writeln!(stdout, "{token}")?;
        }
        Commands::Seed {
            secret_id,
            value_file,
        } => {
            let (_, rotator) = open(&cli.config)?;
            let secret_id = SecretId::new(secret_id)?;
            let value = SecretString::new(
                tokio::fs::read_to_string(&value_file)
                    .await
                    .with_context(|| format!("reading {}", value_file.display()))?,
            );
            if serde_json::from_str::<serde_json::Value>(value.expose()).is_err() {
                bail!("{} does not hold a JSON document", value_file.display());
            }

            let version = VersionId::generate();
            rotator
                .store()
                .seed_current(&secret_id, version.clone(), &value)
                .await?;
            info!(%secret_id, %version, "secret seeded");
            writeln!(stdout, "{version}")?;
        }
        Commands::Describe { secret_id } => {
            let (_, rotator) = open(&cli.config)?;
            let secret_id = SecretId::new(secret_id)?;
            let versions = rotator.store().describe_versions(&secret_id).await?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&versions)?)?;
        }
        Commands::InitKey { output } => init_key(&output)?,
    }

    Ok(())
}

fn open(path: &Path) -> anyhow::Result<(RotatorConfig, FileRotator)> {
    let config = RotatorConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let key_text = std::fs::read_to_string(&config.master_key_path)
        .with_context(|| format!("reading master key {}", config.master_key_path.display()))?;
    let key = MasterKey::from_base64(&key_text)?;
    let store = FileSecretStore::new(&config.store_path, key);
    let target = CredentialFileTarget::new(&config.credential_file, config.password.clone())?;
    Ok((config, Rotator::new(store, target)))
}

fn cancel_on_ctrl_c(ctx: InvocationContext) -> InvocationContext {
    let handle = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    ctx
}

fn init_key(output: &Path) -> anyhow::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(output)
        .with_context(|| format!("creating {}", output.display()))?;
    writeln!(file, "{}", MasterKey::generate().to_base64())?;
    info!(path = %output.display(), "master key written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn cli_parses_invoke_from_stdin() {
        let cli = Cli::parse_from(["claw-rotate", "invoke"]);
        assert!(matches!(cli.command, Commands::Invoke { event: None }));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_parses_rotate_with_token() {
        let cli = Cli::parse_from([
            "claw-rotate",
            "--config",
            "/etc/claw-rotate.json",
            "--log-format",
            "json",
            "rotate",
            "--secret-id",
            "db/main",
            "--token",
            "t1",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/claw-rotate.json"));
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Rotate { secret_id, token } => {
                assert_eq!(secret_id, "db/main");
                assert_eq!(token.as_deref(), Some("t1"));
            }
            other => panic!("expected rotate command, got {other:?}"),
        }
    }

    #[test]
    fn cli_requires_secret_id_for_describe() {
        assert!(Cli::try_parse_from(["claw-rotate", "describe"]).is_err());
    }

    #[test]
    fn init_key_writes_loadable_key_once() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("master.key");

        init_key(&path).expect("first write");
        let text = std::fs::read_to_string(&path).expect("read key");
        MasterKey::from_base64(&text).expect("valid key");

        assert!(init_key(&path).is_err());
    }

    #[tokio::test]
    async fn missing_config_fails() {
        let cli = Cli::parse_from([
            "claw-rotate",
            "--config",
            "/nonexistent/claw-rotate.json",
            "describe",
            "--secret-id",
            "db/main",
        ]);
        assert!(run(cli).await.is_err());
    }
}

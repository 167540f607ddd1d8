//! `vibeusage auth`: credential enrollment and inspection.
//!
//! The engine only describes each provider's auth flow; this command drives
//! it: device-code polling inline, manual keys from a flag or the
//! conventional env var, session tokens from a flag.

use tokio_util::sync::CancellationToken;

use super::OutputOptions;
use super::args::AuthCommand;
use crate::auth::device_flow::{self, PollOutcome};
use crate::core::Engine;
use crate::core::provider::AuthFlow;
use crate::error::{Result, VibeusageError};
use crate::storage::CredentialKind;

pub async fn run(
    engine: &Engine,
    command: AuthCommand,
    out: OutputOptions,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        AuthCommand::Login {
            provider,
            api_key,
            session,
        } => login(engine, &provider, api_key, session, cancel).await,
        AuthCommand::Logout { provider } => logout(engine, &provider),
        AuthCommand::Status => status(engine, out),
    }
}

async fn login(
    engine: &Engine,
    provider_id: &str,
    api_key: Option<String>,
    session: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let provider = engine
        .providers
        .get(provider_id)
        .ok_or_else(|| VibeusageError::UnknownProvider(provider_id.to_string()))?;

    // A session token works for any provider that accepts one, regardless of
    // its primary flow.
    if let Some(token) = session {
        let path = engine.creds.credential_path(provider_id, CredentialKind::Session);
        engine.creds.write(
            &path,
            serde_json::to_vec_pretty(&serde_json::json!({ "session_token": token }))?.as_slice(),
        )?;
        println!("stored session token for {provider_id}");
        return Ok(());
    }

    match provider.auth() {
        Some(AuthFlow::DeviceCode(config)) => {
            let authorization = device_flow::request_device_code(&engine.http, &config).await?;
            println!("Open {}", authorization.open_url());
            println!("and enter code: {}", authorization.user_code);

            let outcome = device_flow::poll_for_token(
                &engine.http,
                &config,
                &authorization,
                engine.clock.as_ref(),
                &cancel,
            )
            .await?;

            match outcome {
                PollOutcome::Authorized(credentials) => {
                    let path =
                        engine.creds.credential_path(provider_id, CredentialKind::OAuth);
                    engine.creds.write(&path, &credentials.to_json_bytes()?)?;
                    println!("signed in to {provider_id}");
                    Ok(())
                }
                PollOutcome::Denied => Err(VibeusageError::AuthFailed {
                    provider: provider_id.to_string(),
                    reason: "authorization denied".to_string(),
                }),
                PollOutcome::Expired => Err(VibeusageError::AuthFailed {
                    provider: provider_id.to_string(),
                    reason: "device code expired".to_string(),
                }),
                PollOutcome::Cancelled => Err(VibeusageError::Cancelled),
            }
        }
        Some(AuthFlow::ManualKey { env_var, help }) => {
            let key = api_key
                .or_else(|| std::env::var(env_var).ok().filter(|v| !v.trim().is_empty()))
                .ok_or_else(|| {
                    VibeusageError::Config(format!(
                        "pass --api-key or set {env_var}. {help}"
                    ))
                })?;
            let path = engine.creds.credential_path(provider_id, CredentialKind::ApiKey);
            engine.creds.write(
                &path,
                serde_json::to_vec_pretty(&serde_json::json!({ "api_key": key }))?.as_slice(),
            )?;
            println!("stored API key for {provider_id}");
            Ok(())
        }
        Some(AuthFlow::Custom { instructions }) => {
            println!("{instructions}");
            Ok(())
        }
        None => Err(VibeusageError::Config(format!(
            "{provider_id} has no interactive auth flow"
        ))),
    }
}

fn logout(engine: &Engine, provider_id: &str) -> Result<()> {
    if engine.providers.get(provider_id).is_none() {
        return Err(VibeusageError::UnknownProvider(provider_id.to_string()));
    }
    for kind in CredentialKind::ALL {
        engine
            .creds
            .delete(&engine.creds.credential_path(provider_id, *kind))?;
    }
    println!("removed stored credentials for {provider_id}");
    Ok(())
}

fn status(engine: &Engine, out: OutputOptions) -> Result<()> {
    let reuse_cli = engine.config.credentials.reuse_provider_credentials;

    for id in engine.enabled_provider_ids() {
        let Some(provider) = engine.providers.get(&id) else {
            continue;
        };
        let sources = provider.credential_sources();
        let found = engine
            .creds
            .find(&id, &sources.cli_paths, &sources.env_vars, reuse_cli);

        match found {
            Some(discovery) => {
                let mut line = format!("{id:<12}{} ({})", discovery.source.label(), discovery.location);
                if discovery.kind == Some(CredentialKind::OAuth) {
                    if let Ok(Some(bytes)) = engine.creds.read(std::path::Path::new(&discovery.location)) {
                        if let Ok(creds) = crate::auth::OAuthCredentials::from_json_bytes(&bytes) {
                            if creds.needs_refresh(engine.clock.now()) {
                                line.push_str("  [needs refresh]");
                            }
                        }
                    }
                }
                println!("{line}");
            }
            None => {
                let note = if out.no_color {
                    "not configured".to_string()
                } else {
                    use colored::Colorize;
                    "not configured".dimmed().to_string()
                };
                println!("{id:<12}{note}");
            }
        }
    }
    Ok(())
}

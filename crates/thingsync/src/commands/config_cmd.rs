//! Config subcommand handlers.

use dialoguer::{Input, Password, Select};
use secrecy::SecretString;
use serde_json::Value;

use thingsync_core::flow::is_valid_token_format;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

const SECRET_KEYS: &[&str] = &[
    "token",
    "access_token",
    "refresh_token",
    "oauth_client_secret",
];

// ── Helpers ─────────────────────────────────────────────────────────

/// Config as a JSON tree with secrets masked and unset values dropped.
fn redacted(cfg: &Config) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(cfg).map_err(|e| CliError::Render(e.to_string()))?;
    mask(&mut value);
    Ok(value)
}

fn mask(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        for (key, v) in map.iter_mut() {
            if SECRET_KEYS.contains(&key.as_str()) {
                *v = Value::String("****".into());
            } else {
                mask(v);
            }
        }
    }
}

fn as_toml(value: &Value) -> Result<String, CliError> {
    toml::to_string_pretty(value).map_err(|e| CliError::Render(e.to_string()))
}

/// Ask where the token should live and apply the choice to `cfg`.
fn store_token_interactively(cfg: &mut Config, token: String) -> Result<(), CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the access token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        config::store_token(&SecretString::from(token))?;
        cfg.api.token = None;
        eprintln!("   ✓ Access token stored in system keyring");
    } else {
        cfg.api.token = Some(token);
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let path = config::resolve_path(global);
            let mut cfg = config::load_file(&path)?;
            eprintln!("thingsync configuration wizard");
            eprintln!("   Config path: {}\n", path.display());

            // 1. Public URL
            let public_url: String = Input::new()
                .with_prompt("Public HTTPS base URL of this host")
                .with_initial_text(cfg.webhook.public_url.clone().unwrap_or_default())
                .validate_with(|input: &String| -> Result<(), String> {
                    url::Url::parse(input)
                        .map(|_| ())
                        .map_err(|e| format!("invalid URL: {e}"))
                })
                .interact_text()
                .map_err(prompt_err)?;
            cfg.webhook.public_url = Some(public_url);

            // 2. Bind address
            cfg.webhook.bind = Input::new()
                .with_prompt("Local bind address")
                .default(cfg.webhook.bind.clone())
                .interact_text()
                .map_err(prompt_err)?;

            // 3. Access token
            let token = Password::new()
                .with_prompt("Personal access token (empty to skip)")
                .allow_empty_password(true)
                .interact()
                .map_err(prompt_err)?;
            if !token.is_empty() {
                if !is_valid_token_format(&token) {
                    return Err(CliError::Validation {
                        field: "token".into(),
                        reason: "must be a 32 character hex string or a UUID".into(),
                    });
                }
                store_token_interactively(&mut cfg, token)?;
            }

            // 4. Endpoint identity
            cfg.ensure_endpoint_ids();
            config::save_config(&cfg, &path)?;

            eprintln!("\n✓ Configuration written to {}", path.display());
            eprintln!("\n  Next: thingsync setup");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let view = redacted(&cfg)?;
            let out = output::render_single(&global.output, &view, as_toml, |_| {
                config::resolve_path(global).display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(
                &config::resolve_path(global).display().to_string(),
                global.quiet,
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn mask_hides_secrets_at_any_depth() {
        let mut value = json!({
            "api": { "token": "abc", "timeout": 30, "ca_cert": null },
            "installations": {
                "e1": { "installed_app_id": "ia-1", "access_token": "x", "refresh_token": "y" }
            }
        });
        mask(&mut value);

        assert_eq!(
            value,
            json!({
                "api": { "token": "****", "timeout": 30 },
                "installations": {
                    "e1": { "installed_app_id": "ia-1", "access_token": "****", "refresh_token": "****" }
                }
            })
        );
    }

    #[test]
    fn redacted_config_renders_as_toml() {
        let mut cfg = Config::default();
        cfg.api.token = Some("secret".into());
        let text = as_toml(&redacted(&cfg).unwrap()).unwrap();

        assert!(text.contains("token = \"****\""));
        assert!(!text.contains("secret"));
    }
}

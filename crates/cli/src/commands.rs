//! Verify and signing-key commands.

use anyhow::{Context, Result};
use console::style;
use plugin_sig_core::InstallConfig;
use plugin_sig_gpg::SignatureChecker;
use plugin_sig_sigstore::{KeylessSettings, KeylessVerifier, VerificationResult};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::VerifyArgs;
use crate::json::{KeylessSignatureJson, PgpSignatureJson, SigningKeyJson, VerifyJson};
use crate::util::{format_bytes, spinner};

fn load_config(source: &str, signing_key: Option<&Path>) -> Result<InstallConfig> {
    let config = InstallConfig::from_source(source).context("Invalid --source")?;
    match signing_key {
        Some(path) => {
            let key = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read signing key: {}", path.display()))?;
            Ok(config.with_signing_key(key))
        }
        None => Ok(config),
    }
}

fn open(path: &Path, what: &str) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open {what}: {}", path.display()))
}

pub fn verify_artifact(args: VerifyArgs, json: bool) -> Result<()> {
    let config = load_config(&args.source, args.signing_key.as_deref())?;

    eprintln!(
        "{} {}",
        style("==> Verifying").cyan().bold(),
        style(args.artifact.display()).cyan()
    );
    let size = std::fs::metadata(&args.artifact)
        .with_context(|| format!("Failed to open artifact: {}", args.artifact.display()))?
        .len();
    eprintln!(
        "    Source {} ({})",
        style(config.source()).cyan(),
        format_bytes(usize::try_from(size).unwrap_or(usize::MAX))
    );

    match &args.certificate {
        Some(certificate) => verify_keyless(&args, &config, certificate, json),
        None => verify_pgp(&args, &config, json),
    }
}

fn verify_keyless(
    args: &VerifyArgs,
    config: &InstallConfig,
    certificate: &Path,
    json: bool,
) -> Result<()> {
    let mut artifact = open(&args.artifact, "artifact")?;
    let mut certificate = open(certificate, "certificate")?;
    let mut signature = open(&args.signature, "signature")?;

    let mut settings = KeylessSettings::default().with_timeout(Duration::from_secs(args.timeout));
    if let Some(url) = &args.rekor_url {
        settings = settings.with_rekor_url(url.clone());
    }
    if let Some(dir) = &args.tuf_root {
        settings = settings.with_tuf_cache_dir(dir.clone());
    }

    let verifier = KeylessVerifier::production(config, settings)
        .context("Failed to set up keyless verification")?;

    let spinner = spinner(format!(
        "Checking transparency log for {}",
        style(verifier.subject_pattern()).cyan()
    ))?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome =
        rt.block_on(verifier.verify_keyless(&mut artifact, &mut certificate, &mut signature));
    let result = match outcome {
        Ok(result) => {
            spinner.finish_with_message("[OK] Keyless signature verified");
            result
        }
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).context("Keyless verification failed");
        }
    };

    if json {
        let payload = VerifyJson {
            status: "success",
            command: "verify",
            source: config.source(),
            artifact: args.artifact.display().to_string(),
            method: "keyless",
            openpgp: None,
            keyless: Some(keyless_json(&result)),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!(
        "\n{} {}",
        style("[VALID]").green().bold(),
        style("Artifact signed by the source repository").green()
    );
    eprintln!(
        "      Identity: {}",
        style(&result.verified_identity.subject_alternative_name).cyan()
    );
    eprintln!("      Issuer: {}", style(&result.verified_identity.issuer).cyan());
    for timestamp in &result.verified_timestamps {
        eprintln!(
            "      Rekor: {} ({})",
            style(format!("index {}", timestamp.log_index)).cyan(),
            timestamp.timestamp.to_rfc3339()
        );
    }
    Ok(())
}

fn keyless_json(result: &VerificationResult) -> KeylessSignatureJson {
    let first = result.verified_timestamps.first();
    KeylessSignatureJson {
        certificate_identity: result.verified_identity.subject_alternative_name.clone(),
        certificate_oidc_issuer: result.verified_identity.issuer.clone(),
        rekor_log_index: first.map(|t| t.log_index),
        integrated_time: first.map(|t| t.timestamp.to_rfc3339()),
    }
}

fn verify_pgp(args: &VerifyArgs, config: &InstallConfig, json: bool) -> Result<()> {
    let checker = SignatureChecker::new(config);
    if !checker.has_signing_key() {
        if json {
            let payload = VerifyJson {
                status: "skipped",
                command: "verify",
                source: config.source(),
                artifact: args.artifact.display().to_string(),
                method: "none",
                openpgp: None,
                keyless: None,
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else {
            eprintln!(
                "\n{} No signing key configured for {}, signature verification skipped",
                style("[SKIPPED]").yellow().bold(),
                style(config.source()).cyan()
            );
        }
        return Ok(());
    }

    let artifact = BufReader::new(open(&args.artifact, "artifact")?);
    let signature = BufReader::new(open(&args.signature, "signature")?);

    let spinner = spinner("Checking OpenPGP signature".to_string())?;
    let verified = match checker.verify(artifact, signature) {
        Ok(verified) => {
            spinner.finish_with_message("[OK] OpenPGP signature verified");
            verified
        }
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).context("Signature verification failed");
        }
    };

    if json {
        let payload = VerifyJson {
            status: "success",
            command: "verify",
            source: config.source(),
            artifact: args.artifact.display().to_string(),
            method: "openpgp",
            openpgp: Some(PgpSignatureJson {
                key_fingerprint: verified.key_fingerprint.clone(),
                uids: verified.uids.clone(),
                key_source: verified.source.as_str().to_string(),
            }),
            keyless: None,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!(
        "\n{} {}",
        style("[VALID]").green().bold(),
        style("OpenPGP signature verified").green()
    );
    eprintln!(
        "      Fingerprint: {} ({} key)",
        style(&verified.key_fingerprint).cyan(),
        verified.source.as_str()
    );
    for uid in &verified.uids {
        eprintln!("      Identity: {}", style(uid).cyan());
    }
    Ok(())
}

pub fn show_signing_key(source: String, signing_key: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(&source, signing_key.as_deref())?;
    let checker = SignatureChecker::new(&config);
    let key = checker.has_signing_key().then(|| checker.signing_key().to_string());

    if json {
        let payload = SigningKeyJson {
            status: "success",
            command: "signing-key",
            source: config.source(),
            signing_key: key,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match key {
        Some(key) => print!("{key}"),
        None => eprintln!(
            "{} No signing key applies to {}",
            style("[NONE]").yellow().bold(),
            style(config.source()).cyan()
        ),
    }
    Ok(())
}

use crate::cli::{Cli, Commands};
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;
use plugin_sig_core::{Error as VerifyError, ErrorKind};

/// Exit status when the artifact is untrusted.
pub const EXIT_UNTRUSTED: u8 = 2;
/// Exit status when the check could not be completed.
pub const EXIT_FAILURE: u8 = 1;

pub fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    let result = match cli.command {
        Commands::Verify(args) => crate::commands::verify_artifact(args, json),
        Commands::SigningKey {
            source,
            signing_key,
        } => crate::commands::show_signing_key(source, signing_key, json),
    };

    if let Err(e) = &result {
        let kind = error_kind(e);
        let untrusted = kind.is_some_and(ErrorKind::is_untrusted);
        if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                status: if untrusted { "untrusted" } else { "error" },
                kind: kind.map(ErrorKind::as_str),
                error: e.to_string(),
                causes,
            };
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            let label = if untrusted { "[UNTRUSTED]" } else { "[ERROR]" };
            eprintln!("\n{} {}", style(label).red().bold(), style(&e).red());

            for (i, cause) in e.chain().skip(1).enumerate() {
                if i == 0 {
                    eprintln!("\n    Caused by:");
                }
                eprintln!("      - {}", style(cause).red());
            }
            eprintln!();
        }
    }

    result
}

/// The library error kind somewhere in the cause chain, if any.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<VerifyError>())
        .map(VerifyError::kind)
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    match error_kind(err) {
        Some(kind) if kind.is_untrusted() => EXIT_UNTRUSTED,
        _ => EXIT_FAILURE,
    }
}

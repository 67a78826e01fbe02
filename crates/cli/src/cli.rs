use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plugin-sig",
    about = "Verify plugin release artifacts",
    long_about = "Verify plugin release artifacts with a detached OpenPGP signature or a Sigstore keyless certificate recorded in the Rekor transparency log."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a release artifact (keyless when --certificate is given, OpenPGP otherwise)
    Verify(VerifyArgs),

    /// Print the signing key that applies to a plugin source
    SigningKey {
        /// Plugin source as host/owner/repo
        #[arg(long)]
        source: String,

        /// ASCII-armored signing key file overriding the built-in key
        #[arg(long)]
        signing_key: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Plugin source as host/owner/repo (e.g. github.com/terraform-linters/tflint-ruleset-aws)
    #[arg(long)]
    pub source: String,

    /// Path to the release artifact
    #[arg(long)]
    pub artifact: PathBuf,

    /// Path to the signature (binary or armored OpenPGP, or base64 for keyless)
    #[arg(long)]
    pub signature: PathBuf,

    /// Path to the base64-encoded signing certificate (selects keyless verification)
    #[arg(long)]
    pub certificate: Option<PathBuf>,

    /// ASCII-armored signing key file (OpenPGP verification)
    #[arg(long)]
    pub signing_key: Option<PathBuf>,

    /// Rekor URL (keyless, default: https://rekor.sigstore.dev)
    #[arg(long)]
    pub rekor_url: Option<String>,

    /// Trust root cache directory (keyless, default: $TFLINT_TUF_ROOT or ~/.tflint.d/tufdata)
    #[arg(long)]
    pub tuf_root: Option<PathBuf>,

    /// Network timeout in seconds (keyless)
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

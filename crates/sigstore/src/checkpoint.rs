//! Signed tree-head checkpoints carried in inclusion proofs.
//!
//! A checkpoint is a signed note: a text body of origin, tree size and
//! base64 root hash, a blank line, then one signature line per signer of the
//! form `U+2014 <name> <base64(key hint || signature)>`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use plugin_sig_core::{Error, Result};

const SIGNATURE_PREFIX: &str = "\u{2014} ";
const KEY_HINT_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSignature {
    pub name: String,
    pub key_hint: [u8; KEY_HINT_LEN],
    pub signature: Vec<u8>,
}

/// The decoded body of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: Vec<u8>,
    pub other_content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    /// The signed text, including its trailing newline.
    note: String,
    pub checkpoint: Checkpoint,
    pub signatures: Vec<NoteSignature>,
}

impl SignedCheckpoint {
    pub fn parse(text: &str) -> Result<Self> {
        let Some((body, signature_block)) = text.split_once("\n\n") else {
            return Err(Error::malformed("checkpoint has no signature block"));
        };
        let note = format!("{body}\n");

        let mut lines = body.lines();
        let origin = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::malformed("checkpoint has no origin line"))?
            .to_string();
        let tree_size = lines
            .next()
            .and_then(|line| line.parse::<u64>().ok())
            .ok_or_else(|| Error::malformed("checkpoint has no valid tree size"))?;
        let root_hash = lines
            .next()
            .ok_or_else(|| Error::malformed("checkpoint has no root hash"))
            .and_then(|line| {
                STANDARD
                    .decode(line)
                    .map_err(|e| Error::malformed_with("invalid base64 checkpoint root hash", e))
            })?;
        let other_content = lines.map(str::to_string).collect();

        let signatures = signature_block
            .lines()
            .filter(|line| !line.is_empty())
            .map(parse_signature_line)
            .collect::<Result<Vec<_>>>()?;
        if signatures.is_empty() {
            return Err(Error::malformed("checkpoint is not signed"));
        }

        Ok(Self {
            note,
            checkpoint: Checkpoint {
                origin,
                tree_size,
                root_hash,
                other_content,
            },
            signatures,
        })
    }

    /// Verify the signature made by the log identified by `log_id`.
    pub fn verify(&self, log_id: &[u8], key: &VerifyingKey) -> Result<()> {
        let hint = log_id
            .get(..KEY_HINT_LEN)
            .ok_or_else(|| Error::malformed("log id is too short for a key hint"))?;

        let candidates: Vec<&NoteSignature> = self
            .signatures
            .iter()
            .filter(|sig| sig.key_hint == hint)
            .collect();
        if candidates.is_empty() {
            return Err(Error::verification(
                "checkpoint carries no signature from the transparency log",
            ));
        }

        for candidate in candidates {
            let Ok(signature) = Signature::from_der(&candidate.signature) else {
                continue;
            };
            if key.verify(self.note.as_bytes(), &signature).is_ok() {
                return Ok(());
            }
        }
        Err(Error::verification("checkpoint signature is invalid"))
    }
}

fn parse_signature_line(line: &str) -> Result<NoteSignature> {
    let rest = line
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| Error::malformed(format!("invalid checkpoint signature line: {line:?}")))?;
    let (name, encoded) = rest
        .rsplit_once(' ')
        .ok_or_else(|| Error::malformed("checkpoint signature line has no signature"))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| Error::malformed_with("invalid base64 checkpoint signature", e))?;
    if decoded.len() <= KEY_HINT_LEN {
        return Err(Error::malformed("checkpoint signature is truncated"));
    }
    let (hint, signature) = decoded.split_at(KEY_HINT_LEN);
    let mut key_hint = [0u8; KEY_HINT_LEN];
    key_hint.copy_from_slice(hint);
    Ok(NoteSignature {
        name: name.to_string(),
        key_hint,
        signature: signature.to_vec(),
    })
}

/// Render a checkpoint and sign it. Used to build test logs.
#[cfg(test)]
pub(crate) fn sign_checkpoint(
    checkpoint: &Checkpoint,
    log_id: &[u8],
    key: &p256::ecdsa::SigningKey,
) -> String {
    use p256::ecdsa::signature::Signer;

    let mut note = format!(
        "{}\n{}\n{}\n",
        checkpoint.origin,
        checkpoint.tree_size,
        STANDARD.encode(&checkpoint.root_hash)
    );
    for line in &checkpoint.other_content {
        note.push_str(line);
        note.push('\n');
    }
    let signature: Signature = key.sign(note.as_bytes());
    let mut payload = log_id[..KEY_HINT_LEN].to_vec();
    payload.extend_from_slice(signature.to_der().as_bytes());
    format!(
        "{note}\n{SIGNATURE_PREFIX}{} {}\n",
        checkpoint.origin.split(' ').next().unwrap_or_default(),
        STANDARD.encode(payload)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ecdsa_key;

    fn checkpoint() -> Checkpoint {
        Checkpoint {
            origin: "rekor.sigstore.dev - 1193050959916656506".into(),
            tree_size: 100,
            root_hash: vec![0xab; 32],
            other_content: vec![],
        }
    }

    #[test]
    fn parses_and_verifies() {
        let key = ecdsa_key(1);
        let log_id = [9u8; 32];
        let text = sign_checkpoint(&checkpoint(), &log_id, &key.signing);

        let signed = SignedCheckpoint::parse(&text).unwrap();
        assert_eq!(signed.checkpoint, checkpoint());
        assert_eq!(signed.signatures.len(), 1);
        assert_eq!(signed.signatures[0].name, "rekor.sigstore.dev");
        assert_eq!(signed.signatures[0].key_hint, [9u8; 4]);
        signed.verify(&log_id, &key.verifying).unwrap();
    }

    #[test]
    fn other_content_is_signed() {
        let key = ecdsa_key(1);
        let log_id = [9u8; 32];
        let mut cp = checkpoint();
        cp.other_content = vec!["Timestamp: 1704067320000000000".into()];
        let text = sign_checkpoint(&cp, &log_id, &key.signing);

        let signed = SignedCheckpoint::parse(&text).unwrap();
        assert_eq!(signed.checkpoint.other_content, cp.other_content);
        signed.verify(&log_id, &key.verifying).unwrap();
    }

    #[test]
    fn altered_tree_size_fails() {
        let key = ecdsa_key(1);
        let log_id = [9u8; 32];
        let text = sign_checkpoint(&checkpoint(), &log_id, &key.signing)
            .replacen("\n100\n", "\n101\n", 1);

        let signed = SignedCheckpoint::parse(&text).unwrap();
        assert_eq!(signed.checkpoint.tree_size, 101);
        let err = signed.verify(&log_id, &key.verifying).unwrap_err();
        assert_eq!(err.kind(), plugin_sig_core::ErrorKind::Verification);
    }

    #[test]
    fn signature_from_other_log_is_ignored() {
        let key = ecdsa_key(1);
        let text = sign_checkpoint(&checkpoint(), &[9u8; 32], &key.signing);
        let signed = SignedCheckpoint::parse(&text).unwrap();
        assert!(signed.verify(&[7u8; 32], &key.verifying).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let log_id = [9u8; 32];
        let text = sign_checkpoint(&checkpoint(), &log_id, &ecdsa_key(1).signing);
        let signed = SignedCheckpoint::parse(&text).unwrap();
        assert!(signed.verify(&log_id, &ecdsa_key(2).verifying).is_err());
    }

    #[test]
    fn unsigned_note_is_malformed() {
        let err = SignedCheckpoint::parse("origin\n1\nAAAA\n").unwrap_err();
        assert_eq!(err.kind(), plugin_sig_core::ErrorKind::Malformed);
    }
}

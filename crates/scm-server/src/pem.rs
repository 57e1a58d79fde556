//! Minimal PEM parser for certificates and private keys (RFC 7468), used
//! by [`crate::tls`] to load the mutual-TLS material §6 asks for.

use base64::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum PemError {
    #[error("invalid PEM format: {0}")]
    InvalidFormat(String),
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("no PEM blocks found")]
    NoPemBlocks,
}

#[derive(Debug)]
pub struct PemBlock {
    pub label: String,
    pub contents: Vec<u8>,
}

/// Parses PEM-encoded data and returns every block found:
/// ```text
/// -----BEGIN LABEL-----
/// base64data
/// -----END LABEL-----
/// ```
pub fn parse_pem(input: &[u8]) -> Result<Vec<PemBlock>, PemError> {
    let text = std::str::from_utf8(input).map_err(|_| PemError::InvalidFormat("not valid UTF-8".to_string()))?;

    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if let Some(label) = line.strip_prefix("-----BEGIN ").and_then(|s| s.strip_suffix("-----")) {
            let label = label.to_string();
            let mut base64_data = String::new();
            for line in lines.by_ref() {
                let line = line.trim();
                if let Some(end_label) = line.strip_prefix("-----END ").and_then(|s| s.strip_suffix("-----")) {
                    if end_label != label {
                        return Err(PemError::InvalidFormat(format!(
                            "mismatched PEM markers: BEGIN {label} but END {end_label}"
                        )));
                    }
                    let contents = BASE64_STANDARD.decode(base64_data.as_bytes())?;
                    blocks.push(PemBlock { label, contents });
                    break;
                }
                if !line.is_empty() {
                    base64_data.push_str(line);
                }
            }
        }
    }

    if blocks.is_empty() {
        return Err(PemError::NoPemBlocks);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_certificate() {
        let pem = b"-----BEGIN CERTIFICATE-----\nVGVzdERhdGExMjM0\n-----END CERTIFICATE-----";
        let blocks = parse_pem(pem).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].label, "CERTIFICATE");
        assert_eq!(blocks[0].contents, b"TestData1234");
    }

    #[test]
    fn rejects_mismatched_begin_end_markers() {
        let pem = b"-----BEGIN CERTIFICATE-----\ndata\n-----END PRIVATE KEY-----";
        assert!(matches!(parse_pem(pem), Err(PemError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_input_with_no_pem_blocks() {
        assert!(matches!(parse_pem(b"not pem at all"), Err(PemError::NoPemBlocks)));
    }
}

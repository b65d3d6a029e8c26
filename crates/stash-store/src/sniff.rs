//! Magic-number check of upload content against its declared type.
//!
//! The declared content type is a client claim. When a policy enables
//! sniffing, the first [`SNIFF_LEN`] bytes are compared with the signature of
//! the declared type. Types without a known signature pass unchanged.

use crate::error::PolicyError;
use crate::policy::essence;

/// Number of leading bytes the sniffer looks at.
pub const SNIFF_LEN: usize = 512;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
const PDF: &[u8] = b"%PDF-";
const ZIP: &[u8] = b"PK\x03\x04";
const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

/// Verify that `head` plausibly starts a file of `content_type`.
pub fn verify(content_type: &str, head: &[u8]) -> Result<(), PolicyError> {
    if matches_declared(&essence(content_type), head) {
        Ok(())
    } else {
        Err(PolicyError::ContentMismatch {
            declared: content_type.trim().to_owned(),
        })
    }
}

fn matches_declared(essence: &str, head: &[u8]) -> bool {
    let head = &head[..head.len().min(SNIFF_LEN)];
    match essence {
        "image/png" => head.starts_with(PNG),
        "image/jpeg" => head.starts_with(JPEG),
        "image/gif" => head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a"),
        "application/pdf" => head.starts_with(PDF),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            head.starts_with(ZIP)
        }
        "application/msword" | "application/vnd.ms-excel" => head.starts_with(OLE2),
        "video/mp4" => head.get(4..8) == Some(b"ftyp".as_slice()),
        "video/webm" => head.starts_with(EBML),
        "text/plain" => !head.contains(&0),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_signature() {
        let mut data = PNG.to_vec();
        data.extend_from_slice(&[0; 32]);
        assert!(verify("image/png", &data).is_ok());
        assert!(verify("image/png", b"not a png").is_err());
    }

    #[test]
    fn renamed_executable_is_caught() {
        let exe = b"MZ\x90\x00\x03\x00\x00\x00";
        let err = verify("image/jpeg", exe).unwrap_err();
        assert!(matches!(err, PolicyError::ContentMismatch { declared } if declared == "image/jpeg"));
    }

    #[test]
    fn mp4_ftyp_box() {
        assert!(verify("video/mp4", b"\x00\x00\x00\x18ftypmp42").is_ok());
        assert!(verify("video/mp4", b"\x00\x00").is_err());
    }

    #[test]
    fn office_formats() {
        assert!(verify(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            b"PK\x03\x04rest"
        )
        .is_ok());
        assert!(verify("application/msword", OLE2).is_ok());
        assert!(verify("application/vnd.ms-excel", b"PK\x03\x04").is_err());
    }

    #[test]
    fn text_rejects_nul_bytes() {
        assert!(verify("text/plain; charset=utf-8", b"hello\n").is_ok());
        assert!(verify("text/plain", b"").is_ok());
        assert!(verify("text/plain", b"bin\0ary").is_err());
    }

    #[test]
    fn nul_past_the_head_is_ignored() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0);
        assert!(verify("text/plain", &data).is_ok());
    }

    #[test]
    fn unknown_types_pass() {
        assert!(verify("application/octet-stream", b"\x00\x01").is_ok());
    }
}

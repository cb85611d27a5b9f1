//! Safety scanning of uploaded content.

/// Result of scanning a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Clean,
    Flagged(String),
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanResult::Clean)
    }
}

pub trait ContentScanner: Send + Sync {
    fn scan(&self, data: &[u8]) -> ScanResult;
}

/// Accepts everything. Used when scanning is disabled.
pub struct NoopScanner;

impl ContentScanner for NoopScanner {
    fn scan(&self, _data: &[u8]) -> ScanResult {
        ScanResult::Clean
    }
}

/// Standard antivirus test string
const EICAR_SIGNATURE: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// Flags known test signatures and native executables by their leading magic bytes.
pub struct SignatureScanner {
    signatures: Vec<(&'static str, &'static [u8])>,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self {
            signatures: vec![
                ("windows-executable", b"MZ"),
                ("elf-executable", b"\x7fELF"),
                ("mach-o-executable", b"\xcf\xfa\xed\xfe"),
                ("shell-script", b"#!"),
            ],
        }
    }
}

impl ContentScanner for SignatureScanner {
    fn scan(&self, data: &[u8]) -> ScanResult {
        if data
            .windows(EICAR_SIGNATURE.len())
            .any(|window| window == EICAR_SIGNATURE)
        {
            return ScanResult::Flagged("eicar-test-signature".to_string());
        }

        for (name, magic) in &self.signatures {
            if data.starts_with(magic) {
                return ScanResult::Flagged((*name).to_string());
            }
        }

        ScanResult::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eicar_flagged_anywhere() {
        let mut data = b"prefix bytes ".to_vec();
        data.extend_from_slice(b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*");
        let result = SignatureScanner::default().scan(&data);
        assert_eq!(result, ScanResult::Flagged("eicar-test-signature".to_string()));
    }

    #[test]
    fn test_executable_magic_flagged() {
        let scanner = SignatureScanner::default();
        assert!(!scanner.scan(b"\x7fELF\x02\x01\x01").is_clean());
        assert!(!scanner.scan(b"MZ\x90\x00").is_clean());
    }

    #[test]
    fn test_plain_content_clean() {
        let scanner = SignatureScanner::default();
        assert!(scanner.scan(b"just some text").is_clean());
        assert!(scanner.scan(b"\x89PNG\r\n\x1a\n").is_clean());
        assert!(NoopScanner.scan(b"MZ").is_clean());
    }
}

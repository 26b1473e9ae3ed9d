//! Recovery of entry names whose bytes were decoded with the wrong charset.
//!
//! Archivers on legacy systems often store names in a local multi-byte code
//! page (GBK, Shift_JIS, Big5). When such a name is read back through a
//! single-byte decoder every byte turns into one Latin-1 character, giving
//! strings like `ÖÐÎÄ.txt` instead of `中文.txt`. Because Latin-1 maps bytes
//! to code points one-to-one, the original bytes can be rebuilt and decoded
//! again with the right charset.
//!
//! Recovery works on each `/`-separated segment independently and never
//! fails: a segment that cannot be made plausible is replaced by the
//! uppercase hex of its bytes.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, BIG5, GB18030, SHIFT_JIS, UTF_8};

/// Charsets tried after the detector's guess when none are configured.
const FALLBACK_ENCODINGS: &[&Encoding] = &[UTF_8, GB18030, SHIFT_JIS, BIG5];

/// Best-effort filename recovery with an injectable candidate list.
#[derive(Debug, Clone, Default)]
pub struct PathRecovery {
    candidates: Vec<&'static Encoding>,
}

impl PathRecovery {
    /// Build a recovery strategy from encoding labels such as `"GBK"` or
    /// `"shift_jis"`.
    ///
    /// Unknown labels are logged and skipped. An empty list selects
    /// auto-detection followed by the built-in fallbacks.
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Self {
        let candidates = labels
            .iter()
            .filter_map(|label| {
                let label = label.as_ref();
                let encoding = Encoding::for_label(label.trim().as_bytes());
                if encoding.is_none() {
                    tracing::warn!(label, "unknown encoding label, ignoring");
                }
                encoding
            })
            .collect();

        Self { candidates }
    }

    /// Whether candidates come from the detector rather than configuration.
    pub fn is_auto(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Recover a path reported by the codec.
    ///
    /// Separators are normalized to `/`. The result is deterministic for a
    /// given input and candidate list.
    pub fn recover(&self, raw: &str) -> String {
        let unified = raw.replace('\\', "/");
        let recovered: Vec<String> = unified
            .split('/')
            .map(|segment| self.recover_segment(segment))
            .collect();
        let path = recovered.join("/");

        if path != unified {
            tracing::debug!(raw, recovered = %path, "recovered entry name");
        }
        path
    }

    fn recover_segment(&self, segment: &str) -> String {
        // Only strings made entirely of Latin-1 code points can be mojibake.
        if segment.is_ascii() || segment.chars().any(|c| u32::from(c) > 0xFF) {
            return segment.to_string();
        }

        let bytes: Vec<u8> = segment.chars().map(|c| u32::from(c) as u8).collect();

        if self.is_auto() {
            let mut detector = EncodingDetector::new();
            detector.feed(&bytes, true);
            let guess = detector.guess(None, true);

            // Bytes that look like a single-byte charset are taken as genuine
            // Latin text.
            if guess.is_single_byte() {
                return segment.to_string();
            }

            let ordered = std::iter::once(guess).chain(FALLBACK_ENCODINGS.iter().copied());
            if let Some(text) = first_plausible(&bytes, ordered) {
                return text;
            }
        } else if let Some(text) = first_plausible(&bytes, self.candidates.iter().copied()) {
            return text;
        }

        if is_plausible(segment) {
            segment.to_string()
        } else {
            to_hex(&bytes)
        }
    }
}

fn first_plausible(
    bytes: &[u8],
    encodings: impl Iterator<Item = &'static Encoding>,
) -> Option<String> {
    encodings
        .filter_map(|encoding| encoding.decode_without_bom_handling_and_without_replacement(bytes))
        .find(|text| is_plausible(text))
        .map(|text| text.into_owned())
}

fn is_plausible(text: &str) -> bool {
    !text.is_empty() && !text.chars().any(|c| c.is_control() || c == '\u{FFFD}')
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Simulate reading GBK bytes through a Latin-1 decoder.
    fn latin1_mojibake(text: &str, encoding: &'static Encoding) -> String {
        let (bytes, _, _) = encoding.encode(text);
        bytes.iter().map(|&b| char::from(b)).collect()
    }

    #[test]
    fn test_ascii_is_untouched() {
        let recovery = PathRecovery::default();
        assert_eq!(recovery.recover("dir1/file1.txt"), "dir1/file1.txt");
        assert_eq!(recovery.recover("dir1\\file1.txt"), "dir1/file1.txt");
    }

    #[test]
    fn test_latin1_names_are_kept() {
        let recovery = PathRecovery::default();
        for name in ["café.txt", "Größe.txt", "ü.txt", "naïve/résumé.pdf"] {
            assert_eq!(recovery.recover(name), name);
        }
    }

    #[test]
    fn test_proper_unicode_is_untouched() {
        let recovery = PathRecovery::new(&["GBK"]);
        assert_eq!(recovery.recover("中文/文件.txt"), "中文/文件.txt");
    }

    #[test]
    fn test_configured_gbk_recovers_chinese() {
        let garbled = latin1_mojibake("中文.txt", GB18030);
        assert_eq!(garbled, "ÖÐÎÄ.txt");

        let recovery = PathRecovery::new(&["GB18030"]);
        assert_eq!(recovery.recover(&garbled), "中文.txt");
        assert_eq!(recovery.recover(&format!("docs/{garbled}")), "docs/中文.txt");
    }

    #[test]
    fn test_configured_shift_jis() {
        let garbled = latin1_mojibake("日本", SHIFT_JIS);
        let recovery = PathRecovery::new(&["shift_jis"]);
        assert_eq!(recovery.recover(&garbled), "日本");
    }

    #[test]
    fn test_candidates_tried_in_order() {
        let garbled = latin1_mojibake("中文", GB18030);
        let recovery = PathRecovery::new(&["UTF-8", "GBK"]);
        assert_eq!(recovery.recover(&garbled), "中文");
    }

    #[test]
    fn test_unknown_labels_are_skipped() {
        let recovery = PathRecovery::new(&["no-such-charset"]);
        assert!(recovery.is_auto());
    }

    #[test]
    fn test_hex_fallback_for_undecodable_control_bytes() {
        let raw = "\u{85}\u{81}";
        let recovery = PathRecovery::new(&["UTF-8"]);
        assert_eq!(recovery.recover(raw), "8581");
        assert_eq!(recovery.recover(&format!("dir/{raw}")), "dir/8581");
    }

    #[test]
    fn test_latin_text_kept_when_no_candidate_fits() {
        let recovery = PathRecovery::new(&["UTF-8"]);
        assert_eq!(recovery.recover("café"), "café");
    }

    proptest! {
        #[test]
        fn prop_recover_is_deterministic(raw in "[\\x00-\\xff/]{0,24}") {
            let auto = PathRecovery::default();
            prop_assert_eq!(auto.recover(&raw), auto.recover(&raw));

            let configured = PathRecovery::new(&["GBK", "Big5"]);
            prop_assert_eq!(configured.recover(&raw), configured.recover(&raw));
        }
    }
}

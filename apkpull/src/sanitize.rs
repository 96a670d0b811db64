/// Characters that cannot appear in a file name on at least one common filesystem.
const ILLEGAL_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Removes characters that are illegal in file names.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_illegal_characters() {
        assert_eq!(sanitize_filename(r#"A\B/C:D*E?F"G<H>I|J"#), "ABCDEFGHIJ");
        assert_eq!(sanitize_filename("WhatsApp Business"), "WhatsApp Business");
        assert_eq!(sanitize_filename("1.0 (build 7)"), "1.0 (build 7)");
        assert_eq!(sanitize_filename("???"), "");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "plain",
            "<<>>",
            "a/b/c",
            r"C:\Users\x",
            "Ünïcödé: 日本語?",
            "tab\tand\nnewline|",
            "\"quoted\"",
        ];
        for sample in samples {
            let once = sanitize_filename(sample);
            assert_eq!(sanitize_filename(&once), once, "input {sample:?}");
            assert!(!once.contains(ILLEGAL_FILENAME_CHARS));
        }
    }
}

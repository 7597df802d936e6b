//! Rendering retrieved documents as prompt context.

/// Returned instead of an empty block when nothing matched.
pub const NO_RESULTS_SENTINEL: &str = "Không tìm thấy tài liệu phù hợp.";

/// A document returned by the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    /// Distance reported by the store (lower is closer).
    pub score: Option<f64>,
}

/// Join documents with a blank line, trimming each one.
///
/// With `with_score`, each document is suffixed ` [score=0.8421]`. Documents
/// whose text is blank are skipped; if none remain the sentinel is returned.
pub fn format_documents(docs: &[RetrievedDocument], with_score: bool) -> String {
    let rendered: Vec<String> = docs
        .iter()
        .filter(|d| !d.content.trim().is_empty())
        .map(|d| match (with_score, d.score) {
            (true, Some(score)) => format!("{} [score={score:.4}]", d.content.trim()),
            _ => d.content.trim().to_string(),
        })
        .collect();

    if rendered.is_empty() {
        NO_RESULTS_SENTINEL.to_string()
    } else {
        rendered.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, score: f64) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            score: Some(score),
        }
    }

    #[test]
    fn test_join_without_scores() {
        let docs = vec![doc("  Căn hộ 3PN Quận 7\n", 0.1), doc("Nhà phố Thủ Đức", 0.2)];
        assert_eq!(
            format_documents(&docs, false),
            "Căn hộ 3PN Quận 7\n\nNhà phố Thủ Đức"
        );
    }

    #[test]
    fn test_scores_four_decimals() {
        let docs = vec![doc("Căn hộ 3PN...", 0.842_06), doc("Đất nền", 1.0)];
        assert_eq!(
            format_documents(&docs, true),
            "Căn hộ 3PN... [score=0.8421]\n\nĐất nền [score=1.0000]"
        );
    }

    #[test]
    fn test_empty_is_sentinel_with_or_without_scores() {
        assert_eq!(format_documents(&[], true), NO_RESULTS_SENTINEL);
        assert_eq!(format_documents(&[], false), NO_RESULTS_SENTINEL);
    }

    #[test]
    fn test_blank_documents_skipped() {
        let docs = vec![doc("   ", 0.1)];
        assert_eq!(format_documents(&docs, false), NO_RESULTS_SENTINEL);
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let docs = vec![doc("A", 0.5), doc("B", 0.25)];
        assert_eq!(format_documents(&docs, true), format_documents(&docs, true));
    }
}

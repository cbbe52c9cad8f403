/// テーマラベルの正規化。
///
/// 比較・重複排除の前段として、ラベルを正準形へ変換します。
use unicode_normalization::UnicodeNormalization;

/// 末尾から繰り返し除去する接続詞・前置詞。
///
/// "machine learning and" のような抽出片の尻尾を落とすためのもので、
/// ラベル中間の語には適用しません。
const TRAILING_STOP_WORDS: &[&str] = &[
    "and", "or", "of", "for", "the", "a", "an", "in", "on", "at", "to", "with", "via",
];

/// ラベルを正準形へ正規化する。
///
/// NFC正規化、トリム、小文字化、内部空白の単一スペース化、
/// 末尾ストップワードの繰り返し除去を行います。
///
/// 冪等であることが保証されます: `normalize_label(normalize_label(x)) == normalize_label(x)`。
/// 失敗せず、常に文字列（空の場合もある）を返します。
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    let folded = raw.nfc().collect::<String>().to_lowercase();

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();

    // 複合的な末尾ストップワード（"... for the" など）に対応するため繰り返す
    while let Some(last) = tokens.last() {
        if TRAILING_STOP_WORDS.contains(last) {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("  Rust  ", "rust")]
    #[case("Machine   Learning", "machine learning")]
    #[case("machine learning and", "machine learning")]
    #[case("deep learning for the", "deep learning")]
    #[case("Машинное обучение  ", "машинное обучение")]
    #[case("", "")]
    #[case("and of the", "")]
    fn normalizes_expected_forms(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_label(raw), expected);
    }

    #[rstest]
    #[case("  Rust and WebAssembly for ")]
    #[case("ПРИВЕТ  МИР")]
    #[case("graph  databases and the")]
    #[case("")]
    fn normalization_is_idempotent(#[case] raw: &str) {
        let once = normalize_label(raw);
        assert_eq!(normalize_label(&once), once);
    }

    #[test]
    fn interior_stop_words_are_preserved() {
        assert_eq!(
            normalize_label("State of the Union"),
            "state of the union"
        );
        assert_eq!(normalize_label("internet of things"), "internet of things");
    }
}

use crate::domain::query::Language;

/// Share of ideographic characters above which text is treated as Chinese.
pub const CJK_RATIO_THRESHOLD: f64 = 0.30;

pub fn is_ideographic(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// Ideographic characters divided by non-whitespace characters.
pub fn cjk_ratio(text: &str) -> f64 {
    let (ideographic, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(cjk, total), c| {
            (cjk + usize::from(is_ideographic(c)), total + 1)
        });
    if total == 0 {
        return 0.0;
    }
    ideographic as f64 / total as f64
}

/// Classify the script of `text`. Empty or whitespace-only input is English.
pub fn detect_language(text: &str) -> Language {
    if cjk_ratio(text) > CJK_RATIO_THRESHOLD {
        Language::Zh
    } else {
        Language::En
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_detects_plain_scripts() {
        assert_eq!(detect_language("查找《三体》"), Language::Zh);
        assert_eq!(detect_language("Books by Liu Cixin"), Language::En);
    }

    #[test]
    fn test_empty_defaults_to_english() {
        assert_eq!(detect_language(""), Language::En);
        assert_eq!(detect_language("   \t\n"), Language::En);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // 3 of 10 non-space characters: exactly 0.30 stays English
        assert_eq!(detect_language("三体三abcdefg"), Language::En);
        // 4 of 10
        assert_eq!(detect_language("三体三体abcdef"), Language::Zh);
    }

    #[test]
    fn test_whitespace_is_ignored_in_ratio() {
        assert_eq!(detect_language("三 体 a b c d e"), Language::En);
        assert_eq!(detect_language("三   体   a b c"), Language::Zh);
    }

    #[test]
    fn test_random_mixes_follow_ratio() {
        const CJK: &[char] = &['书', '借', '阅', '图', '馆', '三', '体'];
        const LATIN: &[char] = &['a', 'B', 'z', '7', '?', '《', '》', '-'];

        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let len = rng.gen_range(0..40);
            let mut text = String::new();
            let mut cjk = 0usize;
            let mut total = 0usize;
            for _ in 0..len {
                match rng.gen_range(0..3) {
                    0 => {
                        text.push(CJK[rng.gen_range(0..CJK.len())]);
                        cjk += 1;
                        total += 1;
                    }
                    1 => {
                        text.push(LATIN[rng.gen_range(0..LATIN.len())]);
                        total += 1;
                    }
                    _ => text.push(' '),
                }
            }

            let expected = if total > 0 && (cjk as f64 / total as f64) > 0.30 {
                Language::Zh
            } else {
                Language::En
            };
            assert_eq!(detect_language(&text), expected, "input: {:?}", text);
        }
    }
}

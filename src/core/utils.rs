use wana_kana::{
    IsJapaneseChar,
    IsJapaneseStr,
};

/// Character positions of every kanji in `text`, in order of appearance.
pub fn kanji_positions(text: &str) -> Vec<(usize, char)> {
    text.chars().enumerate().filter(|(_, c)| c.is_kanji()).collect()
}

pub fn contains_kanji(text: &str) -> bool {
    text.chars().any(|c| c.is_kanji())
}

/// A written form can only be asked as a kanji question when it contains a kanji.
pub fn is_kanji_testable(written: &str) -> bool {
    !written.is_empty() && !written.is_kana() && contains_kanji(written)
}

//! Word lookups the study deck needs from the dictionary.

use crate::core::{
    ReadingIndex,
    WordId,
};

pub mod memory;

pub use memory::MemoryWordStore;

pub trait WordStore: Send + Sync {
    fn word_count(&self) -> usize;

    /// Written form of the word. Kana-only words return their kana here too.
    fn kanji(&self, word: WordId) -> Option<&str>;

    fn kana(&self, word: WordId) -> Option<&str>;

    /// Aligns the kana against the written form and returns which reading of the
    /// kanji at character `position` is used. `None` when the reading is irregular
    /// or the character has no ON/KUN reading.
    fn find_reading(&self, kanji: &str, kana: &str, position: usize) -> Option<ReadingIndex>;

    fn contains(&self, word: WordId) -> bool {
        (word.0 as usize) < self.word_count()
    }
}

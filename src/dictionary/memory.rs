use std::collections::HashMap;

use super::WordStore;
use crate::core::{
    ReadingIndex,
    WordId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEntry {
    pub kanji: String,
    pub kana: String,
    pub definition: String,
}

/// Word list held in memory, with an explicit reading-alignment table.
#[derive(Debug, Clone, Default)]
pub struct MemoryWordStore {
    words: Vec<WordEntry>,
    readings: HashMap<(String, usize), ReadingIndex>,
}

impl MemoryWordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kanji: &str, kana: &str, definition: &str) -> WordId {
        let id = WordId(self.words.len() as u32);
        self.words.push(WordEntry {
            kanji: kanji.to_string(),
            kana: kana.to_string(),
            definition: definition.to_string(),
        });
        id
    }

    /// Registers the reading used by the kanji at `position` of the written form.
    pub fn set_reading(&mut self, kanji: &str, position: usize, reading: ReadingIndex) {
        self.readings.insert((kanji.to_string(), position), reading);
    }

    pub fn entry(&self, word: WordId) -> Option<&WordEntry> {
        self.words.get(word.0 as usize)
    }

    /// Builds the store that results from keeping only the words `keep` selects,
    /// in order. Returns the new store and the old -> new mapping.
    pub fn retain_words(
        &self,
        keep: impl Fn(WordId, &WordEntry) -> bool,
    ) -> (Self, Vec<Option<WordId>>) {
        let mut next = Self { words: Vec::new(), readings: self.readings.clone() };
        let mut mapping = Vec::with_capacity(self.words.len());

        for (index, entry) in self.words.iter().enumerate() {
            let old = WordId(index as u32);
            if keep(old, entry) {
                mapping.push(Some(next.push(&entry.kanji, &entry.kana, &entry.definition)));
            } else {
                mapping.push(None);
            }
        }

        (next, mapping)
    }
}

impl WordStore for MemoryWordStore {
    fn word_count(&self) -> usize {
        self.words.len()
    }

    fn kanji(&self, word: WordId) -> Option<&str> {
        self.entry(word).map(|w| w.kanji.as_str())
    }

    fn kana(&self, word: WordId) -> Option<&str> {
        self.entry(word).map(|w| w.kana.as_str())
    }

    fn find_reading(&self, kanji: &str, _kana: &str, position: usize) -> Option<ReadingIndex> {
        self.readings.get(&(kanji.to_string(), position)).copied()
    }
}

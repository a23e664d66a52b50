use std::collections::{
    HashSet,
    VecDeque,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::{
        utils::kanji_positions,
        ReadingIndex,
        WordId,
    },
    dictionary::WordStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeWord {
    pub word: WordId,
    pub is_new: bool,
    pub failed: bool,
}

/// One kanji reading to drill, with the words that use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingEntry {
    pub kanji: char,
    pub reading: ReadingIndex,
    pub words: Vec<PracticeWord>,
}

impl ReadingEntry {
    fn key(&self) -> (char, ReadingIndex) {
        (self.kanji, self.reading)
    }
}

/// What the most recent `add` changed, so it can be taken back.
#[derive(Debug, Clone, Default, PartialEq)]
struct AddUndo {
    word: Option<WordId>,
    created: Vec<(char, ReadingIndex)>,
    appended: Vec<(char, ReadingIndex)>,
}

/// FIFO of kanji readings met in freshly tested words.
#[derive(Debug, Clone, Default)]
pub struct ReadingPracticeQueue {
    entries: VecDeque<ReadingEntry>,
    last_add: Option<AddUndo>,
}

impl PartialEq for ReadingPracticeQueue {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ReadingPracticeQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ReadingEntry> {
        self.entries.iter()
    }

    pub fn next_kanji(&self) -> Option<char> {
        self.entries.front().map(|e| e.kanji)
    }

    pub fn next_reading(&self) -> Option<ReadingIndex> {
        self.entries.front().map(|e| e.reading)
    }

    pub fn next_words(&self) -> &[PracticeWord] {
        self.entries.front().map(|e| e.words.as_slice()).unwrap_or(&[])
    }

    /// Queues every testable kanji reading of `word`. Returns how many readings
    /// were created or extended.
    pub fn add<W: WordStore + ?Sized>(
        &mut self,
        words: &W,
        word: WordId,
        is_new: bool,
        failed: bool,
    ) -> usize {
        let mut undo = AddUndo { word: Some(word), ..AddUndo::default() };

        if let (Some(kanji), Some(kana)) = (words.kanji(word), words.kana(word)) {
            let mut seen = HashSet::new();

            for (position, character) in kanji_positions(kanji) {
                let Some(reading) = words.find_reading(kanji, kana, position) else {
                    continue;
                };
                if !seen.insert((character, reading)) {
                    continue;
                }

                let practice = PracticeWord { word, is_new, failed };
                match self.entries.iter_mut().find(|e| e.key() == (character, reading)) {
                    Some(entry) => {
                        if entry.words.iter().any(|w| w.word == word) {
                            continue;
                        }
                        entry.words.push(practice);
                        undo.appended.push((character, reading));
                    }
                    None => {
                        self.entries.push_back(ReadingEntry {
                            kanji: character,
                            reading,
                            words: vec![practice],
                        });
                        undo.created.push((character, reading));
                    }
                }
            }
        }

        let touched = undo.created.len() + undo.appended.len();
        self.last_add = Some(undo);
        touched
    }

    /// Reverts the most recent `add`. Returns false when there is nothing to revert.
    pub fn undo_last_add(&mut self) -> bool {
        let Some(undo) = self.last_add.take() else {
            return false;
        };
        let Some(word) = undo.word else {
            return true;
        };

        for key in &undo.appended {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.key() == *key) {
                if let Some(at) = entry.words.iter().rposition(|w| w.word == word) {
                    entry.words.remove(at);
                }
            }
        }
        for key in &undo.created {
            if let Some(at) = self.entries.iter().position(|e| e.key() == *key) {
                self.entries.remove(at);
            }
        }
        true
    }

    /// Forgets the undo information, so the last `add` becomes permanent.
    pub fn commit(&mut self) {
        self.last_add = None;
    }

    /// Consumes the front reading.
    pub fn reading_answered(&mut self) -> Option<ReadingEntry> {
        let entry = self.entries.pop_front()?;
        if let Some(undo) = &mut self.last_add {
            undo.created.retain(|key| *key != entry.key());
            undo.appended.retain(|key| *key != entry.key());
        }
        Some(entry)
    }

    /// Renumbers words after the word store changed. Words that map to `None`
    /// are dropped, and so are entries left without words.
    pub(crate) fn reconcile(&mut self, target: impl Fn(WordId) -> Option<WordId>) -> usize {
        let before = self.entries.len();

        for entry in self.entries.iter_mut() {
            let mut seen = HashSet::new();
            entry.words = entry
                .words
                .iter()
                .filter_map(|w| target(w.word).map(|word| PracticeWord { word, ..*w }))
                .filter(|w| seen.insert(w.word))
                .collect();
        }
        self.entries.retain(|e| !e.words.is_empty());

        if let Some(undo) = &mut self.last_add {
            undo.word = undo.word.and_then(&target);
        }

        before - self.entries.len()
    }

    pub(crate) fn from_persisted(entries: Vec<ReadingEntry>) -> Self {
        Self { entries: entries.into(), last_add: None }
    }

    pub(crate) fn to_persisted(&self) -> Vec<ReadingEntry> {
        self.entries.iter().cloned().collect()
    }
}

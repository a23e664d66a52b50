use std::collections::BTreeMap;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    GroupHandle,
    ItemId,
    QuestionType,
    QuestionTypes,
    Result,
    StudyError,
    WordId,
};

/// Per-word aggregate shared by every item of one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub word: WordId,
    pub types: QuestionTypes,
    pub last_included: Option<DateTime<Utc>>,
    pub group: Option<GroupHandle>,
    #[serde(skip)]
    slots: [Option<ItemId>; 3],
}

impl WordRecord {
    pub fn new(word: WordId) -> Self {
        Self {
            word,
            types: QuestionTypes::empty(),
            last_included: None,
            group: None,
            slots: [None; 3],
        }
    }

    pub fn item(&self, question: QuestionType) -> Option<ItemId> {
        self.slots[question.slot()]
    }

    pub fn items(&self) -> impl Iterator<Item = (QuestionType, ItemId)> + '_ {
        QuestionType::ALL.into_iter().filter_map(|q| self.item(q).map(|id| (q, id)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub(crate) fn attach(&mut self, question: QuestionType, item: ItemId) -> Result<()> {
        if let Some(existing) = self.slots[question.slot()] {
            return Err(StudyError::InvalidOperation(format!(
                "word {} already has {:?} item {}",
                self.word, question, existing
            )));
        }
        self.slots[question.slot()] = Some(item);
        self.types.insert(question.flag());
        Ok(())
    }

    pub(crate) fn detach(&mut self, question: QuestionType) -> Option<ItemId> {
        let item = self.slots[question.slot()].take();
        self.types.remove(question.flag());
        item
    }

    pub(crate) fn include(&mut self, at: DateTime<Utc>) {
        self.last_included = Some(self.last_included.map_or(at, |last| last.max(at)));
    }

    /// Takes over group ownership from a record being folded into this one.
    /// Both groups existing is resolved by the caller through the engine.
    pub(crate) fn adopt_group(
        &mut self,
        other: Option<GroupHandle>,
    ) -> Option<(GroupHandle, GroupHandle)> {
        match (self.group, other) {
            (None, other) => {
                self.group = other;
                None
            }
            (Some(main), Some(other)) if main != other => Some((main, other)),
            _ => None,
        }
    }
}

/// Word records keyed by word. A record lives exactly as long as one of its
/// slots is filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    records: BTreeMap<WordId, WordRecord>,
}

impl RecordTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, word: WordId) -> Option<&WordRecord> {
        self.records.get(&word)
    }

    pub(crate) fn get_mut(&mut self, word: WordId) -> Option<&mut WordRecord> {
        self.records.get_mut(&word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WordRecord> {
        self.records.values()
    }

    pub(crate) fn entry(&mut self, word: WordId) -> &mut WordRecord {
        self.records.entry(word).or_insert_with(|| WordRecord::new(word))
    }

    pub(crate) fn attach(
        &mut self,
        word: WordId,
        question: QuestionType,
        item: ItemId,
    ) -> Result<()> {
        self.entry(word).attach(question, item)
    }

    /// Clears a slot. The record is dropped with its last item and returned.
    pub(crate) fn detach(&mut self, word: WordId, question: QuestionType) -> Option<WordRecord> {
        let record = self.records.get_mut(&word)?;
        record.detach(question);
        if record.is_empty() {
            self.records.remove(&word)
        } else {
            None
        }
    }

    pub(crate) fn take(&mut self, word: WordId) -> Option<WordRecord> {
        self.records.remove(&word)
    }

    pub(crate) fn insert(&mut self, record: WordRecord) {
        self.records.insert(record.word, record);
    }

    pub(crate) fn drain(&mut self) -> Vec<WordRecord> {
        std::mem::take(&mut self.records).into_values().collect()
    }

    /// Loads persisted records. Slots are filled afterwards from the item lists.
    pub(crate) fn from_persisted(records: Vec<WordRecord>) -> Result<Self> {
        let mut table = Self::default();
        for mut record in records {
            record.slots = [None; 3];
            if table.records.contains_key(&record.word) {
                let message = format!("word {} stored twice", record.word);
                return Err(StudyError::CorruptDeck(message));
            }
            table.records.insert(record.word, record);
        }
        Ok(table)
    }

    /// Fills a slot of a loaded record without touching its stored type bits.
    pub(crate) fn restore_slot(
        &mut self,
        word: WordId,
        question: QuestionType,
        item: ItemId,
    ) -> Result<()> {
        let Some(record) = self.records.get_mut(&word) else {
            let message = format!("item {} has no record for word {}", item, word);
            return Err(StudyError::CorruptDeck(message));
        };
        if record.slots[question.slot()].replace(item).is_some() {
            return Err(StudyError::CorruptDeck(format!(
                "word {} has two {:?} items",
                word, question
            )));
        }
        Ok(())
    }
}

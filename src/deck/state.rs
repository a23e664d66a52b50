use std::collections::HashSet;

use chrono::NaiveDate;
use log::info;

use super::{
    due::{
        DueIndex,
        EngineKeys,
        FailedIndex,
    },
    items::{
        FreeQueue,
        LockedStore,
    },
    readings::ReadingPracticeQueue,
    records::RecordTable,
};
use crate::{
    core::{
        DeckHandle,
        ItemId,
        MainHint,
        QuestionType,
        QuestionTypes,
        Result,
        StudyError,
        WordId,
    },
    engine::SrsEngine,
};

/// Everything the scheduler knows about one deck.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckState {
    pub name: String,
    pub engine_deck: DeckHandle,
    pub last_test_day: Option<NaiveDate>,
    pub last_new_count: u32,
    pub new_count: u32,
    pub records: RecordTable,
    pub free: FreeQueue,
    pub locked: LockedStore,
    pub readings: ReadingPracticeQueue,
    pub due: DueIndex,
    pub failed: FailedIndex,
    pub(crate) next_item: u64,
}

/// Read-only description of one item, free or locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,
    pub word: WordId,
    pub question: QuestionType,
    pub main_hint: MainHint,
    pub priority: Option<u8>,
    pub locked: bool,
}

impl DeckState {
    pub fn new(name: &str, engine_deck: DeckHandle) -> Self {
        Self {
            name: name.to_string(),
            engine_deck,
            last_test_day: None,
            last_new_count: 0,
            new_count: 0,
            records: RecordTable::default(),
            free: FreeQueue::default(),
            locked: LockedStore::default(),
            readings: ReadingPracticeQueue::default(),
            due: DueIndex::default(),
            failed: FailedIndex::default(),
            next_item: 1,
        }
    }

    pub(crate) fn allocate_item(&mut self) -> ItemId {
        let id = ItemId(self.next_item);
        self.next_item += 1;
        id
    }

    pub fn item(&self, id: ItemId) -> Option<ItemInfo> {
        if let Ok(item) = self.free.get(id) {
            return Some(ItemInfo {
                id,
                word: item.word,
                question: item.question,
                main_hint: item.main_hint,
                priority: Some(item.priority()),
                locked: false,
            });
        }
        self.locked.get(id).ok().map(|item| ItemInfo {
            id,
            word: item.word,
            question: item.question,
            main_hint: item.main_hint,
            priority: None,
            locked: true,
        })
    }

    pub fn word_of(&self, id: ItemId) -> Option<WordId> {
        self.item(id).map(|info| info.word)
    }

    pub fn item_count(&self) -> usize {
        self.free.len() + self.locked.len()
    }

    /// Checks every structural invariant of the deck.
    pub fn verify<E: SrsEngine + ?Sized>(&self, engine: &E) -> Result<()> {
        let corrupt = |message: String| Err(StudyError::CorruptDeck(message));

        let mut seen_items = HashSet::new();
        for (id, word, question) in self
            .free
            .iter()
            .map(|i| (i.id, i.word, i.question))
            .chain(self.locked.iter().map(|i| (i.id, i.word, i.question)))
        {
            if !seen_items.insert(id) {
                return corrupt(format!("item {} is both free and locked", id));
            }
            if id.0 >= self.next_item {
                return corrupt(format!("item {} is beyond the id counter", id));
            }
            match self.records.get(word) {
                Some(record) if record.item(question) == Some(id) => {}
                _ => return corrupt(format!("item {} is not registered on word {}", id, word)),
            }
        }

        for record in self.records.iter() {
            if record.is_empty() {
                return corrupt(format!("word {} has a record but no items", record.word));
            }
            let held = record
                .items()
                .fold(QuestionTypes::empty(), |types, (question, _)| types | question.flag());
            if held != record.types {
                return corrupt(format!("word {} type bits do not match its items", record.word));
            }
        }

        let mut placed = HashSet::new();
        for id in self.due.iter().chain(self.failed.iter()) {
            if !self.locked.contains(id) {
                return corrupt(format!("indexed item {} is not locked", id));
            }
            if !placed.insert(id) {
                return corrupt(format!("item {} is indexed twice", id));
            }
        }
        if placed.len() != self.locked.len() {
            return corrupt(format!(
                "{} locked items but {} indexed",
                self.locked.len(),
                placed.len()
            ));
        }

        if !self.due.is_sorted(&EngineKeys::new(&self.locked, engine)) {
            return corrupt("due index is out of order".to_string());
        }

        Ok(())
    }
}

/// Deck state together with the engine it schedules against. Shared read-only
/// with the prefetch task; mutated only from the foreground.
pub struct DeckCore<E> {
    pub state: DeckState,
    pub engine: E,
}

impl<E: SrsEngine> DeckCore<E> {
    pub fn new(state: DeckState, engine: E) -> Self {
        Self { state, engine }
    }

    pub fn today(&self) -> NaiveDate {
        self.engine.test_day()
    }

    pub fn due_today(&self) -> usize {
        let keys = EngineKeys::new(&self.state.locked, &self.engine);
        self.state.due.due_count(self.today(), &keys)
    }

    /// Rolls the deck over to the engine's current test day: yesterday's
    /// failures become due again and the new-item counter restarts.
    pub fn begin_test_day(&mut self) -> bool {
        let today = self.engine.test_day();
        if self.state.last_test_day == Some(today) {
            return false;
        }

        let engine_rolled = self.engine.start_test_day();
        let state = &mut self.state;
        let retried = state.failed.take_all();
        {
            let keys = EngineKeys::new(&state.locked, &self.engine);
            for id in &retried {
                state.due.insert(*id, &keys);
            }
        }

        state.last_new_count = state.new_count;
        state.new_count = 0;
        state.last_test_day = Some(today);

        info!(
            "deck '{}' starts test day {} ({} failed items retried, engine rolled: {})",
            state.name,
            today,
            retried.len(),
            engine_rolled
        );
        true
    }
}

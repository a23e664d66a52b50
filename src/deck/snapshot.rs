use std::{
    io::{
        Read,
        Write,
    },
    path::Path,
    sync::Arc,
};

use chrono::NaiveDate;
use log::info;
use serde::{
    Deserialize,
    Serialize,
};

use super::{
    due::{
        DueIndex,
        EngineKeys,
        FailedIndex,
    },
    items::{
        FreeItem,
        FreeQueue,
        LockedItem,
        LockedStore,
    },
    readings::{
        ReadingEntry,
        ReadingPracticeQueue,
    },
    records::{
        RecordTable,
        WordRecord,
    },
    state::DeckState,
    StudyDeck,
};
use crate::{
    core::{
        Clock,
        DeckHandle,
        ItemId,
        Result,
    },
    dictionary::WordStore,
    engine::SrsEngine,
    persistence::{
        decode_from_reader,
        encode_to_writer,
        get_deck_file_path,
        load_binary_from,
        save_binary_to,
    },
    settings::DeckSettings,
};

/// On-disk layout of a deck. Field order is the encoding order; the item id
/// counter trails the indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSnapshot {
    pub name: String,
    pub engine_deck: DeckHandle,
    pub last_test_day: Option<NaiveDate>,
    pub last_new_count: u32,
    pub new_count: u32,
    pub records: Vec<WordRecord>,
    pub free: Vec<FreeItem>,
    pub locked: Vec<LockedItem>,
    pub readings: Vec<ReadingEntry>,
    pub due: Vec<ItemId>,
    pub failed: Vec<ItemId>,
    pub next_item: u64,
}

impl DeckSnapshot {
    pub fn capture(state: &DeckState) -> Self {
        Self {
            name: state.name.clone(),
            engine_deck: state.engine_deck,
            last_test_day: state.last_test_day,
            last_new_count: state.last_new_count,
            new_count: state.new_count,
            records: state.records.iter().cloned().collect(),
            free: state.free.to_persisted(),
            locked: state.locked.to_persisted(),
            readings: state.readings.to_persisted(),
            due: state.due.to_persisted(),
            failed: state.failed.to_persisted(),
            next_item: state.next_item,
        }
    }

    /// Rebuilds the deck state and checks it against the engine. Record slots
    /// are refilled from the item lists and the due order is re-derived.
    pub fn restore<E: SrsEngine + ?Sized>(self, engine: &E) -> Result<DeckState> {
        let mut records = RecordTable::from_persisted(self.records)?;
        let free = FreeQueue::from_persisted(self.free)?;
        let locked = LockedStore::from_persisted(self.locked)?;

        let placements = free
            .iter()
            .map(|item| (item.id, item.word, item.question))
            .chain(locked.iter().map(|item| (item.id, item.word, item.question)));
        let mut highest = 0;
        for (id, word, question) in placements {
            records.restore_slot(word, question, id)?;
            highest = highest.max(id.0);
        }

        let mut due = DueIndex::from_persisted(self.due);
        due.rebuild(|_| true, &EngineKeys::new(&locked, engine));

        let state = DeckState {
            name: self.name,
            engine_deck: self.engine_deck,
            last_test_day: self.last_test_day,
            last_new_count: self.last_new_count,
            new_count: self.new_count,
            records,
            free,
            locked,
            readings: ReadingPracticeQueue::from_persisted(self.readings),
            due,
            failed: FailedIndex::from_persisted(self.failed),
            next_item: self.next_item.max(highest + 1),
        };
        state.verify(engine)?;
        Ok(state)
    }
}

impl<E: SrsEngine + 'static, W: WordStore> StudyDeck<E, W> {
    pub fn save_to_writer<T: Write>(&self, writer: &mut T) -> Result<usize> {
        encode_to_writer(&DeckSnapshot::capture(&self.core.state), writer)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        save_binary_to(&DeckSnapshot::capture(&self.core.state), path)?;
        info!("deck '{}' saved to {}", self.core.state.name, path.display());
        Ok(())
    }

    /// Saves to the deck's file in the application data directory.
    pub fn save(&self) -> Result<()> {
        self.save_to_file(&get_deck_file_path(self.name()))
    }

    pub fn load(
        name: &str,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Result<Self> {
        Self::load_from_file(&get_deck_file_path(name), engine, words, clock, settings)
    }

    /// Loads a deck saved with `save_to_writer`. `engine` must hold the cards
    /// the deck was saved with.
    pub fn load_from_reader<T: Read>(
        reader: &mut T,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Result<Self> {
        let snapshot: DeckSnapshot = decode_from_reader(reader)?;
        Self::from_snapshot(snapshot, engine, words, clock, settings)
    }

    fn from_snapshot(
        snapshot: DeckSnapshot,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Result<Self> {
        let state = snapshot.restore(&engine)?;
        Ok(Self::from_state(state, engine, words, clock, settings))
    }

    pub fn load_from_file(
        path: &Path,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Result<Self> {
        let snapshot: DeckSnapshot = load_binary_from(path)?;
        let deck = Self::from_snapshot(snapshot, engine, words, clock, settings)?;
        info!(
            "deck '{}' loaded from {}: {} new, {} studied",
            deck.name(),
            path.display(),
            deck.queue_size(),
            deck.studied_size()
        );
        Ok(deck)
    }
}

//! The study deck: item queues, due tracking and next-item selection.

mod answer;
mod due;
mod items;
mod prefetch;
mod queue;
mod readings;
mod reconcile;
mod records;
mod scheduler;
mod snapshot;
mod state;

#[cfg(test)]
mod deck_tests;

use std::{
    sync::{
        atomic::AtomicBool,
        Arc,
    },
    time::Duration,
};

use chrono::TimeDelta;
use log::warn;
use rand::{
    rngs::StdRng,
    Rng,
    SeedableRng,
};

pub use due::{
    DueIndex,
    DueKey,
    DueKeySource,
    FailedIndex,
};
pub use items::{
    Free,
    FreeItem,
    FreeQueue,
    ItemKind,
    Locked,
    LockedItem,
    LockedStore,
    StudyItem,
};
pub use readings::{
    PracticeWord,
    ReadingEntry,
    ReadingPracticeQueue,
};
pub use reconcile::{
    ReconcileReport,
    WordMapping,
};
pub use records::{
    RecordTable,
    WordRecord,
};
pub use scheduler::NextItem;
pub use snapshot::DeckSnapshot;
pub use state::{
    DeckState,
    ItemInfo,
};

use self::{
    answer::AnswerRecord,
    prefetch::PrefetchTask,
    scheduler::SelectionInput,
    state::DeckCore,
};
use crate::{
    core::{
        AnswerQuality,
        Clock,
        DeckHandle,
        ItemId,
        MainHint,
        QuestionType,
        QuestionTypes,
        ReadingIndex,
        Result,
        StudyError,
        WordId,
    },
    dictionary::WordStore,
    engine::SrsEngine,
    settings::DeckSettings,
};

/// A deck being studied.
///
/// After every answer the following item is computed on a worker thread, so
/// `next_index` usually returns without doing the work itself. Every mutating
/// call first cancels that worker and waits for it to exit.
pub struct StudyDeck<E, W> {
    core: Arc<DeckCore<E>>,
    words: Arc<W>,
    clock: Arc<dyn Clock>,
    settings: DeckSettings,
    rng: StdRng,
    current: Option<ItemId>,
    previous: Option<ItemId>,
    last_answer: Option<AnswerRecord>,
    prefetch: Option<PrefetchTask>,
}

impl<E: SrsEngine + 'static, W: WordStore> StudyDeck<E, W> {
    pub fn new(
        name: &str,
        engine_deck: DeckHandle,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Self {
        Self::from_state(DeckState::new(name, engine_deck), engine, words, clock, settings)
    }

    pub(crate) fn from_state(
        state: DeckState,
        engine: E,
        words: Arc<W>,
        clock: Arc<dyn Clock>,
        settings: DeckSettings,
    ) -> Self {
        Self {
            core: Arc::new(DeckCore::new(state, engine)),
            words,
            clock,
            settings: settings.validated(),
            rng: StdRng::from_rng(&mut rand::rng()),
            current: None,
            previous: None,
            last_answer: None,
            prefetch: None,
        }
    }

    /// Makes the short-interval roll reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.core.state.name
    }

    pub fn state(&self) -> &DeckState {
        &self.core.state
    }

    pub fn engine(&self) -> &E {
        &self.core.engine
    }

    pub fn words(&self) -> &Arc<W> {
        &self.words
    }

    pub fn settings(&self) -> &DeckSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: DeckSettings) {
        self.settings = settings.validated();
    }

    fn selection_input(&mut self) -> SelectionInput {
        let state = &self.core.state;
        SelectionInput {
            now: self.clock.now(),
            previous: self.previous,
            prefer_short_interval: self.rng.random_bool(self.settings.short_interval_chance),
            new_quota_left: self.settings.new_items_per_day.saturating_sub(state.new_count),
            cooldown: self.settings.cooldown(),
        }
    }

    fn start_prefetch(&mut self) {
        let input = self.selection_input();
        match prefetch::spawn(&self.core, input) {
            Ok(task) => self.prefetch = Some(task),
            Err(e) => warn!("next item will be computed on demand: {}", e),
        }
    }

    fn select_now(&mut self) -> Result<Option<NextItem>> {
        let input = self.selection_input();
        let abort = AtomicBool::new(false);
        scheduler::select_next(&self.core.state, &self.core.engine, &input, &abort)
            .map_err(|_| StudyError::TaskFailed("next item selection was aborted".to_string()))
    }

    /// Drops references to items that no longer exist.
    fn forget_missing_items(&mut self) {
        let state = &self.core.state;
        if self.current.is_some_and(|id| state.item(id).is_none()) {
            self.current = None;
        }
        if self.previous.is_some_and(|id| state.item(id).is_none()) {
            self.previous = None;
        }
        if self.last_answer.is_some_and(|last| !state.locked.contains(last.item)) {
            self.last_answer = None;
        }
    }

    /// Rolls over to the engine's test day if it moved on. Returns true when a
    /// new day began.
    pub fn start_test_day(&mut self) -> Result<bool> {
        if self.core.state.last_test_day == Some(self.core.engine.test_day()) {
            return Ok(false);
        }
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        Ok(core.begin_test_day())
    }

    /// Picks the item to ask next and makes it current. Uses the prefetched
    /// selection when one is running, blocking until it is done.
    pub fn next_index(&mut self) -> Result<Option<NextItem>> {
        self.start_test_day()?;

        let next = match self.prefetch.take().and_then(prefetch::collect) {
            Some(next) => next,
            None => self.select_now()?,
        };
        self.current = next.map(NextItem::id);
        Ok(next)
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.current
    }

    fn current_info(&self) -> Option<ItemInfo> {
        self.current.and_then(|id| self.core.state.item(id))
    }

    pub fn next_word(&self) -> Option<WordId> {
        self.current_info().map(|info| info.word)
    }

    pub fn next_question_type(&self) -> Option<QuestionType> {
        self.current_info().map(|info| info.question)
    }

    pub fn next_main_hint(&self) -> Option<MainHint> {
        self.current_info().map(|info| info.main_hint)
    }

    /// Grades the current item and starts computing the next one. Returns the
    /// time until the item is due again.
    pub fn answer(&mut self, quality: AnswerQuality, elapsed: Duration) -> Result<TimeDelta> {
        let item = self.current.ok_or(StudyError::NoCurrentItem)?;
        let now = self.clock.now();

        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let (record, eta) = answer::answer_item(core, &*self.words, item, quality, elapsed, now)?;

        self.last_answer = Some(record);
        self.previous = Some(item);
        self.current = None;
        self.start_prefetch();
        Ok(eta)
    }

    /// Replaces the grade given by the most recent `answer`.
    pub fn change_last_answer(&mut self, quality: AnswerQuality) -> Result<TimeDelta> {
        let last = self.last_answer.ok_or_else(|| {
            StudyError::InvalidOperation("there is no answer to change".to_string())
        })?;

        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let (record, eta) = answer::change_answer(core, &*self.words, &last, quality)?;

        self.last_answer = Some(record);
        if self.current.is_none() {
            self.start_prefetch();
        }
        Ok(eta)
    }

    /// Queues the requested question types of each word with the default
    /// priority. Returns how many items were created.
    pub fn queue_word_items(&mut self, requests: &[(WordId, QuestionTypes)]) -> Result<usize> {
        let priority = self.settings.default_priority;
        self.queue_word_items_with(requests, priority, MainHint::Default)
    }

    pub fn queue_word_items_with(
        &mut self,
        requests: &[(WordId, QuestionTypes)],
        priority: u8,
        main_hint: MainHint,
    ) -> Result<usize> {
        let now = self.clock.now();
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        queue::queue_word_items(core, &*self.words, requests, priority, main_hint, now)
    }

    pub fn remove_queued_items(&mut self, items: &[ItemId]) -> Result<usize> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let removed = queue::remove_queued_items(core, items)?;
        self.forget_missing_items();
        Ok(removed)
    }

    /// Removes locked items and deletes their cards from the engine.
    pub fn remove_studied_items(&mut self, items: &[ItemId]) -> Result<usize> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let removed = queue::remove_studied_items(core, items)?;
        self.forget_missing_items();
        Ok(removed)
    }

    /// Resets locked items to new items, dropping their study history.
    pub fn requeue_studied_items(&mut self, items: &[ItemId], priority: u8) -> Result<usize> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let requeued = queue::requeue_studied_items(core, items, priority)?;
        self.forget_missing_items();
        Ok(requeued)
    }

    pub fn set_queued_priority(&mut self, items: &[ItemId], priority: u8) -> Result<()> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        queue::set_queued_priority(core, items, priority)
    }

    pub fn set_main_hint(&mut self, item: ItemId, hint: MainHint) -> Result<()> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        queue::set_main_hint(core, item, hint)
    }

    /// Locked items due by the end of the current test day.
    pub fn due_size(&self) -> usize {
        self.core.due_today()
    }

    /// New items that may still be shown today.
    pub fn new_size(&self) -> usize {
        let state = &self.core.state;
        let quota = self.settings.new_items_per_day.saturating_sub(state.new_count);
        state.free.len().min(quota as usize)
    }

    pub fn failed_size(&self) -> usize {
        self.core.state.failed.len()
    }

    /// All items waiting for their first test.
    pub fn queue_size(&self) -> usize {
        self.core.state.free.len()
    }

    pub fn studied_size(&self) -> usize {
        self.core.state.locked.len()
    }

    pub fn studied_today(&self) -> u32 {
        self.core.state.new_count
    }

    pub fn new_count_yesterday(&self) -> u32 {
        self.core.state.last_new_count
    }

    pub fn item(&self, id: ItemId) -> Option<ItemInfo> {
        self.core.state.item(id)
    }

    pub fn word_record(&self, word: WordId) -> Option<&WordRecord> {
        self.core.state.records.get(word)
    }

    pub fn items_for_word(&self, word: WordId) -> Vec<ItemInfo> {
        let state = &self.core.state;
        state
            .records
            .get(word)
            .map(|record| record.items().filter_map(|(_, id)| state.item(id)).collect())
            .unwrap_or_default()
    }

    /// Spacing the engine would give the item after its next correct answer.
    pub fn item_eta(&self, id: ItemId) -> Option<TimeDelta> {
        let item = self.core.state.locked.get(id).ok()?;
        self.core.engine.card_eta(item.card())
    }

    pub fn practice_size(&self) -> usize {
        self.core.state.readings.len()
    }

    pub fn next_practice_kanji(&self) -> Option<char> {
        self.core.state.readings.next_kanji()
    }

    pub fn next_practice_reading(&self) -> Option<ReadingIndex> {
        self.core.state.readings.next_reading()
    }

    pub fn next_practice_words(&self) -> &[PracticeWord] {
        self.core.state.readings.next_words()
    }

    /// Consumes the front reading of the practice queue.
    pub fn practice_reading_answered(&mut self) -> Result<Option<ReadingEntry>> {
        let resume = self.prefetch.is_some();
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let entry = core.state.readings.reading_answered();
        if resume {
            self.start_prefetch();
        }
        Ok(entry)
    }

    /// Moves the deck onto a reorganized word store. `mapping` maps word ids
    /// of the current store to ids of `new_words`.
    pub fn apply_changes(
        &mut self,
        mapping: &WordMapping,
        new_words: Arc<W>,
    ) -> Result<ReconcileReport> {
        let core = prefetch::exclusive(&mut self.core, &mut self.prefetch)?;
        let report = reconcile::apply_changes(core, &*self.words, &*new_words, mapping);
        self.words = new_words;
        self.forget_missing_items();
        Ok(report)
    }

    pub fn verify(&self) -> Result<()> {
        self.core.state.verify(&self.core.engine)
    }
}

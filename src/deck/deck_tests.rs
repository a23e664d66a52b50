use std::{
    io::Cursor,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use chrono::{
    DateTime,
    NaiveDate,
    TimeDelta,
    TimeZone,
    Utc,
};

use super::*;
use crate::{
    core::{
        CardId,
        GroupHandle,
        ManualClock,
    },
    dictionary::MemoryWordStore,
    engine::{
        MemoryEngine,
        NewCard,
    },
};

type TestDeck = StudyDeck<MemoryEngine, MemoryWordStore>;

const NIHON: WordId = WordId(0);
const NEKO: WordId = WordId(1);
const ARIGATOU: WordId = WordId(2);
const GAKKOU: WordId = WordId(3);

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap()
}

fn words() -> MemoryWordStore {
    let mut store = MemoryWordStore::new();
    store.push("日本", "にほん", "Japan");
    store.push("猫", "ねこ", "cat");
    store.push("ありがとう", "ありがとう", "thank you");
    store.push("学校", "がっこう", "school");
    store.set_reading("日本", 0, 0);
    store.set_reading("日本", 1, 0);
    store.set_reading("猫", 0, 1);
    store.set_reading("学校", 0, 0);
    store.set_reading("学校", 1, 0);
    store
}

fn settings() -> DeckSettings {
    DeckSettings { short_interval_chance: 0.0, ..DeckSettings::default() }
}

fn deck_with(settings: DeckSettings) -> (Arc<ManualClock>, TestDeck) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = MemoryEngine::new(clock.clone());
    let words = Arc::new(words());
    let deck = StudyDeck::new("test", DeckHandle(1), engine, words, clock.clone(), settings);
    (clock, deck.with_seed(7))
}

fn deck() -> (Arc<ManualClock>, TestDeck) {
    deck_with(settings())
}

/// Engine whose answers and deletions can be made to fail.
struct FlakyEngine {
    inner: MemoryEngine,
    fail_answer: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyEngine {
    fn refused(what: &str) -> StudyError {
        StudyError::InvalidOperation(format!("engine refused to {}", what))
    }
}

impl SrsEngine for FlakyEngine {
    fn create_card(&mut self, group: Option<GroupHandle>) -> Result<NewCard> {
        self.inner.create_card(group)
    }

    fn delete_card(&mut self, card: CardId) -> Result<Option<GroupHandle>> {
        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(Self::refused("delete"));
        }
        self.inner.delete_card(card)
    }

    fn answer(
        &mut self,
        card: CardId,
        quality: AnswerQuality,
        elapsed: Duration,
    ) -> Result<TimeDelta> {
        if self.fail_answer.load(Ordering::Relaxed) {
            return Err(Self::refused("answer"));
        }
        self.inner.answer(card, quality, elapsed)
    }

    fn change_last_answer(&mut self, card: CardId, quality: AnswerQuality) -> Result<TimeDelta> {
        self.inner.change_last_answer(card, quality)
    }

    fn card_next_test(&self, card: CardId) -> Option<DateTime<Utc>> {
        self.inner.card_next_test(card)
    }

    fn card_last_test(&self, card: CardId) -> Option<DateTime<Utc>> {
        self.inner.card_last_test(card)
    }

    fn card_spacing(&self, card: CardId) -> Option<TimeDelta> {
        self.inner.card_spacing(card)
    }

    fn card_eta(&self, card: CardId) -> Option<TimeDelta> {
        self.inner.card_eta(card)
    }

    fn merge_groups(&mut self, main: GroupHandle, other: GroupHandle) -> Result<GroupHandle> {
        self.inner.merge_groups(main, other)
    }

    fn test_day(&self) -> NaiveDate {
        self.inner.test_day()
    }

    fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        self.inner.test_day_of(at)
    }

    fn start_test_day(&mut self) -> bool {
        self.inner.start_test_day()
    }
}

fn flaky_deck() -> StudyDeck<FlakyEngine, MemoryWordStore> {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = FlakyEngine {
        inner: MemoryEngine::new(clock.clone()),
        fail_answer: AtomicBool::new(false),
        fail_delete: AtomicBool::new(false),
    };
    let words = Arc::new(words());
    StudyDeck::new("flaky", DeckHandle(2), engine, words, clock, settings()).with_seed(7)
}

fn item_of(deck: &TestDeck, word: WordId, question: QuestionType) -> ItemId {
    deck.word_record(word).and_then(|record| record.item(question)).unwrap()
}

fn study(deck: &mut TestDeck, quality: AnswerQuality) -> ItemId {
    let next = deck.next_index().unwrap().unwrap();
    deck.answer(quality, Duration::from_secs(4)).unwrap();
    next.id()
}

#[test]
fn test_new_item_moves_to_due_after_correct_answer() {
    let (_, mut deck) = deck();
    assert_eq!(deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap(), 1);
    let item = item_of(&deck, NEKO, QuestionType::Kana);

    assert_eq!(deck.next_index().unwrap(), Some(NextItem::Item(item)));
    assert_eq!(deck.next_question_type(), Some(QuestionType::Kana));
    assert_eq!(deck.state().due.len(), 0);

    let eta = deck.answer(AnswerQuality::Correct, Duration::from_secs(3)).unwrap();
    assert_eq!(eta, TimeDelta::days(1));
    assert_eq!(deck.state().due.len(), 1);
    assert_eq!(deck.queue_size(), 0);
    assert_eq!(deck.studied_size(), 1);
    assert_eq!(deck.studied_today(), 1);
    assert!(deck.item(item).unwrap().locked);
    assert_eq!(deck.current_item(), None);
    deck.verify().unwrap();
}

#[test]
fn test_answer_without_current_item_fails() {
    let (_, mut deck) = deck();
    assert!(matches!(
        deck.answer(AnswerQuality::Correct, Duration::ZERO),
        Err(StudyError::NoCurrentItem)
    ));
    assert_eq!(deck.next_index().unwrap(), None);
}

#[test]
fn test_queue_creates_one_record_per_word() {
    let (_, mut deck) = deck();
    let both = QuestionTypes::KANJI | QuestionTypes::KANA;

    assert_eq!(deck.queue_word_items(&[(NIHON, both)]).unwrap(), 2);
    assert_eq!(deck.queue_size(), 2);
    assert_eq!(deck.state().records.len(), 1);
    assert_eq!(deck.word_record(NIHON).unwrap().types, both);
    assert_eq!(deck.items_for_word(NIHON).len(), 2);

    assert_eq!(deck.queue_word_items(&[(NIHON, both)]).unwrap(), 0);
    // Kana-only words never get a kanji question.
    assert_eq!(deck.queue_word_items(&[(ARIGATOU, both)]).unwrap(), 1);
    assert_eq!(deck.word_record(ARIGATOU).unwrap().types, QuestionTypes::KANA);
    deck.verify().unwrap();
}

#[test]
fn test_queue_rejects_unknown_words_and_priorities() {
    let (_, mut deck) = deck();
    let request = [(NEKO, QuestionTypes::KANA), (WordId(40), QuestionTypes::KANA)];
    assert!(matches!(deck.queue_word_items(&request), Err(StudyError::UnknownWord(WordId(40)))));
    assert_eq!(deck.queue_size(), 0);

    let request = [(NEKO, QuestionTypes::KANA)];
    assert!(matches!(
        deck.queue_word_items_with(&request, 10, MainHint::Default),
        Err(StudyError::InvalidPriority(10))
    ));
}

#[test]
fn test_higher_priority_is_asked_first() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    let neko = item_of(&deck, NEKO, QuestionType::Kana);

    deck.set_queued_priority(&[neko], 9).unwrap();
    assert_eq!(deck.item(neko).unwrap().priority, Some(9));
    assert_eq!(deck.next_index().unwrap(), Some(NextItem::Item(neko)));
}

#[test]
fn test_answer_keeps_item_count() {
    let (_, mut deck) = deck();
    let all = QuestionTypes::KANJI | QuestionTypes::KANA | QuestionTypes::DEFINITION;
    deck.queue_word_items(&[(NIHON, all), (NEKO, all), (GAKKOU, all)]).unwrap();
    let total = deck.state().item_count();

    for quality in [AnswerQuality::Correct, AnswerQuality::Wrong, AnswerQuality::Easy] {
        study(&mut deck, quality);
        assert_eq!(deck.state().item_count(), total);
        deck.verify().unwrap();
    }
    assert_eq!(deck.failed_size(), 1);
    assert_eq!(deck.state().due.len(), 2);
}

#[test]
fn test_previous_word_is_avoided_when_due() {
    let (clock, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    let nihon = study(&mut deck, AnswerQuality::Correct);
    let neko = study(&mut deck, AnswerQuality::Correct);
    assert_ne!(nihon, neko);

    clock.advance(TimeDelta::days(2));
    assert_eq!(deck.due_size(), 2);

    // Both are equally overdue; the word just answered must wait.
    assert_eq!(deck.next_index().unwrap(), Some(NextItem::Item(nihon)));
    deck.answer(AnswerQuality::Correct, Duration::from_secs(2)).unwrap();
    assert_eq!(deck.next_index().unwrap(), Some(NextItem::Item(neko)));
}

#[test]
fn test_sibling_waits_for_other_words() {
    let (_, mut deck) = deck();
    let both = QuestionTypes::KANJI | QuestionTypes::KANA;
    deck.queue_word_items(&[(NIHON, both), (NEKO, QuestionTypes::KANA)]).unwrap();

    let first = study(&mut deck, AnswerQuality::Correct);
    assert_eq!(deck.item(first).unwrap().word, NIHON);
    let next = deck.next_index().unwrap().unwrap();
    assert_eq!(deck.item(next.id()).unwrap().word, NEKO);
}

#[test]
fn test_only_failed_item_is_repeated() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let item = study(&mut deck, AnswerQuality::Wrong);

    assert_eq!(deck.failed_size(), 1);
    assert_eq!(deck.next_index().unwrap(), Some(NextItem::RepeatCurrent(item)));

    deck.answer(AnswerQuality::Correct, Duration::from_secs(1)).unwrap();
    assert_eq!(deck.failed_size(), 0);
    assert_eq!(deck.next_index().unwrap(), None);
}

#[test]
fn test_new_item_quota() {
    let (_, mut deck) = deck_with(DeckSettings { new_items_per_day: 1, ..settings() });
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    assert_eq!(deck.new_size(), 1);

    study(&mut deck, AnswerQuality::Correct);
    assert_eq!(deck.new_size(), 0);
    assert_eq!(deck.next_index().unwrap(), None);
    assert_eq!(deck.queue_size(), 1);
}

#[test]
fn test_day_roll_moves_failed_to_due() {
    let (clock, mut deck) = deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let item = study(&mut deck, AnswerQuality::Wrong);
    assert_eq!(deck.failed_size(), 1);
    assert!(deck.state().due.is_empty());

    clock.advance(TimeDelta::days(1));
    let next = deck.next_index().unwrap().unwrap();
    assert_eq!(next.id(), item);
    assert_eq!(deck.failed_size(), 0);
    assert_eq!(deck.state().due.len(), 1);
    assert_eq!(deck.studied_today(), 0);
    assert_eq!(deck.new_count_yesterday(), 1);
    assert!(!deck.start_test_day().unwrap());
    deck.verify().unwrap();
}

#[test]
fn test_change_answer_twice_restores_state() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA)]).unwrap();
    let item = study(&mut deck, AnswerQuality::Correct);
    let card = deck.state().locked.get(item).unwrap().card();

    let before = deck.state().clone();
    let next_test = deck.engine().card_next_test(card);
    assert_eq!(deck.practice_size(), 2);

    deck.change_last_answer(AnswerQuality::Wrong).unwrap();
    assert_eq!(deck.failed_size(), 1);
    assert!(deck.state().due.is_empty());
    assert!(deck.next_practice_words()[0].failed);

    deck.change_last_answer(AnswerQuality::Correct).unwrap();
    assert_eq!(deck.state(), &before);
    assert_eq!(deck.engine().card_next_test(card), next_test);
    deck.verify().unwrap();
}

#[test]
fn test_change_answer_needs_an_answer() {
    let (_, mut deck) = deck();
    assert!(matches!(
        deck.change_last_answer(AnswerQuality::Correct),
        Err(StudyError::InvalidOperation(_))
    ));
}

#[test]
fn test_reading_practice_follows_new_answers() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (GAKKOU, QuestionTypes::KANA)])
        .unwrap();
    study(&mut deck, AnswerQuality::Correct);
    study(&mut deck, AnswerQuality::Wrong);

    assert_eq!(deck.practice_size(), 4);
    assert_eq!(deck.next_practice_kanji(), Some('日'));
    assert_eq!(deck.next_practice_reading(), Some(0));
    let entry = deck.practice_reading_answered().unwrap().unwrap();
    assert_eq!(entry.words.len(), 1);
    assert_eq!(deck.practice_size(), 3);
}

#[test]
fn test_removing_last_item_destroys_record() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA | QuestionTypes::KANJI)]).unwrap();
    let kana = item_of(&deck, NEKO, QuestionType::Kana);
    let kanji = item_of(&deck, NEKO, QuestionType::Kanji);

    assert_eq!(deck.remove_queued_items(&[kana]).unwrap(), 1);
    assert_eq!(deck.word_record(NEKO).unwrap().types, QuestionTypes::KANJI);
    assert_eq!(deck.remove_queued_items(&[kanji]).unwrap(), 1);
    assert!(deck.word_record(NEKO).is_none());
    assert!(matches!(deck.remove_queued_items(&[kanji]), Err(StudyError::UnknownItem(_))));
}

#[test]
fn test_remove_studied_item_deletes_card() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let item = study(&mut deck, AnswerQuality::Correct);
    assert_eq!(deck.engine().card_count(), 1);

    assert_eq!(deck.remove_studied_items(&[item]).unwrap(), 1);
    assert_eq!(deck.engine().card_count(), 0);
    assert!(deck.word_record(NEKO).is_none());
    assert!(deck.state().due.is_empty());
    assert!(matches!(
        deck.change_last_answer(AnswerQuality::Wrong),
        Err(StudyError::InvalidOperation(_))
    ));
    deck.verify().unwrap();
}

#[test]
fn test_requeue_studied_item() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let item = study(&mut deck, AnswerQuality::Wrong);

    assert_eq!(deck.requeue_studied_items(&[item], 8).unwrap(), 1);
    let info = deck.item(item).unwrap();
    assert!(!info.locked);
    assert_eq!(info.priority, Some(8));
    assert_eq!(deck.failed_size(), 0);
    assert_eq!(deck.engine().card_count(), 0);
    assert_eq!(deck.word_record(NEKO).unwrap().group, None);
    deck.verify().unwrap();
}

#[test]
fn test_save_load_round_trip() {
    let (_, mut deck) = deck();
    let all = QuestionTypes::KANJI | QuestionTypes::KANA | QuestionTypes::DEFINITION;
    deck.queue_word_items(&[(NIHON, all), (NEKO, QuestionTypes::KANA), (GAKKOU, all)])
        .unwrap();
    study(&mut deck, AnswerQuality::Correct);
    study(&mut deck, AnswerQuality::Wrong);
    study(&mut deck, AnswerQuality::Easy);
    deck.set_main_hint(item_of(&deck, GAKKOU, QuestionType::Definition), MainHint::Kanji)
        .unwrap();
    // The newest item is gone, so its id must not be handed out again.
    deck.queue_word_items(&[(ARIGATOU, QuestionTypes::KANA)]).unwrap();
    let dropped = item_of(&deck, ARIGATOU, QuestionType::Kana);
    deck.remove_queued_items(&[dropped]).unwrap();

    let mut bytes = Vec::new();
    deck.save_to_writer(&mut bytes).unwrap();

    let clock = Arc::new(ManualClock::new(start()));
    let loaded = TestDeck::load_from_reader(
        &mut Cursor::new(bytes),
        deck.engine().clone(),
        deck.words().clone(),
        clock,
        settings(),
    )
    .unwrap();

    assert_eq!(loaded.state(), deck.state());
    assert!(loaded.state().next_item > dropped.0);
    assert_eq!(loaded.failed_size(), 1);
    assert_eq!(loaded.practice_size(), deck.practice_size());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("n5.deck");
    let (clock, mut deck) = deck();
    deck.queue_word_items(&[(GAKKOU, QuestionTypes::KANJI)]).unwrap();
    study(&mut deck, AnswerQuality::Correct);

    deck.save_to_file(&path).unwrap();
    let loaded = TestDeck::load_from_file(
        &path,
        deck.engine().clone(),
        deck.words().clone(),
        clock,
        settings(),
    )
    .unwrap();
    assert_eq!(loaded.state(), deck.state());
    assert_eq!(loaded.name(), "test");
}

#[test]
fn test_identity_reconcile_is_noop() {
    let (_, mut deck) = deck();
    let both = QuestionTypes::KANJI | QuestionTypes::KANA;
    deck.queue_word_items(&[(NIHON, both), (NEKO, both), (GAKKOU, QuestionTypes::DEFINITION)])
        .unwrap();
    study(&mut deck, AnswerQuality::Correct);
    study(&mut deck, AnswerQuality::Wrong);
    let before = deck.state().clone();

    let words = deck.words().clone();
    let report = deck.apply_changes(&WordMapping::identity(4), words).unwrap();
    assert!(report.is_noop());
    assert_eq!(deck.state(), &before);
}

#[test]
fn test_merged_words_keep_union_of_types() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(GAKKOU, QuestionTypes::KANA)]).unwrap();
    let studied = study(&mut deck, AnswerQuality::Correct);
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANJI), (GAKKOU, QuestionTypes::DEFINITION)])
        .unwrap();
    let union = deck.word_record(NIHON).unwrap().types | deck.word_record(GAKKOU).unwrap().types;

    let (new_words, _) = deck.words().retain_words(|word, _| word != GAKKOU);
    let mapping = WordMapping::from_indices(&[0, 1, 2, 0]);
    let report = deck.apply_changes(&mapping, Arc::new(new_words)).unwrap();

    assert_eq!(report.merged_words, 1);
    assert_eq!(report.moved_items, 2);
    assert_eq!(report.removed_items, 0);
    let record = deck.word_record(NIHON).unwrap();
    assert_eq!(record.types, union);
    assert_eq!(record.item(QuestionType::Kana), Some(studied));
    assert!(record.group.is_some());
    assert!(deck.word_record(GAKKOU).is_none());
    assert_eq!(deck.item(studied).unwrap().word, NIHON);
    assert_eq!(deck.engine().card_count(), 1);
    deck.verify().unwrap();
}

#[test]
fn test_merge_prefers_studied_items() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(GAKKOU, QuestionTypes::KANA)]).unwrap();
    let studied = study(&mut deck, AnswerQuality::Correct);
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANJI), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    let fresh = item_of(&deck, NEKO, QuestionType::Kana);

    let mut new_words = MemoryWordStore::new();
    new_words.push("日本", "にほん", "Japan");
    let mapping = WordMapping::from_indices(&[0, 0, -1, 0]);
    let report = deck.apply_changes(&mapping, Arc::new(new_words)).unwrap();

    // Both donors have a kana item; the one with study history wins.
    assert_eq!(report.merged_words, 2);
    assert_eq!(report.removed_items, 1);
    let record = deck.word_record(NIHON).unwrap();
    assert_eq!(record.item(QuestionType::Kana), Some(studied));
    assert_eq!(record.types, QuestionTypes::KANJI | QuestionTypes::KANA);
    assert!(deck.item(fresh).is_none());
    assert_eq!(deck.engine().card_count(), 1);
    deck.verify().unwrap();
}

#[test]
fn test_removed_words_are_deleted() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    let nihon = study(&mut deck, AnswerQuality::Correct);
    let neko = item_of(&deck, NEKO, QuestionType::Kana);

    let (new_words, targets) = deck.words().retain_words(|word, _| word != NIHON);
    let report = deck.apply_changes(&WordMapping::new(targets), Arc::new(new_words)).unwrap();

    assert_eq!(report.removed_words, 1);
    assert_eq!(report.removed_items, 1);
    assert_eq!(report.dropped_readings, 2);
    assert!(deck.item(nihon).is_none());
    assert_eq!(deck.item(neko).unwrap().word, WordId(0));
    assert_eq!(deck.engine().card_count(), 0);
    assert_eq!(deck.practice_size(), 0);
    deck.verify().unwrap();
}

#[test]
fn test_queue_while_prefetch_runs() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA)]).unwrap();
    study(&mut deck, AnswerQuality::Correct);

    // The prefetch started by `answer` saw no other word; queueing cancels it.
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let next = deck.next_index().unwrap().unwrap();
    assert_eq!(deck.item(next.id()).unwrap().word, NEKO);
    assert_eq!(deck.next_main_hint(), Some(MainHint::Default));
}

#[test]
fn test_cooldown_keeps_recent_word_back() {
    let (clock, mut deck) = deck();
    let both = QuestionTypes::KANJI | QuestionTypes::KANA;
    deck.queue_word_items(&[(NIHON, both), (NEKO, QuestionTypes::KANA)]).unwrap();
    study(&mut deck, AnswerQuality::Correct);
    let neko = study(&mut deck, AnswerQuality::Correct);
    assert_eq!(deck.item(neko).unwrap().word, NEKO);

    // The remaining new item belongs to a word answered two minutes ago; it is
    // still the only candidate, so it is picked anyway.
    clock.advance(TimeDelta::minutes(2));
    let next = deck.next_index().unwrap().unwrap();
    assert_eq!(deck.item(next.id()).unwrap().word, NIHON);
}

#[test]
fn test_failed_engine_answer_keeps_new_item_free() {
    let mut deck = flaky_deck();
    deck.queue_word_items(&[(NEKO, QuestionTypes::KANA)]).unwrap();
    let item = deck.next_index().unwrap().unwrap().id();

    deck.engine().fail_answer.store(true, Ordering::Relaxed);
    assert!(deck.answer(AnswerQuality::Correct, Duration::from_secs(2)).is_err());
    assert!(!deck.item(item).unwrap().locked);
    assert_eq!(deck.studied_today(), 0);
    assert!(deck.state().due.is_empty());
    assert_eq!(deck.engine().inner.card_count(), 0);
    deck.verify().unwrap();

    deck.engine().fail_answer.store(false, Ordering::Relaxed);
    deck.answer(AnswerQuality::Correct, Duration::from_secs(2)).unwrap();
    assert!(deck.item(item).unwrap().locked);
    assert_eq!(deck.engine().inner.card_count(), 1);
    deck.verify().unwrap();
}

#[test]
fn test_failed_card_deletion_keeps_studied_items() {
    let mut deck = flaky_deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (NEKO, QuestionTypes::KANA)])
        .unwrap();
    let passed = deck.next_index().unwrap().unwrap().id();
    deck.answer(AnswerQuality::Correct, Duration::from_secs(2)).unwrap();
    let failed = deck.next_index().unwrap().unwrap().id();
    deck.answer(AnswerQuality::Wrong, Duration::from_secs(2)).unwrap();
    let before = deck.state().clone();

    deck.engine().fail_delete.store(true, Ordering::Relaxed);
    assert!(deck.remove_studied_items(&[failed]).is_err());
    assert!(deck.requeue_studied_items(&[passed], 5).is_err());
    assert_eq!(deck.state(), &before);
    deck.verify().unwrap();

    deck.engine().fail_delete.store(false, Ordering::Relaxed);
    assert_eq!(deck.remove_studied_items(&[failed, passed]).unwrap(), 2);
    assert_eq!(deck.engine().inner.card_count(), 0);
    deck.verify().unwrap();
}

#[test]
fn test_short_interval_roll_picks_fragile_item() {
    let pick = |chance: f64| {
        let settings = DeckSettings { short_interval_chance: chance, ..settings() };
        let (clock, mut deck) = deck_with(settings);
        deck.queue_word_items(&[
            (NIHON, QuestionTypes::KANA),
            (NEKO, QuestionTypes::KANA),
            (GAKKOU, QuestionTypes::KANA),
        ])
        .unwrap();
        for quality in [AnswerQuality::Correct, AnswerQuality::Wrong, AnswerQuality::Correct] {
            study(&mut deck, quality);
            clock.advance(TimeDelta::minutes(1));
        }

        clock.advance(TimeDelta::days(2));
        let next = deck.next_index().unwrap().unwrap();
        deck.item(next.id()).unwrap().word
    };

    // NIHON was shown longest ago; NEKO failed and has no spacing left.
    assert_eq!(pick(0.0), NIHON);
    assert_eq!(pick(1.0), NEKO);
}

#[test]
fn test_exact_match_becomes_main_record() {
    let (_, mut deck) = deck();
    deck.queue_word_items(&[(NIHON, QuestionTypes::KANA), (GAKKOU, QuestionTypes::KANA)])
        .unwrap();
    let nihon = item_of(&deck, NIHON, QuestionType::Kana);
    let gakkou = item_of(&deck, GAKKOU, QuestionType::Kana);

    let mut new_words = MemoryWordStore::new();
    new_words.push("学校", "がっこう", "school");
    let mapping = WordMapping::from_indices(&[0, -1, -1, 0]);
    let report = deck.apply_changes(&mapping, Arc::new(new_words)).unwrap();

    assert_eq!(report.merged_words, 1);
    assert_eq!(report.removed_items, 1);
    let record = deck.word_record(WordId(0)).unwrap();
    assert_eq!(record.item(QuestionType::Kana), Some(gakkou));
    assert!(deck.item(nihon).is_none());
    assert_eq!(deck.queue_size(), 1);
    deck.verify().unwrap();
}

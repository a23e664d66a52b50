//! Carries deck state over to a reorganized word store.
//!
//! Several old words may collapse into one new word. The record that matches
//! the new word's text (or else the one with the lowest old id) stays the main
//! record; the others donate items for question types the main record lacks,
//! locked items first. Everything else of theirs is deleted.

use std::collections::{
    BTreeMap,
    HashSet,
};

use log::{
    info,
    warn,
};

use super::{
    due::EngineKeys,
    records::WordRecord,
    state::{
        DeckCore,
        DeckState,
    },
};
use crate::{
    core::{
        GroupHandle,
        ItemId,
        QuestionType,
        WordId,
    },
    dictionary::WordStore,
    engine::SrsEngine,
};

/// Old word id -> new word id. Old ids past the end of the table keep their id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordMapping {
    targets: Vec<Option<WordId>>,
}

impl WordMapping {
    pub fn new(targets: Vec<Option<WordId>>) -> Self {
        Self { targets }
    }

    pub fn identity(word_count: usize) -> Self {
        Self { targets: (0..word_count as u32).map(|id| Some(WordId(id))).collect() }
    }

    /// Builds a mapping from raw indices, where a negative index marks a removed word.
    pub fn from_indices(indices: &[i64]) -> Self {
        let targets = indices
            .iter()
            .map(|index| u32::try_from(*index).ok().map(WordId))
            .collect();
        Self { targets }
    }

    pub fn target(&self, old: WordId) -> Option<WordId> {
        match self.targets.get(old.0 as usize) {
            Some(target) => *target,
            None => Some(old),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Old words folded into another word's record.
    pub merged_words: usize,
    /// Items that moved to a different record.
    pub moved_items: usize,
    pub removed_items: usize,
    pub removed_words: usize,
    pub dropped_readings: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

fn delete_item<E: SrsEngine>(state: &mut DeckState, engine: &mut E, item: ItemId) {
    if state.free.remove(item).is_ok() {
        return;
    }
    match state.locked.remove(item) {
        Ok(locked) => {
            if let Err(e) = engine.delete_card(locked.card()) {
                warn!("could not delete card {} of item {}: {}", locked.card(), item, e);
            }
        }
        Err(_) => warn!("item {} of a reconciled word was not stored", item),
    }
}

fn main_record<W1, W2>(records: &[WordRecord], target: WordId, old: &W1, new: &W2) -> usize
where
    W1: WordStore + ?Sized,
    W2: WordStore + ?Sized,
{
    let wanted = (new.kanji(target), new.kana(target));
    records
        .iter()
        .position(|record| {
            wanted.0.is_some() && (old.kanji(record.word), old.kana(record.word)) == wanted
        })
        .unwrap_or(0)
}

/// Joins the group of a moved locked item into the main record's group.
fn join_group<E: SrsEngine>(
    main: &mut WordRecord,
    donor_group: Option<GroupHandle>,
    merged: &mut HashSet<GroupHandle>,
    engine: &mut E,
) {
    let Some((kept, other)) = main.adopt_group(donor_group) else {
        return;
    };
    if !merged.insert(other) {
        return;
    }
    match engine.merge_groups(kept, other) {
        Ok(group) => main.group = Some(group),
        Err(e) => warn!("could not merge group {} into {}: {}", other, kept, e),
    }
}

fn merge_into_target<E: SrsEngine>(
    state: &mut DeckState,
    engine: &mut E,
    target: WordId,
    mut records: Vec<WordRecord>,
    main_at: usize,
    report: &mut ReconcileReport,
) -> WordRecord {
    let mut main = records.remove(main_at);
    let mut donors = records;
    let mut merged_groups = HashSet::new();
    report.merged_words += donors.len();

    for question in QuestionType::ALL {
        if main.item(question).is_some() {
            continue;
        }
        // Donors stay in old-id order, so `min_by_key` keeps the lowest old id on ties.
        let pick = donors
            .iter()
            .enumerate()
            .filter_map(|(at, donor)| donor.item(question).map(|id| (at, id)))
            .min_by_key(|(_, id)| !state.locked.contains(*id));
        let Some((at, item)) = pick else {
            continue;
        };

        donors[at].detach(question);
        if state.locked.contains(item) {
            join_group(&mut main, donors[at].group, &mut merged_groups, engine);
        }
        if let Err(e) = main.attach(question, item) {
            warn!("could not move item {} to word {}: {}", item, target, e);
            delete_item(state, engine, item);
            report.removed_items += 1;
            continue;
        }
        report.moved_items += 1;
    }

    for donor in &donors {
        for (_, item) in donor.items() {
            delete_item(state, engine, item);
            report.removed_items += 1;
        }
        main.last_included = main.last_included.max(donor.last_included);
    }

    main.word = target;
    main
}

/// Rewrites every structure of the deck for `mapping`. Never fails; anything
/// that cannot be carried over is deleted and reported.
pub(crate) fn apply_changes<E, W1, W2>(
    core: &mut DeckCore<E>,
    old_words: &W1,
    new_words: &W2,
    mapping: &WordMapping,
) -> ReconcileReport
where
    E: SrsEngine,
    W1: WordStore + ?Sized,
    W2: WordStore + ?Sized,
{
    let DeckCore { state, engine } = core;
    let resolve = |word: WordId| mapping.target(word).filter(|target| new_words.contains(*target));
    let mut report = ReconcileReport {
        dropped_readings: state.readings.reconcile(resolve),
        ..ReconcileReport::default()
    };

    let mut targets: BTreeMap<WordId, Vec<WordRecord>> = BTreeMap::new();
    for record in state.records.drain() {
        match resolve(record.word) {
            Some(target) => targets.entry(target).or_default().push(record),
            None => {
                report.removed_words += 1;
                for (_, item) in record.items() {
                    delete_item(state, engine, item);
                    report.removed_items += 1;
                }
            }
        }
    }

    for (target, records) in targets {
        let main_at = main_record(&records, target, old_words, new_words);
        let record = merge_into_target(state, engine, target, records, main_at, &mut report);
        state.records.insert(record);
    }

    for item in state.free.iter_mut() {
        if let Some(target) = resolve(item.word) {
            item.word = target;
        }
    }
    for item in state.locked.iter_mut() {
        if let Some(target) = resolve(item.word) {
            item.word = target;
        }
    }

    let DeckState { locked, due, failed, .. } = &mut *state;
    due.rebuild(|id| locked.contains(id), &EngineKeys::new(locked, &*engine));
    failed.retain(|id| locked.contains(id));

    if report.removed_items > 0 {
        warn!(
            "reconciliation discarded {} items ({} words removed)",
            report.removed_items, report.removed_words
        );
    }
    info!(
        "deck '{}' reconciled: {} words merged, {} items moved, {} readings dropped",
        state.name, report.merged_words, report.moved_items, report.dropped_readings
    );
    report
}

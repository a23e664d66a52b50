use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};

use super::items::LockedStore;
use crate::{
    core::{
        ItemId,
        QuestionType,
        WordId,
    },
    engine::SrsEngine,
};

/// Sort key of the due index. Word and question type break ties between equal
/// test times so the order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DueKey {
    pub next_test: DateTime<Utc>,
    pub word: WordId,
    pub question: QuestionType,
}

pub trait DueKeySource {
    fn due_key(&self, item: ItemId) -> DueKey;

    fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate;
}

/// Reads due keys from the locked store and the engine.
pub struct EngineKeys<'a, E: ?Sized> {
    locked: &'a LockedStore,
    engine: &'a E,
}

impl<'a, E: SrsEngine + ?Sized> EngineKeys<'a, E> {
    pub fn new(locked: &'a LockedStore, engine: &'a E) -> Self {
        Self { locked, engine }
    }
}

impl<E: SrsEngine + ?Sized> DueKeySource for EngineKeys<'_, E> {
    fn due_key(&self, item: ItemId) -> DueKey {
        match self.locked.get(item) {
            Ok(locked) => DueKey {
                next_test: self
                    .engine
                    .card_next_test(locked.card())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                word: locked.word,
                question: locked.question,
            },
            Err(_) => DueKey {
                next_test: DateTime::<Utc>::MAX_UTC,
                word: WordId(u32::MAX),
                question: QuestionType::Definition,
            },
        }
    }

    fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        self.engine.test_day_of(at)
    }
}

/// Locked items that are not failed, ordered by when they are next due.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DueIndex {
    items: Vec<ItemId>,
}

impl DueIndex {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    /// Binary search by due key. `Ok` holds the item's position, `Err` the
    /// position it would be inserted at.
    pub fn position(&self, item: ItemId, keys: &impl DueKeySource) -> Result<usize, usize> {
        let key = keys.due_key(item);
        self.items
            .binary_search_by(|entry| keys.due_key(*entry).cmp(&key).then(entry.cmp(&item)))
    }

    pub(crate) fn insert(&mut self, item: ItemId, keys: &impl DueKeySource) -> usize {
        match self.position(item, keys) {
            Ok(found) => found,
            Err(at) => {
                self.items.insert(at, item);
                at
            }
        }
    }

    /// Removes an item. Falls back to a linear scan when its key changed since
    /// it was inserted.
    pub(crate) fn remove(&mut self, item: ItemId, keys: &impl DueKeySource) -> bool {
        let found = match self.position(item, keys) {
            Ok(found) => Some(found),
            Err(_) => self.items.iter().position(|entry| *entry == item),
        };
        match found {
            Some(found) => {
                self.items.remove(found);
                true
            }
            None => false,
        }
    }

    /// Number of leading entries due on or before `today`.
    pub fn due_count(&self, today: NaiveDate, keys: &impl DueKeySource) -> usize {
        self.items
            .iter()
            .take_while(|item| keys.test_day_of(keys.due_key(**item).next_test) <= today)
            .count()
    }

    pub fn is_sorted(&self, keys: &impl DueKeySource) -> bool {
        self.items.windows(2).all(|pair| {
            (keys.due_key(pair[0]), pair[0]) < (keys.due_key(pair[1]), pair[1])
        })
    }

    /// Drops entries `keep` rejects and re-sorts the rest.
    pub(crate) fn rebuild(&mut self, keep: impl Fn(ItemId) -> bool, keys: &impl DueKeySource) {
        self.items.retain(|item| keep(*item));
        self.items.sort_by_cached_key(|item| (keys.due_key(*item), *item));
    }

    pub(crate) fn from_persisted(items: Vec<ItemId>) -> Self {
        Self { items }
    }

    pub(crate) fn to_persisted(&self) -> Vec<ItemId> {
        self.items.clone()
    }
}

/// Locked items whose last answer failed, in the order they failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailedIndex {
    items: Vec<ItemId>,
}

impl FailedIndex {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    pub(crate) fn push(&mut self, item: ItemId) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    pub(crate) fn remove(&mut self, item: ItemId) -> bool {
        match self.items.iter().position(|entry| *entry == item) {
            Some(found) => {
                self.items.remove(found);
                true
            }
            None => false,
        }
    }

    /// Removes an item and returns the position it held.
    pub(crate) fn take(&mut self, item: ItemId) -> Option<usize> {
        let found = self.items.iter().position(|entry| *entry == item)?;
        self.items.remove(found);
        Some(found)
    }

    pub(crate) fn insert_at(&mut self, at: usize, item: ItemId) {
        if !self.items.contains(&item) {
            self.items.insert(at.min(self.items.len()), item);
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<ItemId> {
        std::mem::take(&mut self.items)
    }

    pub(crate) fn retain(&mut self, keep: impl Fn(ItemId) -> bool) {
        self.items.retain(|item| keep(*item));
    }

    pub(crate) fn from_persisted(items: Vec<ItemId>) -> Self {
        Self { items }
    }

    pub(crate) fn to_persisted(&self) -> Vec<ItemId> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{
        TimeDelta,
        TimeZone,
    };

    use super::*;

    struct FixedKeys {
        keys: HashMap<ItemId, DueKey>,
    }

    impl FixedKeys {
        fn new(entries: &[(u64, i64, u32, QuestionType)]) -> Self {
            let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
            let keys = entries
                .iter()
                .map(|(id, hours, word, question)| {
                    let key = DueKey {
                        next_test: base + TimeDelta::hours(*hours),
                        word: WordId(*word),
                        question: *question,
                    };
                    (ItemId(*id), key)
                })
                .collect();
            Self { keys }
        }
    }

    impl DueKeySource for FixedKeys {
        fn due_key(&self, item: ItemId) -> DueKey {
            self.keys[&item]
        }

        fn test_day_of(&self, at: DateTime<Utc>) -> NaiveDate {
            at.date_naive()
        }
    }

    #[test]
    fn test_insert_keeps_total_order() {
        let keys = FixedKeys::new(&[
            (1, 30, 4, QuestionType::Kana),
            (2, 5, 9, QuestionType::Kanji),
            (3, 30, 4, QuestionType::Kanji),
            (4, 30, 2, QuestionType::Definition),
        ]);
        let mut due = DueIndex::default();
        for id in [1, 2, 3, 4] {
            due.insert(ItemId(id), &keys);
        }

        let order: Vec<u64> = due.iter().map(|id| id.0).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
        assert!(due.is_sorted(&keys));
        assert_eq!(due.position(ItemId(3), &keys), Ok(2));
    }

    #[test]
    fn test_position_reports_insertion_point() {
        let keys = FixedKeys::new(&[
            (1, 1, 0, QuestionType::Kana),
            (2, 10, 0, QuestionType::Kana),
            (3, 5, 1, QuestionType::Kana),
        ]);
        let mut due = DueIndex::default();
        due.insert(ItemId(1), &keys);
        due.insert(ItemId(2), &keys);
        assert_eq!(due.position(ItemId(3), &keys), Err(1));
    }

    #[test]
    fn test_due_count_and_remove() {
        let keys = FixedKeys::new(&[
            (1, 2, 0, QuestionType::Kana),
            (2, 20, 1, QuestionType::Kana),
            (3, 50, 2, QuestionType::Kana),
        ]);
        let mut due = DueIndex::default();
        for id in [3, 1, 2] {
            due.insert(ItemId(id), &keys);
        }

        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(due.due_count(today, &keys), 2);
        assert!(due.remove(ItemId(1), &keys));
        assert!(!due.remove(ItemId(1), &keys));
        assert_eq!(due.due_count(today, &keys), 1);
    }

    #[test]
    fn test_failed_index_keeps_failure_order() {
        let mut failed = FailedIndex::default();
        failed.push(ItemId(5));
        failed.push(ItemId(2));
        failed.push(ItemId(5));
        assert_eq!(failed.len(), 2);
        assert!(failed.remove(ItemId(5)));
        assert_eq!(failed.take_all(), vec![ItemId(2)]);
        assert!(failed.is_empty());
    }
}

use std::{
    collections::BTreeMap,
    fmt::Debug,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};

use crate::core::{
    models::{
        MAX_PRIORITY,
        MIN_PRIORITY,
    },
    CardId,
    ItemId,
    MainHint,
    QuestionType,
    Result,
    StudyError,
    WordId,
};

/// What distinguishes free items from locked ones. The container logic is
/// shared; kinds only add their payload and a load-time check.
pub trait ItemKind: Clone + Debug + PartialEq + Serialize + DeserializeOwned {
    const LABEL: &'static str;

    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Free {
    pub priority: u8,
}

impl ItemKind for Free {
    const LABEL: &'static str = "free";

    fn check(&self) -> Result<(), String> {
        if (MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            Ok(())
        } else {
            Err(format!("priority {} out of range", self.priority))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locked {
    pub card: CardId,
}

impl ItemKind for Locked {
    const LABEL: &'static str = "locked";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyItem<K> {
    pub id: ItemId,
    pub added: DateTime<Utc>,
    pub word: WordId,
    pub question: QuestionType,
    pub main_hint: MainHint,
    pub kind: K,
}

pub type FreeItem = StudyItem<Free>;
pub type LockedItem = StudyItem<Locked>;

impl FreeItem {
    pub fn priority(&self) -> u8 {
        self.kind.priority
    }

    pub(crate) fn lock(self, card: CardId) -> LockedItem {
        StudyItem {
            id: self.id,
            added: self.added,
            word: self.word,
            question: self.question,
            main_hint: self.main_hint,
            kind: Locked { card },
        }
    }
}

impl LockedItem {
    pub fn card(&self) -> CardId {
        self.kind.card
    }

    pub(crate) fn unlock(self, priority: u8) -> FreeItem {
        StudyItem {
            id: self.id,
            added: self.added,
            word: self.word,
            question: self.question,
            main_hint: self.main_hint,
            kind: Free { priority },
        }
    }
}

/// Items of one kind addressed by stable id. Iteration follows id order, which is
/// the order items were created in.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStore<K> {
    items: BTreeMap<ItemId, StudyItem<K>>,
}

impl<K> Default for ItemStore<K> {
    fn default() -> Self {
        Self { items: BTreeMap::new() }
    }
}

impl<K: ItemKind> ItemStore<K> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn get(&self, id: ItemId) -> Result<&StudyItem<K>> {
        self.items.get(&id).ok_or(StudyError::UnknownItem(id))
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Result<&mut StudyItem<K>> {
        self.items.get_mut(&id).ok_or(StudyError::UnknownItem(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StudyItem<K>> {
        self.items.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut StudyItem<K>> {
        self.items.values_mut()
    }

    /// Inserts and returns the item's position in iteration order.
    pub(crate) fn insert(&mut self, item: StudyItem<K>) -> Result<usize> {
        if self.items.contains_key(&item.id) {
            return Err(StudyError::InvalidOperation(format!(
                "{} item {} already exists",
                K::LABEL,
                item.id
            )));
        }
        let id = item.id;
        self.items.insert(id, item);
        Ok(self.items.range(..id).count())
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Result<StudyItem<K>> {
        self.items.remove(&id).ok_or(StudyError::UnknownItem(id))
    }

    pub(crate) fn from_persisted(items: Vec<StudyItem<K>>) -> Result<Self> {
        let mut store = Self::default();
        for item in items {
            if let Err(e) = item.kind.check() {
                let message = format!("{} item {}: {}", K::LABEL, item.id, e);
                return Err(StudyError::CorruptDeck(message));
            }
            store.insert(item).map_err(|e| StudyError::CorruptDeck(e.to_string()))?;
        }
        Ok(store)
    }

    pub(crate) fn to_persisted(&self) -> Vec<StudyItem<K>> {
        self.items.values().cloned().collect()
    }
}

/// Items waiting for their first test, bucketed by priority.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeQueue {
    store: ItemStore<Free>,
    counts: [usize; MAX_PRIORITY as usize],
}

impl FreeQueue {
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.store.contains(id)
    }

    pub fn get(&self, id: ItemId) -> Result<&FreeItem> {
        self.store.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FreeItem> {
        self.store.iter()
    }

    /// Items of one priority in stable scan order.
    pub fn bucket(&self, priority: u8) -> impl Iterator<Item = &FreeItem> {
        self.store.iter().filter(move |item| item.priority() == priority)
    }

    /// Number of items per priority, index 0 holding priority 1.
    pub fn priorities_snapshot(&self) -> [usize; MAX_PRIORITY as usize] {
        self.counts
    }

    pub(crate) fn add(&mut self, item: FreeItem) -> Result<usize> {
        let priority = checked_priority(item.priority())?;
        let position = self.store.insert(item)?;
        self.counts[bucket_index(priority)] += 1;
        Ok(position)
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Result<FreeItem> {
        let item = self.store.remove(id)?;
        self.counts[bucket_index(item.priority())] -= 1;
        Ok(item)
    }

    pub(crate) fn set_priority(&mut self, id: ItemId, priority: u8) -> Result<()> {
        let priority = checked_priority(priority)?;
        let item = self.store.get_mut(id)?;
        let previous = std::mem::replace(&mut item.kind.priority, priority);
        self.counts[bucket_index(previous)] -= 1;
        self.counts[bucket_index(priority)] += 1;
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Result<&mut FreeItem> {
        self.store.get_mut(id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FreeItem> {
        self.store.iter_mut()
    }

    pub(crate) fn from_persisted(items: Vec<FreeItem>) -> Result<Self> {
        let store = ItemStore::from_persisted(items)?;
        let mut counts = [0; MAX_PRIORITY as usize];
        for item in store.iter() {
            counts[bucket_index(item.priority())] += 1;
        }
        Ok(Self { store, counts })
    }

    pub(crate) fn to_persisted(&self) -> Vec<FreeItem> {
        self.store.to_persisted()
    }
}

/// Items under spaced-repetition control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockedStore {
    store: ItemStore<Locked>,
}

impl LockedStore {
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.store.contains(id)
    }

    pub fn get(&self, id: ItemId) -> Result<&LockedItem> {
        self.store.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockedItem> {
        self.store.iter()
    }

    pub(crate) fn add(&mut self, item: LockedItem) -> Result<usize> {
        self.store.insert(item)
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Result<LockedItem> {
        self.store.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Result<&mut LockedItem> {
        self.store.get_mut(id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LockedItem> {
        self.store.iter_mut()
    }

    pub(crate) fn from_persisted(items: Vec<LockedItem>) -> Result<Self> {
        Ok(Self { store: ItemStore::from_persisted(items)? })
    }

    pub(crate) fn to_persisted(&self) -> Vec<LockedItem> {
        self.store.to_persisted()
    }
}

pub(crate) fn checked_priority(priority: u8) -> Result<u8> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(StudyError::InvalidPriority(priority))
    }
}

fn bucket_index(priority: u8) -> usize {
    (priority - MIN_PRIORITY) as usize
}

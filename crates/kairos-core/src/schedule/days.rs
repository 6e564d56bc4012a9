//! The day → slots mapping shared by recurrence groups, availability catalogs and subscriptions.

use std::collections::BTreeMap;
use std::collections::btree_map;

use chrono::NaiveTime;

use super::day_key::{DayKey, DayKeyKind};
use super::slot::TimeSlot;
use crate::error::{CoreError, CoreResult};

/// Mapping from a day key to the ordered slots offered or wanted on that day.
///
/// An empty slot list means "the whole day, no slot filtering".
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RecurrenceDays(BTreeMap<DayKey, Vec<TimeSlot>>);

impl RecurrenceDays {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// A mapping with a single key and a single slot.
    #[must_use]
    pub fn single(key: DayKey, slot: TimeSlot) -> Self {
        let mut days = Self::new();
        days.insert(key, vec![slot]);
        days
    }

    /// ## Summary
    /// A mapping holding one whole-day key.
    #[must_use]
    pub fn whole_day(key: DayKey) -> Self {
        let mut days = Self::new();
        days.insert(key, Vec::new());
        days
    }

    /// Inserts slots for a key, keeping them sorted by start and free of duplicates.
    pub fn insert(&mut self, key: DayKey, mut slots: Vec<TimeSlot>) {
        slots.sort();
        slots.dedup();
        self.0.insert(key, slots);
    }

    #[must_use]
    pub fn get(&self, key: DayKey) -> Option<&[TimeSlot]> {
        self.0.get(&key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains_key(&self, key: DayKey) -> bool {
        self.0.contains_key(&key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DayKey, Vec<TimeSlot>> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = DayKey> + '_ {
        self.0.keys().copied()
    }

    /// ## Summary
    /// Flattens the mapping into `(key, slot)` pairs. Whole-day keys contribute nothing.
    pub fn pairs(&self) -> impl Iterator<Item = (DayKey, TimeSlot)> + '_ {
        self.0
            .iter()
            .flat_map(|(key, slots)| slots.iter().map(move |slot| (*key, *slot)))
    }

    /// The key family of this mapping, or `None` when it is empty.
    #[must_use]
    pub fn kind(&self) -> Option<DayKeyKind> {
        self.0.keys().next().map(|key| key.kind())
    }

    /// ## Summary
    /// Whether a subscription on this mapping selects the given local start time on `key`.
    ///
    /// A present key with an empty slot list selects the whole day. Times are compared as parsed
    /// values, so `"9:00"` and `"09:00"` match.
    #[must_use]
    pub fn selects(&self, key: DayKey, local_start: NaiveTime) -> bool {
        match self.get(key) {
            Some([]) => true,
            Some(slots) => slots.iter().any(|slot| slot.start == local_start),
            None => false,
        }
    }

    /// ## Summary
    /// Checks that every key belongs to `kind`, that the mapping is not empty, and that slots on
    /// one day do not overlap.
    ///
    /// ## Errors
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self, kind: DayKeyKind) -> CoreResult<()> {
        if self.is_empty() {
            return Err(CoreError::ValidationError(
                "recurrence days must name at least one day".to_string(),
            ));
        }

        for (key, slots) in &self.0 {
            if key.kind() != kind {
                return Err(CoreError::ValidationError(format!(
                    "day key '{key}' is not a {kind} key"
                )));
            }
            for pair in slots.windows(2) {
                if let [earlier, later] = pair
                    && later.start < earlier.end
                {
                    return Err(CoreError::ValidationError(format!(
                        "slots {earlier} and {later} on '{key}' overlap"
                    )));
                }
            }
        }

        Ok(())
    }

    /// ## Summary
    /// Checks that this mapping only selects days and slots offered by `offered`.
    ///
    /// A whole-day entry is accepted for any offered key.
    ///
    /// ## Errors
    /// Returns a validation error naming the first day or slot that is not offered.
    pub fn validate_subset_of(&self, offered: &Self) -> CoreResult<()> {
        for (key, slots) in &self.0 {
            let Some(offered_slots) = offered.get(*key) else {
                return Err(CoreError::ValidationError(format!(
                    "day '{key}' is not part of the recurrence"
                )));
            };
            if let Some(slot) = slots.iter().find(|slot| {
                !offered_slots.is_empty() && !offered_slots.iter().any(|o| o.start == slot.start)
            }) {
                return Err(CoreError::ValidationError(format!(
                    "slot {slot} on '{key}' is not offered"
                )));
            }
        }
        Ok(())
    }

    /// ## Summary
    /// Restricts this catalog to the days and slots selected by any of `selections`.
    #[must_use]
    pub fn restricted_to<'a>(&self, selections: impl IntoIterator<Item = &'a Self>) -> Self {
        let selections: Vec<&Self> = selections.into_iter().collect();
        let mut restricted = Self::new();

        for (key, slots) in &self.0 {
            let wanted: Vec<TimeSlot> = slots
                .iter()
                .filter(|slot| selections.iter().any(|sel| sel.selects(*key, slot.start)))
                .copied()
                .collect();
            let whole_day_wanted =
                slots.is_empty() && selections.iter().any(|sel| sel.contains_key(*key));

            if !wanted.is_empty() || whole_day_wanted {
                restricted.insert(*key, wanted);
            }
        }

        restricted
    }

    /// ## Summary
    /// Decodes a mapping stored as JSON.
    ///
    /// ## Errors
    /// Returns a validation error if the JSON does not describe a mapping of day keys to slots.
    pub fn from_json(value: &serde_json::Value) -> CoreResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| CoreError::ValidationError(format!("malformed recurrence days: {err}")))
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(key, slots)| {
                let slots = slots
                    .iter()
                    .map(|slot| {
                        let (start, end): (String, String) = (*slot).into();
                        serde_json::json!([start, end])
                    })
                    .collect();
                (key.to_string(), serde_json::Value::Array(slots))
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(DayKey, Vec<TimeSlot>)> for RecurrenceDays {
    fn from_iter<T: IntoIterator<Item = (DayKey, Vec<TimeSlot>)>>(iter: T) -> Self {
        let mut days = Self::new();
        for (key, slots) in iter {
            days.insert(key, slots);
        }
        days
    }
}

impl<'a> IntoIterator for &'a RecurrenceDays {
    type Item = (&'a DayKey, &'a Vec<TimeSlot>);
    type IntoIter = btree_map::Iter<'a, DayKey, Vec<TimeSlot>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

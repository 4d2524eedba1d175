//! The two-slot claim primitive attached to every display day

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Addressable position of a slot on a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotIndex {
    First,
    Second,
}

impl SlotIndex {
    /// Both slots, in allocation order
    pub const ALL: [SlotIndex; 2] = [SlotIndex::First, SlotIndex::Second];

    /// One-based slot number as shown to users
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    /// Parse a one-based slot number
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }

    fn position(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.number())
    }
}

/// An inspector holding a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub inspector_id: Uuid,
    pub claimed_at: DateTime<Utc>,
}

impl Occupant {
    pub fn new(inspector_id: Uuid, claimed_at: DateTime<Utc>) -> Self {
        Self {
            inspector_id,
            claimed_at,
        }
    }
}

/// Exactly two slots, each empty or occupied.
///
/// Mutation is crate-private: slots change only through the day lifecycle,
/// which keeps the two occupants distinct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots([Option<Occupant>; 2]);

impl Slots {
    /// Two empty slots
    pub fn empty() -> Self {
        Self([None, None])
    }

    pub(crate) fn from_parts(first: Option<Occupant>, second: Option<Occupant>) -> Self {
        Self([first, second])
    }

    pub fn get(&self, index: SlotIndex) -> Option<&Occupant> {
        self.0[index.position()].as_ref()
    }

    pub fn is_occupied(&self, index: SlotIndex) -> bool {
        self.get(index).is_some()
    }

    /// Number of occupied slots, 0 to 2
    pub fn occupied_count(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == 2
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count() == 0
    }

    /// First free slot in allocation order
    pub fn first_empty(&self) -> Option<SlotIndex> {
        SlotIndex::ALL.into_iter().find(|index| !self.is_occupied(*index))
    }

    /// Slot held by the given inspector, if any
    pub fn held_by(&self, inspector_id: Uuid) -> Option<SlotIndex> {
        SlotIndex::ALL.into_iter().find(|index| {
            self.get(*index)
                .is_some_and(|occupant| occupant.inspector_id == inspector_id)
        })
    }

    /// The slot an administrator releases when no slot is named: slot 2 before slot 1
    pub fn last_occupied(&self) -> Option<SlotIndex> {
        SlotIndex::ALL
            .into_iter()
            .rev()
            .find(|index| self.is_occupied(*index))
    }

    /// Inspectors currently holding a slot, in slot order
    pub fn inspector_ids(&self) -> Vec<Uuid> {
        self.0
            .iter()
            .flatten()
            .map(|occupant| occupant.inspector_id)
            .collect()
    }

    pub(crate) fn occupy(&mut self, index: SlotIndex, occupant: Occupant) {
        debug_assert!(self.held_by(occupant.inspector_id).is_none());
        self.0[index.position()] = Some(occupant);
    }

    pub(crate) fn vacate(&mut self, index: SlotIndex) -> Option<Occupant> {
        self.0[index.position()].take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupant() -> Occupant {
        Occupant::new(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_slot_numbers() {
        assert_eq!(SlotIndex::First.number(), 1);
        assert_eq!(SlotIndex::from_number(2), Some(SlotIndex::Second));
        assert_eq!(SlotIndex::from_number(0), None);
        assert_eq!(SlotIndex::from_number(3), None);
        assert_eq!(SlotIndex::Second.to_string(), "slot 2");
    }

    #[test]
    fn test_first_empty_fills_in_order() {
        let mut slots = Slots::empty();
        assert_eq!(slots.first_empty(), Some(SlotIndex::First));

        slots.occupy(SlotIndex::First, occupant());
        assert_eq!(slots.first_empty(), Some(SlotIndex::Second));
        assert_eq!(slots.occupied_count(), 1);

        slots.occupy(SlotIndex::Second, occupant());
        assert_eq!(slots.first_empty(), None);
        assert!(slots.is_full());
    }

    #[test]
    fn test_first_empty_reuses_vacated_first_slot() {
        let mut slots = Slots::from_parts(None, Some(occupant()));
        assert_eq!(slots.first_empty(), Some(SlotIndex::First));
        slots.occupy(SlotIndex::First, occupant());
        assert!(slots.is_full());
    }

    #[test]
    fn test_held_by() {
        let a = occupant();
        let b = occupant();
        let slots = Slots::from_parts(Some(a), Some(b));

        assert_eq!(slots.held_by(a.inspector_id), Some(SlotIndex::First));
        assert_eq!(slots.held_by(b.inspector_id), Some(SlotIndex::Second));
        assert_eq!(slots.held_by(Uuid::new_v4()), None);
        assert_eq!(slots.inspector_ids(), vec![a.inspector_id, b.inspector_id]);
    }

    #[test]
    fn test_last_occupied_prefers_second_slot() {
        let a = occupant();
        let b = occupant();

        assert_eq!(Slots::empty().last_occupied(), None);
        assert_eq!(
            Slots::from_parts(Some(a), Some(b)).last_occupied(),
            Some(SlotIndex::Second)
        );
        assert_eq!(
            Slots::from_parts(Some(a), None).last_occupied(),
            Some(SlotIndex::First)
        );
    }

    #[test]
    fn test_vacate() {
        let a = occupant();
        let mut slots = Slots::from_parts(Some(a), None);
        assert_eq!(slots.vacate(SlotIndex::First), Some(a));
        assert!(slots.is_empty());
        assert_eq!(slots.vacate(SlotIndex::First), None);
    }
}

//! Bitfields over text-coded enums.
//!
//! Capabilities and filters are carried as sets of enum values. On the wire
//! a set is the `;`-joined text of its members, in declaration order, and the
//! empty set is spelled `none`.

use crate::enums::{Group, Role};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Text used for a set with no members.
const EMPTY_TEXT: &str = "none";

/// An enum with a stable wire text and a bit position.
pub trait TextEnum: Copy + Eq + fmt::Debug + 'static {
    /// Lowercase name used in error messages.
    const KIND: &'static str;

    /// Every value, in declaration order.
    fn all() -> &'static [Self];

    /// Returns the wire text for this value.
    fn text(self) -> &'static str;

    /// Parses wire text, returning `None` for unknown text.
    fn from_text(text: &str) -> Option<Self>;

    /// Bit position of this value inside an [`EnumSet`].
    fn position(self) -> u32;
}

/// A set of enum values packed into a `u64`.
pub struct EnumSet<T> {
    bits: u64,
    _marker: PhantomData<T>,
}

/// Set of roles, used for backend capabilities.
pub type RoleSet = EnumSet<Role>;

/// Set of groups, used for backend capabilities.
pub type GroupSet = EnumSet<Group>;

impl<T: TextEnum> EnumSet<T> {
    /// Creates an empty set.
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    /// Creates a set from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Creates a set containing the given values.
    pub fn from_slice(values: &[T]) -> Self {
        values.iter().copied().collect()
    }

    /// Adds a value.
    pub fn insert(&mut self, value: T) {
        debug_assert!(value.position() < 64, "enum too large for a bitfield");
        self.bits |= 1u64 << value.position();
    }

    /// Removes a value.
    pub fn remove(&mut self, value: T) {
        self.bits &= !(1u64 << value.position());
    }

    /// Returns true if the value is a member.
    pub fn contains(&self, value: T) -> bool {
        value.position() < 64 && self.bits & (1u64 << value.position()) != 0
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterates over members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        T::all().iter().copied().filter(move |v| self.contains(*v))
    }

    /// Returns the union of two sets.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_bits(self.bits | other.bits)
    }

    /// Returns the `;`-joined text of the members.
    pub fn to_text(&self) -> String {
        if self.is_empty() {
            return EMPTY_TEXT.to_string();
        }
        self.iter().map(TextEnum::text).collect::<Vec<_>>().join(";")
    }

    /// Parses `;`-joined text.
    ///
    /// Every segment must be non-empty and name a known value. The text
    /// `none` is accepted as the empty set for enums that have no `none`
    /// value of their own.
    pub fn from_text(text: &str) -> CoreResult<Self> {
        let mut set = Self::empty();
        for part in text.split(';') {
            if part.is_empty() {
                return Err(CoreError::unknown_value(T::KIND, text));
            }
            match T::from_text(part) {
                Some(value) => set.insert(value),
                None if part == EMPTY_TEXT => {}
                None => return Err(CoreError::unknown_value(T::KIND, part)),
            }
        }
        Ok(set)
    }
}

impl<T> Clone for EnumSet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EnumSet<T> {}

impl<T> PartialEq for EnumSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for EnumSet<T> {}

impl<T> std::hash::Hash for EnumSet<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> Default for EnumSet<T> {
    fn default() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: TextEnum> fmt::Debug for EnumSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: TextEnum> fmt::Display for EnumSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl<T: TextEnum> FromIterator<T> for EnumSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::empty();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<T: TextEnum> Serialize for EnumSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de, T: TextEnum> Deserialize<'de> for EnumSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_none() {
        let set = RoleSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.to_text(), "none");
        assert_eq!(RoleSet::from_text("none").unwrap(), set);
    }

    #[test]
    fn text_follows_declaration_order() {
        let set = RoleSet::from_slice(&[Role::SearchName, Role::Resolve, Role::Cancel]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.to_text(), "cancel;resolve;search-name");
        assert_eq!(RoleSet::from_text(&set.to_text()).unwrap(), set);
    }

    #[test]
    fn rejects_unknown_and_empty_segments() {
        assert!(RoleSet::from_text("resolve;;cancel").is_err());
        assert!(RoleSet::from_text("resolve;frobnicate").is_err());
        assert!(GroupSet::from_text("").is_err());
    }

    #[test]
    fn insert_remove_contains() {
        let mut set = GroupSet::empty();
        set.insert(Group::Games);
        set.insert(Group::Office);
        assert!(set.contains(Group::Games));
        set.remove(Group::Games);
        assert!(!set.contains(Group::Games));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Group::Office]);
    }

    #[test]
    fn serde_uses_text_form() {
        let set = GroupSet::from_slice(&[Group::Games, Group::Fonts]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"fonts;games\"");
        let back: GroupSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}

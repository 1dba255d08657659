//! Decoding of the platform's equip failure bitmask.

use std::fmt;

/// Bitmask returned per item by the EquipItems action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EquipFailureReason(u32);

impl EquipFailureReason {
    /// No failure.
    pub const NONE: Self = Self(0);
    /// Item cannot be equipped at all.
    pub const ITEM_UNEQUIPPABLE: Self = Self(1);
    /// Unique-equip restriction, usually an exotic conflict.
    pub const UNIQUE_EQUIP_RESTRICTED: Self = Self(2);
    /// Class or quest unlock requirement not met.
    pub const FAILED_UNLOCK_CHECK: Self = Self(4);
    /// Character level too low.
    pub const FAILED_LEVEL_CHECK: Self = Self(8);
    /// Item must be unwrapped first.
    pub const WRAPPED: Self = Self(16);
    /// Item is not loaded yet; transient.
    pub const NOT_LOADED: Self = Self(32);
    /// Item is blocklisted.
    pub const BLOCKLISTED: Self = Self(64);
    /// Loadout requirements of the current activity are not met.
    pub const LOADOUT_REQUIREMENT_NOT_MET: Self = Self(128);

    const LABELS: [(u32, &'static str); 8] = [
        (128, "Not allowed in current activity"),
        (64, "Item is blocklisted"),
        (32, "Item is not loaded yet"),
        (16, "Item must be unwrapped first"),
        (8, "Character level too low"),
        (4, "Class or quest requirement not met"),
        (2, "Exotic conflict: another Exotic is already equipped"),
        (1, "Item cannot be equipped"),
    ];

    /// Wrap a raw bitmask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no failure bit is set.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Only "not loaded yet" is worth retrying.
    pub const fn is_retryable(self) -> bool {
        self.contains(Self::NOT_LOADED)
    }

    /// Another exotic in the same category is already equipped.
    pub const fn is_exotic_conflict(self) -> bool {
        self.contains(Self::UNIQUE_EQUIP_RESTRICTED)
    }

    /// The character is in an activity that locks its loadout.
    pub const fn is_activity_restriction(self) -> bool {
        self.contains(Self::LOADOUT_REQUIREMENT_NOT_MET)
    }

    /// Human-readable description listing every set flag, highest flag first.
    pub fn label(self) -> String {
        if self.0 == 0 {
            return "Success".to_string();
        }

        let labels: Vec<&str> = Self::LABELS
            .iter()
            .filter(|(flag, _)| self.0 & flag != 0)
            .map(|(_, label)| *label)
            .collect();

        if labels.is_empty() {
            format!("Unknown failure code ({})", self.0)
        } else {
            labels.join("; ")
        }
    }
}

impl fmt::Display for EquipFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_combined_flags_in_descending_order() {
        assert_eq!(EquipFailureReason::NONE.label(), "Success");
        assert_eq!(
            EquipFailureReason::from_bits(2).label(),
            "Exotic conflict: another Exotic is already equipped"
        );
        assert_eq!(
            EquipFailureReason::from_bits(130).label(),
            "Not allowed in current activity; Exotic conflict: another Exotic is already equipped"
        );
        assert_eq!(
            EquipFailureReason::from_bits(256).label(),
            "Unknown failure code (256)"
        );
    }

    #[test]
    fn classifies_flags() {
        let reason = EquipFailureReason::from_bits(32 | 2);
        assert!(reason.is_retryable());
        assert!(reason.is_exotic_conflict());
        assert!(!reason.is_activity_restriction());
        assert!(EquipFailureReason::from_bits(128).is_activity_restriction());
        assert!(!EquipFailureReason::NONE.is_retryable());
    }
}

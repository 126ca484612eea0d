//! Permission bitmask

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capabilities a role can hold on one module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permission: i32 {
        const VIEW = 1;
        const CREATE = 1 << 1;
        const EDIT = 1 << 2;
        const DELETE = 1 << 3;
        const APPROVE = 1 << 4;
        /// Union of every flag
        const ALL = Self::VIEW.bits()
            | Self::CREATE.bits()
            | Self::EDIT.bits()
            | Self::DELETE.bits()
            | Self::APPROVE.bits();
    }
}

impl Default for Permission {
    fn default() -> Self {
        Self::empty()
    }
}

impl Permission {
    /// Parse a flag name (`View`), a combination (`View,Edit` or `View|Edit`)
    /// or a numeric mask. Anything unrecognized yields the empty mask.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::empty();
        }
        if let Ok(bits) = raw.parse::<i32>() {
            return Self::from_bits(bits).unwrap_or_else(Self::empty);
        }

        let mut mask = Self::empty();
        for part in raw.split([',', '|']).map(str::trim) {
            match Self::from_name_ignore_case(part) {
                Some(flag) => mask |= flag,
                None => return Self::empty(),
            }
        }
        mask
    }

    fn from_name_ignore_case(name: &str) -> Option<Self> {
        Self::all()
            .iter_names()
            .chain(std::iter::once(("ALL", Self::ALL)))
            .find(|(flag, _)| flag.eq_ignore_ascii_case(name))
            .map(|(_, flag)| flag)
    }

    /// Names of the set flags, `View`-style
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .filter(|(name, _)| *name != "ALL")
            .map(|(name, _)| {
                let mut chars = name.chars();
                chars
                    .next()
                    .map(|first| first.to_string() + &chars.as_str().to_lowercase())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = i32::deserialize(deserializer)?;
        Self::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid permission bits: {:#x}", bits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_the_union() {
        assert_eq!(Permission::ALL.bits(), 31);
        assert_eq!(Permission::ALL, Permission::all());
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(Permission::parse_lenient("View"), Permission::VIEW);
        assert_eq!(Permission::parse_lenient("delete"), Permission::DELETE);
        assert_eq!(Permission::parse_lenient("View, Edit"), Permission::VIEW | Permission::EDIT);
        assert_eq!(Permission::parse_lenient("create|approve"), Permission::CREATE | Permission::APPROVE);
        assert_eq!(Permission::parse_lenient("all"), Permission::ALL);
        assert_eq!(Permission::parse_lenient("5"), Permission::VIEW | Permission::EDIT);
    }

    #[test]
    fn test_malformed_input_is_empty() {
        assert!(Permission::parse_lenient("").is_empty());
        assert!(Permission::parse_lenient("Fly").is_empty());
        assert!(Permission::parse_lenient("View,Fly").is_empty());
        assert!(Permission::parse_lenient("64").is_empty());
        assert!(Permission::parse_lenient("-1").is_empty());
    }

    #[test]
    fn test_names() {
        assert_eq!((Permission::VIEW | Permission::EDIT).names(), vec!["View", "Edit"]);
        assert_eq!(Permission::ALL.names().len(), 5);
    }
}

use core::fmt;
use core::num::NonZeroU32;
use core::str::FromStr;

use crate::error::{CoreError, CoreResult};

macro_rules! table_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(try_from = "i64", into = "i64"))]
        pub struct $name(NonZeroU32);

        impl $name {
            /// The first valid id, 1.
            pub const MIN: Self = Self(NonZeroU32::MIN);

            /// Create an id from its table value; `None` for 0.
            pub const fn new(value: u32) -> Option<Self> {
                match NonZeroU32::new(value) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// The value as stored in the tables.
            pub const fn get(self) -> u32 {
                self.0.get()
            }

            /// Shift the id by a signed offset, failing when the result leaves `1..=u32::MAX`.
            pub fn offset(self, by: i64) -> CoreResult<Self> {
                let shifted = i64::from(self.get()) + by;
                u32::try_from(shifted)
                    .ok()
                    .and_then(Self::new)
                    .ok_or(CoreError::IdOverflow {
                        kind: $kind,
                        base: self.get(),
                        offset: by,
                    })
            }
        }

        impl TryFrom<i64> for $name {
            type Error = CoreError;

            fn try_from(value: i64) -> CoreResult<Self> {
                u32::try_from(value)
                    .ok()
                    .and_then(Self::new)
                    .ok_or(CoreError::InvalidId { kind: $kind, value })
            }
        }

        impl TryFrom<u32> for $name {
            type Error = CoreError;

            fn try_from(value: u32) -> CoreResult<Self> {
                Self::new(value).ok_or(CoreError::InvalidId {
                    kind: $kind,
                    value: i64::from(value),
                })
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                i64::from(id.get())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                let value: i64 = s.trim().parse().map_err(|_| CoreError::InvalidArg {
                    what: format!("'{s}' is not a valid {}", $kind),
                })?;
                Self::try_from(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.get())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.get())
            }
        }
    };
}

table_id!(
    /// Identifier of a node, unique across all node-type tables.
    ///
    /// - `u32` matches the Int32 column the solver reads
    /// - `NonZero` enables `Option<NodeId>` to be pointer-optimized and
    ///   rules out the invalid id 0
    NodeId,
    "node_id"
);

table_id!(
    /// Identifier of a row in the Link table.
    LinkId,
    "link_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_an_id() {
        assert!(NodeId::new(0).is_none());
        assert!(NodeId::try_from(0_i64).is_err());
        assert!(LinkId::try_from(-3_i64).is_err());
    }

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<NodeId>(),
            core::mem::size_of::<Option<NodeId>>()
        );
    }

    #[test]
    fn offset_checks_bounds() {
        let id = NodeId::new(10).unwrap();
        assert_eq!(id.offset(5).unwrap().get(), 15);
        assert_eq!(id.offset(-9).unwrap().get(), 1);
        assert!(id.offset(-10).is_err());
    }

    #[test]
    fn parse_and_display() {
        let id: NodeId = " 42 ".parse().unwrap();
        assert_eq!(id.to_string(), "42");
        assert_eq!(format!("{id:?}"), "NodeId(42)");
        assert!("abc".parse::<LinkId>().is_err());
    }
}

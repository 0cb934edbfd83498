//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings for backward compatibility.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for String {
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Key of an entry in the manifest's `extensions` table.
    ExtensionName
);

string_newtype!(
    /// Name of the container the lifecycle runs against.
    ContainerName
);

string_newtype!(
    /// Named volume holding the engine's data directory.
    VolumeName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_name_display_and_as_ref() {
        let name = ExtensionName::new("age");
        assert_eq!(name.to_string(), "age");
        assert_eq!(name.as_str(), "age");
        assert_eq!(AsRef::<str>::as_ref(&name), "age");
    }

    #[test]
    fn container_name_serde_is_transparent() {
        let name = ContainerName::new("postgres-extensions");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"postgres-extensions\"");
        let back: ContainerName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn volume_name_into_inner() {
        let v = VolumeName::new("pgdata".to_owned());
        assert_eq!(v.into_inner(), "pgdata");
    }

    #[test]
    fn names_compare_with_strings() {
        let name = ExtensionName::from("timescaledb");
        assert_eq!(name, "timescaledb".to_owned());
        assert_eq!(String::from("timescaledb"), name);
    }
}

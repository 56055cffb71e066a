#![deny(unsafe_code)]

use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Organization (tenant) scope. Every store query is filtered by it.
    TenantId
);
numeric_id!(PatientId);
numeric_id!(ConditionId);
numeric_id!(
    /// Identifier of a screening-type definition; also the stable tie-break
    /// when selecting among variants.
    ScreeningTypeId
);
numeric_id!(ScreeningId);
numeric_id!(
    /// Document identifier, unique across local and EHR-sourced documents.
    DocumentId
);
numeric_id!(ImmunizationId);

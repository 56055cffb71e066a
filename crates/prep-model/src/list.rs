//! Ordered string lists that remember how they were stored.
//!
//! Keyword and trigger-condition lists historically lived in a text column
//! holding JSON. Absence, a literal `null` and an empty array `[]` are three
//! distinct stored states even though all evaluate to "no items", and they
//! must survive a round trip unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum StoredList {
    /// The field was never set.
    #[default]
    Absent,
    /// The field was explicitly set to `null`.
    Null,
    /// A list of values, possibly empty.
    Values(Vec<String>),
    /// Text that could not be parsed as a list; kept verbatim.
    Malformed(String),
}

impl StoredList {
    pub fn values<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Values(items.into_iter().map(Into::into).collect())
    }

    /// Interpret a legacy text column.
    ///
    /// `None` is [`StoredList::Absent`], `"null"` is [`StoredList::Null`], a
    /// JSON array of strings is [`StoredList::Values`]. Anything else is kept
    /// as [`StoredList::Malformed`].
    pub fn parse_text(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Absent;
        };
        let trimmed = raw.trim();
        if trimmed == "null" {
            return Self::Null;
        }
        match serde_json::from_str::<Vec<String>>(trimmed) {
            Ok(items) => Self::Values(items),
            Err(_) => Self::Malformed(raw.to_string()),
        }
    }

    /// Items with blank entries dropped, or the raw text when malformed.
    pub fn items(&self) -> Result<Vec<String>, &str> {
        match self {
            Self::Absent | Self::Null => Ok(Vec::new()),
            Self::Values(items) => Ok(items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()),
            Self::Malformed(raw) => Err(raw.as_str()),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl Serialize for StoredList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent | Self::Null => serializer.serialize_none(),
            Self::Values(items) => items.serialize(serializer),
            Self::Malformed(raw) => serializer.serialize_str(raw),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRepr {
    Values(Vec<String>),
    Text(String),
}

impl<'de> Deserialize<'de> for StoredList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // A present field is never Absent; use `#[serde(default)]` for that.
        Ok(match Option::<StoredRepr>::deserialize(deserializer)? {
            None => Self::Null,
            Some(StoredRepr::Values(items)) => Self::Values(items),
            Some(StoredRepr::Text(text)) => match Self::parse_text(Some(&text)) {
                Self::Absent => Self::Null,
                other => other,
            },
        })
    }
}

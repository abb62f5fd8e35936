//! Small validated vocabulary types shared across the cohort workspace.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input text was longer than the permitted bound
    #[error("Text exceeds maximum length of {max} characters")]
    TooLong { max: usize },
    /// The input did not name a known dataset shape
    #[error("Unknown dataset shape: {0}")]
    UnknownShape(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction and bounded to
/// [`NonEmptyText::MAX_LEN`] characters, which keeps user names and display names safe to echo
/// into backend parameters and hub messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Upper bound on the trimmed length, in characters.
    pub const MAX_LEN: usize = 1024;

    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty, or
    /// [`TextError::TooLong`] if it exceeds [`NonEmptyText::MAX_LEN`] characters.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NonEmptyText::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Structural category of a dataset.
///
/// A dataset request names the shape it expects; the resolved dataset must carry the same
/// shape or the request is a shape mismatch rather than a not-found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    /// Free-form dataset whose columns are described by the dataset itself.
    Dynamic,
    Demographic,
    Observation,
    Encounter,
    Condition,
    Procedure,
    Immunization,
    Allergy,
    MedicationRequest,
    MedicationAdministration,
}

impl Shape {
    /// All shapes, in declaration order.
    pub const ALL: [Shape; 10] = [
        Shape::Dynamic,
        Shape::Demographic,
        Shape::Observation,
        Shape::Encounter,
        Shape::Condition,
        Shape::Procedure,
        Shape::Immunization,
        Shape::Allergy,
        Shape::MedicationRequest,
        Shape::MedicationAdministration,
    ];

    /// Returns the camelCase token used on the wire and in backend rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Dynamic => "dynamic",
            Shape::Demographic => "demographic",
            Shape::Observation => "observation",
            Shape::Encounter => "encounter",
            Shape::Condition => "condition",
            Shape::Procedure => "procedure",
            Shape::Immunization => "immunization",
            Shape::Allergy => "allergy",
            Shape::MedicationRequest => "medicationRequest",
            Shape::MedicationAdministration => "medicationAdministration",
        }
    }

    /// Parses a shape token, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::UnknownShape`] if `s` does not name a shape.
    pub fn parse(s: &str) -> Result<Self, TextError> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TextError::UnknownShape(s.to_owned()))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::parse(s)
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Opaque job identifier, assigned by the caller before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Wrap a caller-supplied identifier. The id is also used as a blob key
    /// segment, so empty ids, path separators and the relative segments
    /// `.` and `..` are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::Validation("Job id must not be empty".into()));
        }
        if id.contains('/') {
            return Err(CoreError::Validation(format!(
                "Job id '{id}' must not contain '/'"
            )));
        }
        if id == "." || id == ".." {
            return Err(CoreError::Validation(format!(
                "Job id '{id}' is not a valid key segment"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// GarmentClass
// ---------------------------------------------------------------------------

/// Garment categories understood by the try-on model.
///
/// The first fourteen variants form the primary vocabulary offered to the
/// classifier; the `Other*` variants are the secondary fallback list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GarmentClass {
    LongSleeveShirt,
    ShortSleeveShirt,
    NoSleeveShirt,
    UpperBody,
    LongPants,
    ShortPants,
    LowerBody,
    LongDress,
    ShortDress,
    FullBody,
    Shoes,
    Boots,
    Footwear,
    FullBodyOutfit,
    OtherUpperBody,
    OtherLowerBody,
    OtherFullBody,
    OtherFootwear,
}

impl GarmentClass {
    /// Preferred classes, in the order they are offered to the classifier.
    pub const PRIMARY: &'static [GarmentClass] = &[
        Self::LongSleeveShirt,
        Self::ShortSleeveShirt,
        Self::NoSleeveShirt,
        Self::UpperBody,
        Self::LongPants,
        Self::ShortPants,
        Self::LowerBody,
        Self::LongDress,
        Self::ShortDress,
        Self::FullBody,
        Self::Shoes,
        Self::Boots,
        Self::Footwear,
        Self::FullBodyOutfit,
    ];

    /// Used only when none of the primary classes applies.
    pub const SECONDARY: &'static [GarmentClass] = &[
        Self::OtherUpperBody,
        Self::OtherLowerBody,
        Self::OtherFullBody,
        Self::OtherFootwear,
    ];

    /// Class used whenever classification fails.
    pub const DEFAULT: GarmentClass = Self::UpperBody;

    /// Wire name, e.g. `"LONG_SLEEVE_SHIRT"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LongSleeveShirt => "LONG_SLEEVE_SHIRT",
            Self::ShortSleeveShirt => "SHORT_SLEEVE_SHIRT",
            Self::NoSleeveShirt => "NO_SLEEVE_SHIRT",
            Self::UpperBody => "UPPER_BODY",
            Self::LongPants => "LONG_PANTS",
            Self::ShortPants => "SHORT_PANTS",
            Self::LowerBody => "LOWER_BODY",
            Self::LongDress => "LONG_DRESS",
            Self::ShortDress => "SHORT_DRESS",
            Self::FullBody => "FULL_BODY",
            Self::Shoes => "SHOES",
            Self::Boots => "BOOTS",
            Self::Footwear => "FOOTWEAR",
            Self::FullBodyOutfit => "FULL_BODY_OUTFIT",
            Self::OtherUpperBody => "OTHER_UPPER_BODY",
            Self::OtherLowerBody => "OTHER_LOWER_BODY",
            Self::OtherFullBody => "OTHER_FULL_BODY",
            Self::OtherFootwear => "OTHER_FOOTWEAR",
        }
    }

    /// Primary followed by secondary classes.
    pub fn all() -> impl Iterator<Item = GarmentClass> {
        Self::PRIMARY.iter().chain(Self::SECONDARY).copied()
    }
}

impl fmt::Display for GarmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GarmentClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::all()
            .find(|class| class.as_str() == wanted)
            .ok_or_else(|| CoreError::Validation(format!("Unknown garment class '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ImageFormat
// ---------------------------------------------------------------------------

/// Raster formats accepted by the vision models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Parse a file extension. `jpg` is normalised to [`ImageFormat::Jpeg`].
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Derive the format from the extension of a blob key.
    pub fn from_key(key: &str) -> Option<Self> {
        let file = key.rsplit('/').next().unwrap_or(key);
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

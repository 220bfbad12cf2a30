//! In-memory image payloads handed between stages.

/// The garment photo a job was submitted with.
#[derive(Debug, Clone)]
pub struct ClothImage {
    pub key: String,
    pub bytes: Vec<u8>,
}

impl ClothImage {
    pub fn new(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            bytes,
        }
    }

    /// Declared format, taken from the key's file extension.
    pub fn extension(&self) -> &str {
        let file = self.key.rsplit('/').next().unwrap_or(&self.key);
        file.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
    }
}

/// A persisted person image used as a try-on source.
#[derive(Debug, Clone)]
pub struct ModelImage {
    pub key: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_last_segment() {
        assert_eq!(
            ClothImage::new("input/shirt.JPG", vec![]).extension(),
            "JPG"
        );
        assert_eq!(ClothImage::new("in.put/shirt", vec![]).extension(), "");
    }
}

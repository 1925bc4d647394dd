//! Thumbnail size classes
//!
//! The shared cache only knows two boxes: 128px ("normal") and 256px ("large").
//! Pixel counts, numeric strings and names are folded onto one of them here,
//! or rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// 128x128 box, stored under `normal/`
    Normal,
    /// 256x256 box, stored under `large/`
    Large,
}

impl SizeClass {
    /// Lookup order used when the caller does not ask for a size
    pub const PROBE_ORDER: [SizeClass; 2] = [SizeClass::Large, SizeClass::Normal];

    /// Edge of the square box a thumbnail of this class must fit in
    pub const fn pixels(self) -> u32 {
        match self {
            Self::Normal => 128,
            Self::Large => 256,
        }
    }

    /// Directory name under the cache root
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Large => "large",
        }
    }

    /// Map a requested pixel size onto the smallest class that holds it.
    ///
    /// `1..=128` is normal, `129..=256` is large, anything else is rejected.
    pub fn from_pixels(pixels: i64) -> Result<Self> {
        match pixels {
            1..=128 => Ok(Self::Normal),
            129..=256 => Ok(Self::Large),
            _ => Err(Error::InvalidSize(pixels.to_string())),
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for SizeClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.eq_ignore_ascii_case("normal") {
            return Ok(Self::Normal);
        }
        if token.eq_ignore_ascii_case("large") {
            return Ok(Self::Large);
        }

        token
            .parse::<i64>()
            .map_err(|_| Error::InvalidSize(s.to_owned()))
            .and_then(Self::from_pixels)
    }
}

impl TryFrom<i64> for SizeClass {
    type Error = Error;

    fn try_from(pixels: i64) -> Result<Self> {
        Self::from_pixels(pixels)
    }
}

impl TryFrom<u32> for SizeClass {
    type Error = Error;

    fn try_from(pixels: u32) -> Result<Self> {
        Self::from_pixels(i64::from(pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbolic_names() {
        assert_eq!("normal".parse::<SizeClass>().unwrap(), SizeClass::Normal);
        assert_eq!("large".parse::<SizeClass>().unwrap(), SizeClass::Large);
        assert_eq!("Large".parse::<SizeClass>().unwrap(), SizeClass::Large);
        assert_eq!("128".parse::<SizeClass>().unwrap(), SizeClass::Normal);
        assert_eq!("256".parse::<SizeClass>().unwrap(), SizeClass::Large);
    }

    #[test]
    fn test_numeric_aliases() {
        assert_eq!(SizeClass::try_from(1u32).unwrap(), SizeClass::Normal);
        assert_eq!(SizeClass::try_from(128u32).unwrap(), SizeClass::Normal);
        assert_eq!(SizeClass::try_from(129u32).unwrap(), SizeClass::Large);
        assert_eq!(SizeClass::try_from(256i64).unwrap(), SizeClass::Large);
    }

    #[test]
    fn test_rejects_unknown_sizes() {
        for bad in ["", "huge", "0", "-5", "257", "12.5"] {
            let err = bad.parse::<SizeClass>().unwrap_err();
            assert!(matches!(err, Error::InvalidSize(_)), "{bad:?} gave {err:?}");
        }
        assert!(SizeClass::try_from(512u32).is_err());
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(SizeClass::Normal.pixels(), 128);
        assert_eq!(SizeClass::Large.pixels(), 256);
        assert_eq!(SizeClass::Large.to_string(), "large");
    }
}

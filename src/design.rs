// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Design-file types.
//!
//! A design object stores its content out-of-band as a design file. The
//! object's `designType` selects the particular code used when downloading
//! the file and the media type used when uploading it again.

use std::fmt;
use std::str::FromStr;

/// Field holding the design file's UUID.
pub const FIELD_DESIGN_FILE_UUID: &str = "doFileUUID";

/// Field holding the design type.
pub const FIELD_DESIGN_TYPE: &str = "designType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesignType {
    Surfaces,
    Roads,
    Linework,
}

impl DesignType {
    pub const ALL: [DesignType; 3] = [DesignType::Surfaces, DesignType::Roads, DesignType::Linework];

    /// Short code of the design-file subtype.
    pub fn particular(&self) -> &'static str {
        match self {
            DesignType::Surfaces => "TN3",
            DesignType::Roads => "RD3",
            DesignType::Linework => "LN3",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            DesignType::Surfaces => "application/vnd.topcon.tn3",
            DesignType::Roads => "application/vnd.topcon.rd3",
            DesignType::Linework => "application/vnd.topcon.ln3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DesignType::Surfaces => "Surfaces",
            DesignType::Roads => "Roads",
            DesignType::Linework => "Linework",
        }
    }

    /// File name used for the uploaded part, e.g. `U1.tn3`.
    pub fn file_name(&self, uuid: &str) -> String {
        format!("{}.{}", uuid, self.particular().to_ascii_lowercase())
    }
}

impl fmt::Display for DesignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized `designType` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown design type '{0}'")]
pub struct UnknownDesignType(pub String);

impl FromStr for DesignType {
    type Err = UnknownDesignType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DesignType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDesignType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surfaces_mapping() {
        let t: DesignType = "Surfaces".parse().unwrap();
        assert_eq!(t.particular(), "TN3");
        assert_eq!(t.media_type(), "application/vnd.topcon.tn3");
        assert_eq!(t.file_name("U1"), "U1.tn3");
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("roads".parse::<DesignType>().unwrap(), DesignType::Roads);
        assert_eq!("LINEWORK".parse::<DesignType>().unwrap(), DesignType::Linework);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "Points".parse::<DesignType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown design type 'Points'");
    }

    #[test]
    fn test_display_roundtrips_all() {
        for t in DesignType::ALL {
            assert_eq!(t.to_string().parse::<DesignType>().unwrap(), t);
        }
    }
}

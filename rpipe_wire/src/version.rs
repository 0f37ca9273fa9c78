use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Display string of any version that failed to parse.
pub const INVALID_VERSION_STR: &str = "Unable to parse version";

const INVALID_TRIPLE: (i64, i64, i64) = (-1, -1, -1);

/// A `major.minor.patch` version number.
///
/// Parsing never fails: anything that is not three dot-separated integers
/// becomes the invalid sentinel, which orders below every valid version.
/// Equality is by the original string, ordering is by the numeric triple,
/// and valid versions round-trip their exact input text.
#[derive(Clone, Debug)]
pub struct Version {
    repr: String,
    triple: (i64, i64, i64),
}

impl Version {
    pub fn parse(v: &str) -> Self {
        let fields: Vec<i64> = v.split('.').map_while(|i| i.parse().ok()).collect();
        match <[i64; 3]>::try_from(fields.as_slice()) {
            Ok([major, minor, patch]) if v.split('.').count() == 3 => Self {
                repr: v.to_owned(),
                triple: (major, minor, patch),
            },
            _ => Self {
                repr: INVALID_VERSION_STR.to_owned(),
                triple: INVALID_TRIPLE,
            },
        }
    }

    pub fn invalid(&self) -> bool {
        self.triple == INVALID_TRIPLE
    }

    /// True for the sentinel version unversioned browser clients report.
    pub fn is_web(&self) -> bool {
        self.triple == (0, 0, 0)
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

/// The sentinel version representing unversioned browser access.
pub fn web_version() -> Version {
    Version::parse("0.0.0")
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl From<&str> for Version {
    fn from(v: &str) -> Self {
        Self::parse(v)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.triple.cmp(&other.triple))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.repr)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Version::parse(&s))
    }
}

use crate::errors::ReferenceError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    str::FromStr,
};

/// Content address of a blob or manifest
///
/// A digest is an algorithm name and a lowercase hex string separated by a
/// single colon, for example `sha256:9f86d0...`. Two digests are equal when
/// their serialized forms are equal.
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    algorithm_pos: Range<usize>,
    hex_pos: Range<usize>,
}

impl ContentDigest {
    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use imagestream::ContentDigest;
    /// let digest = ContentDigest::parse("sha256:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.algorithm(), "sha256");
    /// assert_eq!(digest.hex(), "00112233445566778899aabbccddeeff");
    /// ```
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", ContentDigest::regex_str())).unwrap();
        }
        let captures = RE
            .captures(s)
            .ok_or_else(|| ReferenceError::InvalidDigestFormat(s.to_owned()))?;
        match (captures.name("dig_f"), captures.name("dig_h")) {
            (Some(algorithm), Some(hex)) => Ok(ContentDigest {
                serialized: s.to_owned(),
                algorithm_pos: algorithm.range(),
                hex_pos: hex.range(),
            }),
            _ => Err(ReferenceError::InvalidDigestFormat(s.to_owned())),
        }
    }

    /// Digest of some content, using `sha256`
    ///
    /// ```
    /// # use imagestream::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content: &[u8]) -> Self {
        let serialized = format!("sha256:{:x}", Sha256::digest(content));
        let hex_start = "sha256:".len();
        ContentDigest {
            algorithm_pos: 0..hex_start - 1,
            hex_pos: hex_start..serialized.len(),
            serialized,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// The algorithm portion, before the colon
    pub fn algorithm(&self) -> &str {
        &self.serialized[self.algorithm_pos.clone()]
    }

    /// The hex portion, after the colon; at least 32 digits
    pub fn hex(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<dig>", // digest group
            /*  */ "(?P<dig_f>", // algorithm group
            /* -- */ "[a-zA-Z][a-zA-Z0-9]*",
            /* -- */ "(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*", // separated components
            /*  */ ")",
            /*  */ "[:]",
            /*  */ "(?P<dig_h>[a-f0-9]{32,})",
            ")",
        )
    }
}

impl Eq for ContentDigest {}

impl PartialEq for ContentDigest {
    fn eq(&self, other: &Self) -> bool {
        self.serialized.eq(&other.serialized)
    }
}

impl PartialEq<str> for ContentDigest {
    fn eq(&self, other: &str) -> bool {
        self.serialized == other
    }
}

impl FromStr for ContentDigest {
    type Err = ReferenceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentDigest::parse(s)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Hash for ContentDigest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl Ord for ContentDigest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized.cmp(&other.serialized)
    }
}

impl PartialOrd for ContentDigest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

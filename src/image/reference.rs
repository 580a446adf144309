use crate::{errors::ReferenceError, image::ContentDigest};
use regex::Regex;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    str::FromStr,
};

/// Parsed fully-qualified image reference
///
/// A reference looks like `registry/namespace/name:tag@digest`. Only the name
/// is mandatory. The metadata service records references like this for every
/// tag event, naming the registry an image was imported from.
///
/// Telling the registry apart from the first path segment uses the same
/// heuristic docker uses: the segment is a registry if it contains a dot or a
/// colon, or if it is exactly `localhost`. Of the remaining path, the first
/// segment is the namespace and everything after it is the name.
#[derive(Clone)]
pub struct ImageReference {
    serialized: String,
    registry_pos: Option<Range<usize>>,
    namespace_pos: Option<Range<usize>>,
    name_pos: Range<usize>,
    tag_pos: Option<Range<usize>>,
    digest: Option<ContentDigest>,
}

fn registry_regex_str() -> &'static str {
    concat!(
        "(?P<reg>",
        /*  */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])", // first domain component
        /*  */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*", // more components
        /*  */ "(?::[0-9]+)?", // port
        ")",
    )
}

fn repository_regex_str() -> &'static str {
    concat!(
        "(?P<repo>",
        /*  */ "[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*",
        /*  */ "(?:/[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*)*",
        ")",
    )
}

fn tag_regex_str() -> &'static str {
    "(?P<tag>[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,127})"
}

impl ImageReference {
    /// Parse a [prim@str] as an [ImageReference]
    ///
    /// ```
    /// # use imagestream::ImageReference;
    /// let r = ImageReference::parse("quay.io/team/app:v1").unwrap();
    /// assert_eq!(r.registry(), Some("quay.io"));
    /// assert_eq!(r.namespace(), Some("team"));
    /// assert_eq!(r.name(), "app");
    /// assert_eq!(r.tag(), Some("v1"));
    /// ```
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        lazy_static! {
            static ref HAS_REGISTRY: Regex = Regex::new(concat!(
                "^(?:",
                /* */ "[^/]*[.:][^/]*", // a dot or a port
                /* */ "|localhost",
                ")/",
            ))
            .unwrap();
            static ref WITH_REGISTRY: Regex = Regex::new(&format!(
                "^{}/{}(?::{})?(?:@{})?$",
                registry_regex_str(),
                repository_regex_str(),
                tag_regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
            static ref NO_REGISTRY: Regex = Regex::new(&format!(
                "^{}(?::{})?(?:@{})?$",
                repository_regex_str(),
                tag_regex_str(),
                ContentDigest::regex_str()
            ))
            .unwrap();
        }
        let re: &Regex = if HAS_REGISTRY.is_match(s) {
            &WITH_REGISTRY
        } else {
            &NO_REGISTRY
        };
        let captures = re
            .captures(s)
            .ok_or_else(|| ReferenceError::InvalidReferenceFormat(s.to_owned()))?;
        let repo = captures
            .name("repo")
            .ok_or_else(|| ReferenceError::InvalidReferenceFormat(s.to_owned()))?
            .range();
        let (namespace_pos, name_pos) = match s[repo.clone()].find('/') {
            None => (None, repo),
            Some(slash) => (
                Some(repo.start..repo.start + slash),
                repo.start + slash + 1..repo.end,
            ),
        };
        let digest = match captures.name("dig") {
            None => None,
            Some(m) => Some(ContentDigest::parse(m.as_str())?),
        };
        Ok(ImageReference {
            serialized: s.to_owned(),
            registry_pos: captures.name("reg").map(|m| m.range()),
            namespace_pos,
            name_pos,
            tag_pos: captures.name("tag").map(|m| m.range()),
            digest,
        })
    }

    /// Assemble a reference from its parts
    ///
    /// Fails if any part is malformed, or if the assembled string would parse
    /// back into different parts than the ones given.
    pub fn from_parts(
        registry: Option<&str>,
        namespace: Option<&str>,
        name: &str,
        tag: Option<&str>,
        digest: Option<&ContentDigest>,
    ) -> Result<Self, ReferenceError> {
        let mut combined = String::new();
        if let Some(registry) = registry {
            combined.push_str(registry);
            combined.push('/');
        }
        if let Some(namespace) = namespace {
            combined.push_str(namespace);
            combined.push('/');
        }
        combined.push_str(name);
        if let Some(tag) = tag {
            combined.push(':');
            combined.push_str(tag);
        }
        if let Some(digest) = digest {
            combined.push('@');
            combined.push_str(digest.as_str());
        }
        let parsed = ImageReference::parse(&combined)?;
        if parsed.registry() == registry
            && parsed.namespace() == namespace
            && parsed.name() == name
            && parsed.tag() == tag
            && parsed.digest() == digest
        {
            Ok(parsed)
        } else {
            // Parsing ambiguity
            Err(ReferenceError::InvalidReferenceFormat(combined))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Registry host, with port if one was given
    pub fn registry(&self) -> Option<&str> {
        self.registry_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn name(&self) -> &str {
        &self.serialized[self.name_pos.clone()]
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag_pos
            .as_ref()
            .map(|pos| &self.serialized[pos.clone()])
    }

    pub fn digest(&self) -> Option<&ContentDigest> {
        self.digest.as_ref()
    }

    /// The same repository with tag and digest removed
    pub fn as_repository(&self) -> ImageReference {
        let end = self.name_pos.end;
        ImageReference {
            serialized: self.serialized[..end].to_owned(),
            registry_pos: self.registry_pos.clone(),
            namespace_pos: self.namespace_pos.clone(),
            name_pos: self.name_pos.clone(),
            tag_pos: None,
            digest: None,
        }
    }
}

impl Eq for ImageReference {}

impl PartialEq for ImageReference {
    fn eq(&self, other: &Self) -> bool {
        self.serialized.eq(&other.serialized)
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Hash for ImageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl Ord for ImageReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized.cmp(&other.serialized)
    }
}

impl PartialOrd for ImageReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

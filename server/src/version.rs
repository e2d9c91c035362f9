//! Known host revisions.
//!
//! Every supported release with the internal revision number its server
//! internals are packaged under (`v1_20_R3`) and its network protocol. Markers
//! that do not name a release in this table resolve to nothing; the engine
//! never guesses a neighbouring revision.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Internal revision (`R<n>` in the revision tag).
    pub revision: u8,
    pub protocol: u32,
}

const fn v(minor: u8, patch: u8, revision: u8, protocol: u32) -> HostVersion {
    HostVersion {
        major: 1,
        minor,
        patch,
        revision,
        protocol,
    }
}

/// Ascending by release.
static KNOWN_VERSIONS: &[HostVersion] = &[
    // 1.16 Nether Update
    v(16, 0, 1, 735),
    v(16, 1, 1, 736),
    v(16, 2, 2, 751),
    v(16, 3, 2, 753),
    v(16, 4, 3, 754),
    v(16, 5, 3, 754),
    // 1.17 Caves & Cliffs I
    v(17, 0, 1, 755),
    v(17, 1, 1, 756),
    // 1.18 Caves & Cliffs II
    v(18, 0, 1, 757),
    v(18, 1, 1, 757),
    v(18, 2, 2, 758),
    // 1.19 Wild Update
    v(19, 0, 1, 759),
    v(19, 1, 1, 760),
    v(19, 2, 1, 760),
    v(19, 3, 2, 761),
    v(19, 4, 3, 762),
    // 1.20 Trails & Tales
    v(20, 0, 1, 763),
    v(20, 1, 1, 763),
    v(20, 2, 2, 764),
    v(20, 3, 3, 765),
    v(20, 4, 3, 765),
    v(20, 5, 4, 766),
    v(20, 6, 4, 766),
    // 1.21 Tricky Trials and drops
    v(21, 0, 1, 767),
    v(21, 1, 1, 767),
    v(21, 2, 2, 768),
    v(21, 3, 2, 768),
    v(21, 4, 3, 769),
    v(21, 5, 4, 770),
    v(21, 6, 5, 771),
    v(21, 7, 6, 772),
    v(21, 8, 6, 772),
    v(21, 9, 7, 773),
    v(21, 10, 7, 773),
    v(21, 11, 8, 774),
];

fn marker_patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some((
                Regex::new(r"\d+\.\d+\.\d+").ok()?,
                Regex::new(r"\d+\.\d+").ok()?,
            ))
        })
        .as_ref()
}

impl HostVersion {
    pub fn known() -> &'static [HostVersion] {
        KNOWN_VERSIONS
    }

    pub fn lookup(major: u8, minor: u8, patch: u8) -> Option<HostVersion> {
        KNOWN_VERSIONS
            .iter()
            .copied()
            .find(|v| v.triple() == (major, minor, patch))
    }

    /// Extract the release from a free-form marker such as `"git-Paper-196 (MC: 1.20.4)"`.
    ///
    /// The first `major.minor.patch` wins; a bare `major.minor` means patch 0.
    pub fn parse_marker(marker: &str) -> Option<HostVersion> {
        let (full, short) = marker_patterns()?;
        let text = match full.find(marker) {
            Some(m) => m.as_str().to_string(),
            None => format!("{}.0", short.find(marker)?.as_str()),
        };

        let mut parts = text.split('.').map(|p| p.parse::<u8>().ok());
        let (major, minor, patch) = (parts.next()??, parts.next()??, parts.next()??);
        let found = Self::lookup(major, minor, patch);
        if found.is_none() {
            log::warn!("unknown host version {text} in marker {marker:?}");
        }
        found
    }

    /// Latest release speaking `protocol`.
    pub fn by_protocol(protocol: u32) -> Option<HostVersion> {
        KNOWN_VERSIONS
            .iter()
            .rev()
            .copied()
            .find(|v| v.protocol == protocol)
    }

    pub fn all_by_protocol(protocol: u32) -> Vec<HostVersion> {
        KNOWN_VERSIONS
            .iter()
            .copied()
            .filter(|v| v.protocol == protocol)
            .collect()
    }

    #[inline]
    pub fn triple(&self) -> (u8, u8, u8) {
        (self.major, self.minor, self.patch)
    }

    #[inline]
    pub fn is_at_least(&self, major: u8, minor: u8, patch: u8) -> bool {
        self.triple() >= (major, minor, patch)
    }

    /// Package tag of the host internals, e.g. `v1_20_R3`.
    pub fn revision_tag(&self) -> String {
        format!("v{}_{}_R{}", self.major, self.minor, self.revision)
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Inclusive release range used to match strategies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VersionRange {
    pub min: (u8, u8, u8),
    pub max: (u8, u8, u8),
}

impl VersionRange {
    pub const fn new(min: (u8, u8, u8), max: (u8, u8, u8)) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, version: &HostVersion) -> bool {
        let t = version.triple();
        self.min <= t && t <= self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, c) = self.min;
        let (x, y, z) = self.max;
        write!(f, "{a}.{b}.{c}..={x}.{y}.{z}")
    }
}

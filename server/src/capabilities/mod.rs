//! Version capability provider.
//!
//! The host's internals differ between revisions (entity kinds, metadata slot
//! layouts, block names). The rest of the engine only sees the fixed
//! [`HostCapabilities`] interface. At startup the provider reads the host's
//! version marker, walks its ordered strategy list and builds the first
//! strategy whose range contains the running release.
//!
//! Design notes
//! - Resolution happens exactly once. The result is an immutable
//!   [`VersionCapabilities`] shared through `Rc`; re-resolving needs a restart.
//! - No match is fatal ([`UnsupportedHostVersion`]). A strategy for a
//!   neighbouring revision is never used as a fallback.
//! - Strategies cover ABI-stable ranges, not individual releases.

pub mod armor_stand;
pub mod blocks;
pub mod display;

use std::fmt;
use std::rc::Rc;

use shared::{ShapeDescriptor, Transform};

use crate::error::{HostError, UnsupportedHostVersion};
use crate::host::{BlockPos, HostProxyKey, HostWorld};
use crate::version::{HostVersion, VersionRange};

/// What the engine needs from the host, independent of its revision.
pub trait HostCapabilities {
    fn read_host_transform(&self, key: HostProxyKey) -> Result<Transform, HostError>;

    fn write_host_transform(&self, key: HostProxyKey, transform: &Transform) -> Result<(), HostError>;

    /// Spawn a visual proxy for a body of the given shape.
    fn spawn_host_proxy(
        &self,
        shape: &ShapeDescriptor,
        transform: &Transform,
    ) -> Result<HostProxyKey, HostError>;

    /// Remove a proxy previously returned by `spawn_host_proxy`. Absent proxies are ignored.
    fn despawn_host_proxy(&self, key: HostProxyKey);

    fn is_host_proxy_valid(&self, key: HostProxyKey) -> bool;

    /// Collision shape of the block at `pos`, or `None` for passable blocks.
    fn shape_for_block(&self, pos: BlockPos) -> Option<ShapeDescriptor>;
}

/// Inputs handed to a strategy factory.
#[derive(Clone)]
pub struct StrategyContext {
    pub host: Rc<dyn HostWorld>,
    pub version: HostVersion,
    /// Client-side interpolation for proxies that support it (host ticks).
    pub teleport_interpolation_ticks: i32,
}

pub type StrategyFactory = fn(StrategyContext) -> Box<dyn HostCapabilities>;

/// One entry of the ordered strategy list.
#[derive(Clone)]
pub struct StrategyEntry {
    pub name: &'static str,
    pub range: VersionRange,
    pub factory: StrategyFactory,
}

impl fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("name", &self.name)
            .field("range", &self.range)
            .finish()
    }
}

/// Resolved, immutable capability bundle.
pub struct VersionCapabilities {
    version: HostVersion,
    strategy: &'static str,
    caps: Box<dyn HostCapabilities>,
}

impl VersionCapabilities {
    pub fn version(&self) -> HostVersion {
        self.version
    }

    /// Name of the selected strategy.
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn capabilities(&self) -> &dyn HostCapabilities {
        self.caps.as_ref()
    }
}

impl fmt::Debug for VersionCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionCapabilities")
            .field("version", &self.version)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityProvider {
    entries: Vec<StrategyEntry>,
}

impl Default for CapabilityProvider {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilityProvider {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The shipped strategies, most specific range first.
    pub fn standard() -> Self {
        let mut provider = Self::empty();
        provider.register(display::DISPLAY_1202);
        provider.register(display::DISPLAY_1194);
        provider.register(armor_stand::LEGACY_117);
        provider.register(armor_stand::LEGACY_116);
        provider
    }

    /// Append an entry. Earlier entries win on overlapping ranges.
    pub fn register(&mut self, entry: StrategyEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Insert an entry ahead of every existing one.
    pub fn register_first(&mut self, entry: StrategyEntry) -> &mut Self {
        self.entries.insert(0, entry);
        self
    }

    pub fn entries(&self) -> &[StrategyEntry] {
        &self.entries
    }

    /// First entry whose range contains `version`.
    pub fn select(&self, version: &HostVersion) -> Option<&StrategyEntry> {
        self.entries.iter().find(|e| e.range.contains(version))
    }

    /// Probe the host and build the matching strategy.
    pub fn resolve(
        &self,
        host: Rc<dyn HostWorld>,
        teleport_interpolation_ticks: i32,
    ) -> Result<VersionCapabilities, UnsupportedHostVersion> {
        let marker = host.version_marker();
        let unsupported = || UnsupportedHostVersion {
            marker: marker.clone(),
        };

        let version = HostVersion::parse_marker(&marker).ok_or_else(unsupported)?;
        let entry = self.select(&version).ok_or_else(unsupported)?;

        log::info!(
            "host {} ({}) resolved to strategy {} [{}]",
            version,
            version.revision_tag(),
            entry.name,
            entry.range
        );

        let caps = (entry.factory)(StrategyContext {
            host,
            version,
            teleport_interpolation_ticks,
        });
        Ok(VersionCapabilities {
            version,
            strategy: entry.name,
            caps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;

    fn resolve(marker: &str) -> Result<VersionCapabilities, UnsupportedHostVersion> {
        CapabilityProvider::standard().resolve(Rc::new(InMemoryHost::new(marker)), 2)
    }

    #[test]
    fn each_known_release_has_exactly_one_first_match() {
        let provider = CapabilityProvider::standard();
        for version in HostVersion::known() {
            assert!(
                provider.select(version).is_some(),
                "no strategy for {version}"
            );
        }
    }

    #[test]
    fn ranges_pick_the_expected_strategy() {
        assert_eq!(resolve("MC: 1.16.5").unwrap().strategy(), armor_stand::LEGACY_116.name);
        assert_eq!(resolve("MC: 1.17.1").unwrap().strategy(), armor_stand::LEGACY_117.name);
        assert_eq!(resolve("MC: 1.19.3").unwrap().strategy(), armor_stand::LEGACY_117.name);
        assert_eq!(resolve("MC: 1.19.4").unwrap().strategy(), display::DISPLAY_1194.name);
        assert_eq!(resolve("MC: 1.20.2").unwrap().strategy(), display::DISPLAY_1202.name);
        assert_eq!(resolve("MC: 1.21.11").unwrap().strategy(), display::DISPLAY_1202.name);
    }

    #[test]
    fn unknown_marker_is_fatal() {
        let err = resolve("CraftBukkit (MC: 1.8.8)").unwrap_err();
        assert_eq!(err.marker, "CraftBukkit (MC: 1.8.8)");
    }

    #[test]
    fn known_release_without_strategy_is_fatal() {
        let mut provider = CapabilityProvider::empty();
        provider.register(display::DISPLAY_1202);
        let host: Rc<dyn HostWorld> = Rc::new(InMemoryHost::new("MC: 1.18.2"));
        assert!(provider.resolve(host, 2).is_err());
    }

    #[test]
    fn register_first_overrides_standard_order() {
        let mut provider = CapabilityProvider::standard();
        provider.register_first(StrategyEntry {
            name: "custom",
            range: VersionRange::new((1, 20, 4), (1, 20, 4)),
            factory: display::DISPLAY_1202.factory,
        });
        let v = HostVersion::lookup(1, 20, 4).unwrap();
        assert_eq!(provider.select(&v).unwrap().name, "custom");
        let other = HostVersion::lookup(1, 20, 6).unwrap();
        assert_eq!(provider.select(&other).unwrap().name, display::DISPLAY_1202.name);
    }
}

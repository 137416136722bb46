//! Cache tier naming and version rollover.
//!
//! Every cached entry lives in exactly one tier. A tier name is
//! `<kind>-<version>`, e.g. `static-v3`, so bumping the configured cache
//! version starts a fresh generation and leaves the old rows behind for
//! activation to sweep.

use std::fmt;

/// The three tier kinds one cache generation is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    /// Long-lived assets: scripts, styles, fonts, the app shell.
    Static,
    /// Shorter-lived content: images, data responses.
    Runtime,
    /// Bookkeeping rows holding last-cached timestamps for the other two.
    Meta,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [TierKind::Static, TierKind::Runtime, TierKind::Meta];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Static => "static",
            TierKind::Runtime => "runtime",
            TierKind::Meta => "meta",
        }
    }
}

/// A concrete tier: kind plus version tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tier {
    kind: TierKind,
    version: String,
}

impl Tier {
    pub fn new(kind: TierKind, version: &str) -> Self {
        Self { kind, version: version.to_string() }
    }

    pub fn kind(&self) -> TierKind {
        self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fully qualified tier name as stored in the `tier` column.
    pub fn name(&self) -> String {
        format!("{}-{}", self.kind.as_str(), self.version)
    }

    /// The meta tier belonging to the same generation.
    pub fn meta_peer(&self) -> Tier {
        Tier { kind: TierKind::Meta, version: self.version.clone() }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.version)
    }
}

/// Tier names that belong to the given version and must survive activation.
pub fn live_tier_names(version: &str) -> Vec<String> {
    TierKind::ALL
        .iter()
        .map(|kind| format!("{}-{version}", kind.as_str()))
        .collect()
}

//! Catalogue of named collections and the schema version introducing each.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A named object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Case, incident and tracing-request records.
    Records,
    /// Form definitions.
    Forms,
    /// Lookup option lists.
    Options,
    /// Current user profile.
    User,
    /// System-wide settings.
    SystemSettings,
    /// Writes waiting for network dispatch.
    OfflineRequests,
    /// Location hierarchy.
    Locations,
    /// Role permissions.
    Permissions,
    /// Application metadata.
    Primero,
    /// Identity providers.
    Idp,
    /// Support contact details.
    ContactInformation,
    /// Agency logos.
    Logos,
    /// Dashboard indicators.
    Dashboards,
}

impl Collection {
    /// Every collection, in creation order.
    pub const ALL: [Self; 13] = [
        Self::Records,
        Self::Forms,
        Self::Options,
        Self::User,
        Self::SystemSettings,
        Self::OfflineRequests,
        Self::Locations,
        Self::Permissions,
        Self::Primero,
        Self::Idp,
        Self::ContactInformation,
        Self::Logos,
        Self::Dashboards,
    ];

    /// Table name of this collection.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Forms => "forms",
            Self::Options => "options",
            Self::User => "user",
            Self::SystemSettings => "system_settings",
            Self::OfflineRequests => "offline_requests",
            Self::Locations => "locations",
            Self::Permissions => "permissions",
            Self::Primero => "primero",
            Self::Idp => "idp",
            Self::ContactInformation => "contact_information",
            Self::Logos => "logos",
            Self::Dashboards => "dashboards",
        }
    }

    /// Schema version that creates this collection.
    #[must_use]
    pub const fn since_version(&self) -> i32 {
        match self {
            Self::Records
            | Self::Forms
            | Self::Options
            | Self::User
            | Self::SystemSettings
            | Self::OfflineRequests => 1,
            Self::Locations | Self::Permissions | Self::Primero => 2,
            Self::Idp | Self::ContactInformation | Self::Logos => 3,
            Self::Dashboards => 4,
        }
    }

    /// Collections created by the given schema version.
    pub fn introduced_in(version: i32) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |c| c.since_version() == version)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| SyncError::NotFound(format!("collection '{s}'")))
    }
}

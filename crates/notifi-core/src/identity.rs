//! Per-tab client identity.
//!
//! Every mounted client owns one [`Identity`]. It tags the live channel at
//! connect time so the server can tell concurrent tabs of the same user apart.
//!
//! The session id survives re-mounts within one tab-scoped storage (it is
//! persisted under [`SESSION_STORAGE_KEY`]); the tab id is regenerated on every
//! construction and never persisted.

use std::{collections::HashMap, fmt};

use tracing::{debug, warn};

use crate::{env::Environment, error::StorageError};

/// Storage key under which the session id is persisted.
pub const SESSION_STORAGE_KEY: &str = "chatSessionId";

/// Separator between identity fields in a [`DeviceId`].
pub const DEVICE_ID_SEPARATOR: char = '|';

/// Length of the random suffix of session and tab ids.
const RANDOM_SUFFIX_LEN: usize = 7;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Host description an identity is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Operating system / platform string (e.g. `Linux x86_64`)
    pub platform: String,
    /// User-agent string of the host
    pub user_agent: String,
}

impl HostInfo {
    /// Describe a host.
    pub fn new(platform: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { platform: platform.into(), user_agent: user_agent.into() }
    }
}

/// Browser family detected from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    /// Mozilla Firefox
    Firefox,
    /// Microsoft Edge (Chromium based)
    Edge,
    /// Google Chrome or another Chromium browser
    Chrome,
    /// Apple Safari
    Safari,
    /// Anything else
    Unknown,
}

impl BrowserFamily {
    /// Detect the family from a user-agent string.
    ///
    /// Edge advertises `Chrome/` as well and Chrome advertises `Safari/`, so
    /// the more specific tokens are checked first.
    pub fn detect(user_agent: &str) -> Self {
        if user_agent.contains("Firefox/") {
            Self::Firefox
        } else if user_agent.contains("Edg/") || user_agent.contains("Edge/") {
            Self::Edge
        } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
            Self::Chrome
        } else if user_agent.contains("Safari/") {
            Self::Safari
        } else {
            Self::Unknown
        }
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firefox => "Firefox",
            Self::Edge => "Edge",
            Self::Chrome => "Chrome",
            Self::Safari => "Safari",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse device class detected from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Phone or tablet
    Mobile,
    /// Everything else
    Desktop,
}

impl DeviceClass {
    /// Detect the class from a user-agent string.
    pub fn detect(user_agent: &str) -> Self {
        const MOBILE_MARKERS: [&str; 6] =
            ["Mobile", "Android", "iPhone", "iPad", "iPod", "Opera Mini"];
        if MOBILE_MARKERS.iter().any(|marker| user_agent.contains(marker)) {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Desktop => "Desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tab-scoped key/value storage for the session id.
pub trait SessionStore {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// - `StorageError::Unavailable` if storage cannot be accessed
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// - `StorageError::Unavailable` if storage cannot be accessed
    /// - `StorageError::WriteFailed` if the write was rejected
    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory [`SessionStore`]. Lives as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: HashMap<String, String>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Opaque identifier of one open client tab.
///
/// The identity fields joined by [`DEVICE_ID_SEPARATOR`]:
/// `platform|browser|device|sessionId|tabId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one mounted client.
///
/// Immutable after construction; share it by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    platform: String,
    browser_family: BrowserFamily,
    device_class: DeviceClass,
    session_id: String,
    tab_id: String,
}

impl Identity {
    /// Build the identity for a newly mounted client.
    ///
    /// Reuses the session id found in `store`, or generates and persists a new
    /// one. Storage failures are logged and degrade to a fresh session id for
    /// this instance only. The tab id is always fresh.
    pub fn create<E, S>(env: &E, host: &HostInfo, store: &mut S) -> Self
    where
        E: Environment,
        S: SessionStore + ?Sized,
    {
        let session_id = resolve_session_id(env, store);
        let tab_id = generate_id(env, "tab");

        let identity = Self {
            platform: sanitize(&host.platform),
            browser_family: BrowserFamily::detect(&host.user_agent),
            device_class: DeviceClass::detect(&host.user_agent),
            session_id,
            tab_id,
        };
        debug!(device_id = %identity.device_id(), "identity created");
        identity
    }

    /// Platform string, separator-free.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Detected browser family.
    pub fn browser_family(&self) -> BrowserFamily {
        self.browser_family
    }

    /// Detected device class.
    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    /// Session id shared by re-mounts in the same tab storage.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Tab id, unique to this instance.
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Random part of the tab id, for compact display.
    pub fn tab_suffix(&self) -> &str {
        self.tab_id.rsplit('-').next().unwrap_or(&self.tab_id)
    }

    /// Device id presented to the server.
    pub fn device_id(&self) -> DeviceId {
        let sep = DEVICE_ID_SEPARATOR;
        DeviceId(format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.platform,
            self.browser_family,
            self.device_class,
            self.session_id,
            self.tab_id
        ))
    }
}

fn resolve_session_id<E, S>(env: &E, store: &mut S) -> String
where
    E: Environment,
    S: SessionStore + ?Sized,
{
    match store.load(SESSION_STORAGE_KEY) {
        Ok(Some(existing)) if !existing.is_empty() => {
            let existing = sanitize(&existing);
            debug!(session_id = %existing, "reusing stored session id");
            existing
        },
        Ok(_) => {
            let fresh = generate_id(env, "session");
            if let Err(e) = store.store(SESSION_STORAGE_KEY, &fresh) {
                warn!(error = %e, "could not persist session id");
            }
            fresh
        },
        Err(e) => {
            warn!(error = %e, "session storage unavailable, using ephemeral session id");
            generate_id(env, "session")
        },
    }
}

/// `<prefix>-<wall clock millis>-<7 base36 chars>`.
fn generate_id<E: Environment>(env: &E, prefix: &str) -> String {
    let mut bytes = [0u8; RANDOM_SUFFIX_LEN];
    env.random_bytes(&mut bytes);
    let suffix: String =
        bytes.iter().map(|b| char::from(BASE36[usize::from(*b) % BASE36.len()])).collect();
    format!("{prefix}-{}-{suffix}", env.wall_clock_millis())
}

fn sanitize(field: &str) -> String {
    field.replace(DEVICE_ID_SEPARATOR, "_")
}

//! Managed service set and restart requests.
//!
//! The service list is fixed at startup. The first entry is the primary
//! workload (log-tailed, kernel-fault target); the rest are auxiliaries that
//! only the control channel or a fleet-wide kernel restart may touch.

use std::fmt;
use std::sync::Arc;

/// Membership role of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// The workload under automatic health observation.
    Primary,
    /// Restartable only through an explicit operator command.
    Auxiliary,
}

/// A service the watchdog is allowed to restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedService {
    pub name: String,
    pub role: ServiceRole,
}

/// Immutable, shareable set of managed services.
///
/// Doubles as the control channel allow-list.
#[derive(Debug, Clone)]
pub struct ServiceSet {
    services: Arc<[ManagedService]>,
}

impl ServiceSet {
    /// Build from an ordered list of names. Returns `None` for an empty list.
    pub fn from_names<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let services: Vec<ManagedService> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| ManagedService {
                name: name.into(),
                role: if i == 0 {
                    ServiceRole::Primary
                } else {
                    ServiceRole::Auxiliary
                },
            })
            .collect();

        if services.is_empty() {
            return None;
        }

        Some(Self {
            services: services.into(),
        })
    }

    pub fn primary(&self) -> &ManagedService {
        &self.services[0]
    }

    pub fn auxiliaries(&self) -> &[ManagedService] {
        &self.services[1..]
    }

    /// All services, primary first.
    pub fn as_slice(&self) -> &[ManagedService] {
        &self.services
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedService> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Look up a service by exact name.
    pub fn get(&self, name: &str) -> Option<&ManagedService> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn is_primary(&self, name: &str) -> bool {
        self.primary().name == name
    }
}

/// A single "restart service X" request, consumed exactly once by the actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub service: String,
}

impl RestartRequest {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl fmt::Display for RestartRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service)
    }
}

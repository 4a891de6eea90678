//! systemd over the system D-Bus.

use async_trait::async_trait;
use zbus::zvariant::OwnedObjectPath;
use zbus::{proxy, Connection};

use super::{BackendResult, InitSystem, Restarter};

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
trait SystemdManager {
    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.systemd1.Unit",
    default_service = "org.freedesktop.systemd1"
)]
trait SystemdUnit {
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;
}

/// Shared, read-mostly connection to the systemd manager.
#[derive(Clone)]
pub struct Systemd {
    conn: Connection,
    /// Appended to service names when used as a `Restarter`.
    unit_suffix: String,
}

impl Systemd {
    /// Connect to the system bus. Failure here is a startup error.
    pub async fn connect(unit_suffix: impl Into<String>) -> BackendResult<Self> {
        let conn = Connection::system().await?;
        Ok(Self {
            conn,
            unit_suffix: unit_suffix.into(),
        })
    }

    fn unit_name(&self, service: &str) -> String {
        unit_name(service, &self.unit_suffix)
    }
}

fn unit_name(service: &str, suffix: &str) -> String {
    if suffix.is_empty() || service.ends_with(suffix) {
        service.to_string()
    } else {
        format!("{service}{suffix}")
    }
}

#[async_trait]
impl InitSystem for Systemd {
    async fn active_state(&self, unit: &str) -> BackendResult<String> {
        let manager = SystemdManagerProxy::new(&self.conn).await?;
        let path = manager.load_unit(unit).await?;
        let unit = SystemdUnitProxy::builder(&self.conn)
            .path(path)?
            .build()
            .await?;
        Ok(unit.active_state().await?)
    }

    async fn restart_unit(&self, unit: &str) -> BackendResult<()> {
        let manager = SystemdManagerProxy::new(&self.conn).await?;
        manager.restart_unit(unit, "replace").await?;
        Ok(())
    }
}

/// Standalone variant: restarts go straight to systemd units.
#[async_trait]
impl Restarter for Systemd {
    async fn restart(&self, service: &str) -> BackendResult<()> {
        self.restart_unit(&self.unit_name(service)).await
    }
}

//! Host-side utilities for serial port discovery.

use crate::port::PortInfo;

/// Discover all available serial ports, USB bridges first.
#[cfg(feature = "native")]
pub fn discover_ports() -> crate::Result<Vec<PortInfo>> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    let mut ports = NativePortEnumerator::list_ports()?;
    sort_ports(&mut ports);
    log::debug!("Discovered {} serial port(s)", ports.len());
    Ok(ports)
}

/// Discover serial ports on targets without native serial support.
#[cfg(not(feature = "native"))]
pub fn discover_ports() -> crate::Result<Vec<PortInfo>> {
    Ok(Vec::new())
}

/// Order ports so USB bridges come first, then by name.
pub fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by(|a, b| b.is_usb().cmp(&a.is_usb()).then_with(|| a.name.cmp(&b.name)));
}

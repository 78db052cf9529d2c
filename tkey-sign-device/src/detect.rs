//! Serial port auto-detection.

use serialport::SerialPortType;
use tkey_sign_lib::device::DeviceError;

/// USB vendor id of the TKey.
pub const TKEY_VID: u16 = 0x1207;

/// USB product id of the TKey.
pub const TKEY_PID: u16 = 0x8887;

/// True for the TKey's USB ids.
pub fn is_tkey(vid: u16, pid: u16) -> bool {
    vid == TKEY_VID && pid == TKEY_PID
}

/// Paths of all serial ports that belong to a TKey.
pub fn detect_ports() -> Result<Vec<String>, DeviceError> {
    let ports = serialport::available_ports()
        .map_err(|e| DeviceError::Io(format!("listing serial ports: {}", e)))?;

    let found: Vec<String> = ports
        .into_iter()
        .filter(|port| match &port.port_type {
            SerialPortType::UsbPort(usb) => is_tkey(usb.vid, usb.pid),
            _ => false,
        })
        .map(|port| port.port_name)
        .collect();

    tracing::debug!(ports = ?found, "detected TKey ports");
    Ok(found)
}

//! Serial transport for real modem devices

use std::time::Duration;

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use crate::error::ChannelError;

/// Open a serial device for use with [`crate::AtChannel::open`]
pub fn open_serial(port_name: &str, baud_rate: u32) -> Result<SerialStream, ChannelError> {
    let stream = tokio_serial::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()?;

    info!(port_name, baud_rate, "serial port open");
    Ok(stream)
}

//! Serial transport: a blocking reader thread feeding the async loop.
//!
//! serialport reads block, so framing happens on a dedicated thread that
//! pushes trimmed lines into a tokio channel. The read timeout keeps the
//! thread responsive to its stop flag; dropping the handle stops and joins
//! the thread.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::SerialPortType;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A detected serial port with a human-readable label.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub label: String,
}

/// Enumerate serial ports, labelling USB devices by product or manufacturer.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let label = match p.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .or(usb.manufacturer)
                    .unwrap_or_else(|| "USB serial device".into()),
                SerialPortType::BluetoothPort => "Bluetooth".into(),
                SerialPortType::PciPort => "PCI".into(),
                SerialPortType::Unknown => "Unknown".into(),
            };
            PortInfo {
                name: p.port_name,
                label,
            }
        })
        .collect())
}

/// Handle to a running reader thread.
pub struct SerialHandle {
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Drop for SerialHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Open `port` at `baud` and start pushing newline-framed lines into `tx`.
/// The sender closing (receiver dropped) also stops the thread.
pub fn spawn_reader(port: &str, baud: u32, tx: mpsc::Sender<String>) -> Result<SerialHandle> {
    let serial = serialport::new(port, baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open serial port {port}"))?;
    info!("Serial port {port} open at {baud} baud");

    let stop = Arc::new(AtomicBool::new(false));
    let worker = thread::Builder::new()
        .name("serial-reader".into())
        .spawn({
            let stop = stop.clone();
            let port = port.to_string();
            move || {
                let mut reader = BufReader::new(serial);
                let mut line = String::new();
                while !stop.load(Ordering::Relaxed) {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) => {
                            warn!("Serial port {port} closed");
                            break;
                        }
                        Ok(_) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            if tx.blocking_send(trimmed.to_string()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("Serial read error on {port}: {e}");
                            break;
                        }
                    }
                }
                debug!("Serial reader for {port} stopped");
            }
        })
        .context("Failed to spawn serial reader thread")?;

    Ok(SerialHandle {
        stop,
        worker: Some(worker),
    })
}

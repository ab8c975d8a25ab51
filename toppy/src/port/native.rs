//! Native USB port implementation using the `nusb` crate.
//!
//! This module provides the port implementation for native platforms
//! (Linux, macOS, Windows).

use {
    crate::{
        error::{Error, Result},
        port::{BULK_IN_EP, BULK_OUT_EP, Port, PortEnumerator, PortInfo},
    },
    log::{debug, trace},
    nusb::{
        DeviceInfo, Endpoint, Interface, MaybeFuture,
        transfer::{Buffer, Bulk, In, Out, TransferError},
    },
    std::time::Duration,
};

/// Claimed interface and its two bulk endpoints.
struct Claimed {
    _interface: Interface,
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
}

/// Native USB port implementation.
pub struct NativePort {
    claimed: Option<Claimed>,
    name: String,
}

impl NativePort {
    /// Open and claim a device.
    pub fn open(info: &PortInfo) -> Result<Self> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(Error::Usb)?
            .find(|d| d.bus_id() == info.bus && d.device_address() == info.address)
            .ok_or(Error::DeviceNotFound)?;
        Self::open_device(&device_info)
    }

    /// Open the only Topfield PVR attached, or the one at `bus`/`address`.
    ///
    /// Fails with [`Error::MultipleDevices`] if the selection matches more
    /// than one device.
    pub fn open_toppy(bus: Option<&str>, address: Option<u8>) -> Result<Self> {
        let candidates: Vec<PortInfo> = NativePortEnumerator::find_toppies()?
            .into_iter()
            .filter(|p| bus.is_none_or(|b| p.bus == b))
            .filter(|p| address.is_none_or(|a| p.address == a))
            .collect();

        match candidates.as_slice() {
            [] => Err(Error::DeviceNotFound),
            [only] => Self::open(only),
            _ => Err(Error::MultipleDevices(
                candidates.iter().map(|p| p.name.clone()).collect(),
            )),
        }
    }

    fn open_device(device_info: &DeviceInfo) -> Result<Self> {
        let name = port_name(device_info);
        debug!("Opening {name}");

        let device = device_info.open().wait().map_err(Error::Usb)?;
        let interface = device
            .detach_and_claim_interface(0)
            .wait()
            .map_err(Error::Usb)?;
        let out_ep = interface
            .endpoint::<Bulk, Out>(BULK_OUT_EP)
            .map_err(Error::Usb)?;
        let in_ep = interface
            .endpoint::<Bulk, In>(BULK_IN_EP)
            .map_err(Error::Usb)?;

        Ok(Self {
            claimed: Some(Claimed {
                _interface: interface,
                out_ep,
                in_ep,
            }),
            name,
        })
    }

    fn claimed(&mut self) -> Result<&mut Claimed> {
        self.claimed.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            ))
        })
    }
}

fn transfer_error(err: TransferError, what: &str, timeout: Duration) -> Error {
    match err {
        TransferError::Cancelled => Error::Timeout(format!(
            "{what} did not complete within {} ms",
            timeout.as_millis()
        )),
        other => Error::Transfer(other),
    }
}

impl Port for NativePort {
    fn write_chunk(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let ep = &mut self.claimed()?.out_ep;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(buf, timeout);
        completion
            .status
            .map_err(|e| transfer_error(e, "bulk write", timeout))?;
        trace!("bulk out {} of {} bytes", completion.actual_len, data.len());
        Ok(completion.actual_len)
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let ep = &mut self.claimed()?.in_ep;

        // IN requests must be a whole number of max-size packets
        let max_packet_size = ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = ep.transfer_blocking(in_buf, timeout);
        completion
            .status
            .map_err(|e| transfer_error(e, "bulk read", timeout))?;

        let len = completion.actual_len.min(buf.len());
        buf[..len].copy_from_slice(&completion.buffer[..len]);
        trace!("bulk in {len} bytes");
        Ok(len)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the interface releases it
        self.claimed.take();
        Ok(())
    }
}

fn port_name(d: &DeviceInfo) -> String {
    format!("{}-{:03}", d.bus_id(), d.device_address())
}

/// Native device enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let devices = nusb::list_devices().wait().map_err(Error::Usb)?;

        Ok(devices
            .map(|d| PortInfo {
                name: port_name(&d),
                bus: d.bus_id().to_string(),
                address: d.device_address(),
                vid: d.vendor_id(),
                pid: d.product_id(),
                manufacturer: d.manufacturer_string().map(str::to_string),
                product: d.product_string().map(str::to_string),
                serial_number: d.serial_number().map(str::to_string),
            })
            .collect())
    }
}

//! TKey client over a byte link.
//!
//! Serial I/O is blocking, so every exchange runs on the blocking pool. The
//! link is moved into the blocking job and handed back afterwards; if the
//! caller gives up on a pending exchange the job keeps the link until it
//! notices the closed flag, then drops it, which releases the port.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blake2::{Blake2s256, Digest};
use tkey_sign_lib::device::{Connector, DeviceClient, DeviceError, NameVersion};
use tkey_sign_lib::secret::Secret;

use crate::detect;
use crate::proto::{self, Command, APP_MAX_SIZE, CHUNK_LEN, FRAME_ID};

/// Read timeout of the link. Waits longer than this are built from polls so
/// the closed flag is seen promptly.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a name/version query waits. Silence means "not this program".
pub const IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);

/// How long any other bounded exchange waits.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// A bidirectional byte link to a token.
pub trait Port: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Port for T {}

#[derive(Clone, Copy, Debug)]
enum Wait {
    Bounded(Duration),
    Unbounded,
}

/// Client for one TKey.
pub struct TkeyClient {
    port: Option<Box<dyn Port>>,
    path: String,
    closed: Arc<AtomicBool>,
    identity_timeout: Duration,
    response_timeout: Duration,
}

impl TkeyClient {
    /// Open the serial device at `path`.
    pub fn open(path: &str, speed: u32) -> Result<Self, DeviceError> {
        let serial = serialport::new(path, speed)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| DeviceError::Io(format!("could not open {}: {}", path, e)))?;
        tracing::debug!(path, speed, "serial port open");
        Ok(Self::with_port(Box::new(serial), path))
    }

    /// Wrap an already open link. Reads on `port` should time out after
    /// about [`POLL_INTERVAL`].
    pub fn with_port(port: Box<dyn Port>, path: impl Into<String>) -> Self {
        Self {
            port: Some(port),
            path: path.into(),
            closed: Arc::new(AtomicBool::new(false)),
            identity_timeout: IDENTITY_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Override the bounded wait times.
    pub fn with_timeouts(mut self, identity: Duration, response: Duration) -> Self {
        self.identity_timeout = identity;
        self.response_timeout = response;
        self
    }

    async fn exchange(
        &mut self,
        cmd: Command,
        data: &[u8],
        rsp: Command,
        wait: Wait,
    ) -> Result<Vec<u8>, DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }
        let frame = proto::build_frame(cmd, FRAME_ID, data)?;
        let mut port = self.port.take().ok_or(DeviceError::Closed)?;
        let closed = self.closed.clone();

        tracing::trace!(cmd = cmd.name, tx = %hex::encode(&frame), "send");
        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = transact(&mut *port, &frame, rsp, wait, &closed);
            (port, result)
        })
        .await
        .map_err(|e| DeviceError::Io(format!("I/O task failed: {}", e)))?;

        if !self.closed.load(Ordering::SeqCst) {
            self.port = Some(port);
        }

        let rx = result?;
        tracing::trace!(rsp = rsp.name, rx = %hex::encode(&rx), "recv");
        Ok(rx)
    }

    async fn name_version(
        &mut self,
        cmd: Command,
        rsp: Command,
    ) -> Result<NameVersion, DeviceError> {
        let rx = self
            .exchange(cmd, &[], rsp, Wait::Bounded(self.identity_timeout))
            .await?;
        Ok(parse_name_version(&rx))
    }

    async fn bounded(
        &mut self,
        cmd: Command,
        data: &[u8],
        rsp: Command,
    ) -> Result<Vec<u8>, DeviceError> {
        let wait = Wait::Bounded(self.response_timeout);
        self.exchange(cmd, data, rsp, wait).await
    }
}

#[async_trait]
impl DeviceClient for TkeyClient {
    async fn firmware_name_version(&mut self) -> Result<NameVersion, DeviceError> {
        self.name_version(proto::CMD_FW_NAME_VERSION, proto::RSP_FW_NAME_VERSION)
            .await
    }

    async fn load_app(&mut self, image: &[u8], secret: Option<&Secret>) -> Result<(), DeviceError> {
        if image.is_empty() || image.len() > APP_MAX_SIZE {
            return Err(DeviceError::Protocol(format!(
                "app size {} bytes not in 1..={}",
                image.len(),
                APP_MAX_SIZE
            )));
        }

        let mut data = [0u8; 37];
        data[0..4].copy_from_slice(&(image.len() as u32).to_le_bytes());
        if let Some(secret) = secret {
            data[4] = 1;
            data[5..37].copy_from_slice(&Blake2s256::digest(secret.as_bytes()));
        }
        let rx = self
            .bounded(proto::CMD_LOAD_APP, &data, proto::RSP_LOAD_APP)
            .await;
        data.fill(0);
        proto::check_status(&rx?, proto::RSP_LOAD_APP)?;

        let chunks = image.chunks(CHUNK_LEN).count();
        let mut reported = None;
        for (i, chunk) in image.chunks(CHUNK_LEN).enumerate() {
            let last = i + 1 == chunks;
            let rsp = if last {
                proto::RSP_LOAD_APP_DATA_READY
            } else {
                proto::RSP_LOAD_APP_DATA
            };
            let rx = self.bounded(proto::CMD_LOAD_APP_DATA, chunk, rsp).await?;
            proto::check_status(&rx, rsp)?;
            if last {
                reported = Some(rx[3..35].to_vec());
            }
        }

        let expected = Blake2s256::digest(image);
        match reported {
            Some(digest) if digest.as_slice() == expected.as_slice() => {
                tracing::debug!(digest = %hex::encode(expected), "app loaded");
                Ok(())
            }
            _ => Err(DeviceError::Protocol(
                "digest of loaded app does not match".to_string(),
            )),
        }
    }

    async fn app_name_version(&mut self) -> Result<NameVersion, DeviceError> {
        self.name_version(proto::CMD_APP_NAME_VERSION, proto::RSP_APP_NAME_VERSION)
            .await
    }

    async fn public_key(&mut self) -> Result<[u8; 32], DeviceError> {
        let rx = self
            .bounded(proto::CMD_GET_PUBKEY, &[], proto::RSP_GET_PUBKEY)
            .await?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&rx[2..34]);
        Ok(key)
    }

    async fn sign(&mut self, payload: &[u8]) -> Result<[u8; 64], DeviceError> {
        let rx = self
            .bounded(
                proto::CMD_SET_SIZE,
                &(payload.len() as u32).to_le_bytes(),
                proto::RSP_SET_SIZE,
            )
            .await?;
        proto::check_status(&rx, proto::RSP_SET_SIZE)?;

        for chunk in payload.chunks(CHUNK_LEN) {
            let rx = self
                .bounded(proto::CMD_SIGN_DATA, chunk, proto::RSP_SIGN_DATA)
                .await?;
            proto::check_status(&rx, proto::RSP_SIGN_DATA)?;
        }

        // No timeout: the app answers once the operator touches the token.
        let rx = self
            .exchange(proto::CMD_GET_SIG, &[], proto::RSP_GET_SIG, Wait::Unbounded)
            .await?;
        proto::check_status(&rx, proto::RSP_GET_SIG)?;

        let mut sig = [0u8; 64];
        sig.copy_from_slice(&rx[3..67]);
        Ok(sig)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut port) = self.port.take() {
            port.flush()
                .map_err(|e| DeviceError::Io(format!("closing {}: {}", self.path, e)))?;
        }
        tracing::debug!(path = %self.path, "link closed");
        Ok(())
    }
}

impl Drop for TkeyClient {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn parse_name_version(rx: &[u8]) -> NameVersion {
    let mut name0 = [0u8; 4];
    let mut name1 = [0u8; 4];
    let mut version = [0u8; 4];
    name0.copy_from_slice(&rx[2..6]);
    name1.copy_from_slice(&rx[6..10]);
    version.copy_from_slice(&rx[10..14]);
    NameVersion::from_raw(name0, name1, u32::from_le_bytes(version))
}

/// Write one frame and read the response frame.
fn transact(
    port: &mut dyn Port,
    frame: &[u8],
    rsp: Command,
    wait: Wait,
    closed: &AtomicBool,
) -> Result<Vec<u8>, DeviceError> {
    port.write_all(frame)
        .and_then(|_| port.flush())
        .map_err(|e| DeviceError::Io(e.to_string()))?;

    let deadline = match wait {
        Wait::Bounded(timeout) => Some(Instant::now() + timeout),
        Wait::Unbounded => None,
    };

    let mut header = [0u8; 1];
    read_full(port, &mut header, deadline, closed)?;
    let len = proto::FrameHeader::decode(header[0])?.len.bytes();

    let mut rx = vec![0u8; 1 + len];
    rx[0] = header[0];
    read_full(port, &mut rx[1..], deadline, closed)?;

    proto::check_response(&rx, rsp, FRAME_ID)?;
    Ok(rx)
}

/// Fill `buf`, polling until `deadline` or until the client is closed.
fn read_full(
    port: &mut dyn Port,
    buf: &mut [u8],
    deadline: Option<Instant>,
    closed: &AtomicBool,
) -> Result<(), DeviceError> {
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => return Err(DeviceError::EndOfStream),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                if closed.load(Ordering::SeqCst) {
                    return Err(DeviceError::Closed);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(DeviceError::EndOfStream);
                }
            }
            Err(e) => return Err(DeviceError::Io(e.to_string())),
        }
    }
    Ok(())
}

/// Opens TKeys on serial ports.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Client = TkeyClient;

    fn detect(&self) -> Result<Vec<String>, DeviceError> {
        detect::detect_ports()
    }

    fn connect(&self, path: &str, speed: u32) -> Result<TkeyClient, DeviceError> {
        TkeyClient::open(path, speed)
    }
}

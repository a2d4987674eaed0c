//! Shared test harness: a scripted modem on the far side of a socketpair.
#![allow(dead_code)]

use std::os::fd::OwnedFd;
use std::time::Duration;

use qmilink::{Device, DeviceConfig};
use tokio::net::UnixDatagram;

pub(crate) const CTL_GET_VERSION_INFO: u16 = 0x0021;
pub(crate) const CTL_GET_CLIENT_ID: u16 = 0x0022;
pub(crate) const CTL_RELEASE_CLIENT_ID: u16 = 0x0023;

/// Result TLV reporting success.
pub(crate) const OK: [u8; 7] = [0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00];

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Timers short enough for tests.
pub(crate) fn fast_config() -> DeviceConfig {
    DeviceConfig {
        discover_timeout: Duration::from_millis(150),
        create_timeout: Duration::from_millis(300),
        ..DeviceConfig::default()
    }
}

/// Start a device on one end of a socketpair and hand back the other end.
pub(crate) fn start_device(config: DeviceConfig) -> (Device, Modem) {
    let (ours, theirs) = std::os::unix::net::UnixDatagram::pair().expect("socketpair");
    let device = qmilink::configure()
        .config(config)
        .start(OwnedFd::from(ours))
        .expect("start device");
    theirs.set_nonblocking(true).expect("nonblocking");
    let sock = UnixDatagram::from_std(theirs).expect("register modem socket");
    (device, Modem { sock })
}

/// Request as seen by the modem.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub(crate) raw: Vec<u8>,
    pub(crate) service: u8,
    pub(crate) client: u8,
    pub(crate) tid: u16,
    pub(crate) message: u16,
    pub(crate) payload: Vec<u8>,
}

impl Request {
    fn parse(raw: Vec<u8>) -> Self {
        assert_eq!(raw[0], 0x01, "frame marker");
        assert_eq!(raw[3], 0x00, "request flags");
        let len = u16::from_le_bytes([raw[1], raw[2]]) as usize;
        assert_eq!(len + 1, raw.len(), "mux length");
        let service = raw[4];
        let client = raw[5];
        let (tid, rest) = if service == 0 {
            assert_eq!(raw[6], 0x00, "control request type");
            (u16::from(raw[7]), &raw[8..])
        } else {
            assert_eq!(raw[6], 0x00, "service request type");
            (u16::from_le_bytes([raw[7], raw[8]]), &raw[9..])
        };
        let message = u16::from_le_bytes([rest[0], rest[1]]);
        let payload_len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let payload = rest[4..].to_vec();
        assert_eq!(payload.len(), payload_len, "message length");
        Self {
            service,
            client,
            tid,
            message,
            payload,
            raw,
        }
    }
}

pub(crate) struct Modem {
    sock: UnixDatagram,
}

impl Modem {
    /// Next frame written by the device.
    pub(crate) async fn recv(&self) -> Request {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(RECV_TIMEOUT, self.sock.recv(&mut buf))
            .await
            .expect("modem timed out waiting for a request")
            .expect("modem recv");
        buf.truncate(n);
        Request::parse(buf)
    }

    /// Next frame, which must be `message` on `service`.
    pub(crate) async fn expect(&self, service: u8, message: u16) -> Request {
        let req = self.recv().await;
        assert_eq!((req.service, req.message), (service, message), "unexpected request {req:?}");
        req
    }

    /// Assert that nothing is written for a while.
    pub(crate) async fn expect_silence(&self, wait: Duration) {
        let mut buf = vec![0u8; 4096];
        if let Ok(result) = tokio::time::timeout(wait, self.sock.recv(&mut buf)).await {
            let n = result.expect("modem recv");
            panic!("unexpected frame {:02x?}", &buf[..n]);
        }
    }

    pub(crate) async fn send(&self, frame: &[u8]) {
        self.sock.send(frame).await.expect("modem send");
    }

    /// Answer `req` with `payload`.
    pub(crate) async fn reply(&self, req: &Request, payload: &[u8]) {
        let frame = if req.service == 0 {
            control_response(req.tid as u8, req.message, payload)
        } else {
            service_response(req.service, req.client, req.tid, req.message, payload)
        };
        self.send(&frame).await;
    }

    /// Serve version discovery with `(type, major, minor)` entries.
    pub(crate) async fn serve_discovery(&self, services: &[(u8, u16, u16)]) {
        let req = self.expect(0, CTL_GET_VERSION_INFO).await;
        self.reply(&req, &versions_payload(services)).await;
    }

    /// Serve one client id request, checking the requested type.
    pub(crate) async fn serve_client_id(&self, service: u8, client: u8) -> Request {
        let req = self.expect(0, CTL_GET_CLIENT_ID).await;
        assert_eq!(req.payload, [0x01, 0x01, 0x00, service]);
        let mut payload = OK.to_vec();
        payload.extend_from_slice(&[0x01, 0x02, 0x00, service, client]);
        self.reply(&req, &payload).await;
        req
    }

    /// Serve one release request, checking the released id.
    pub(crate) async fn serve_release(&self, service: u8, client: u8) {
        let req = self.expect(0, CTL_RELEASE_CLIENT_ID).await;
        assert_eq!(req.payload, [0x01, 0x02, 0x00, service, client]);
        self.reply(&req, &OK).await;
    }

    /// Send an indication.
    pub(crate) async fn indicate(&self, service: u8, client: u8, message: u16, payload: &[u8]) {
        self.send(&indication(service, client, message, payload)).await;
    }
}

fn finish(mut frame: Vec<u8>, payload: &[u8]) -> Vec<u8> {
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    let len = (frame.len() - 1) as u16;
    frame[1..3].copy_from_slice(&len.to_le_bytes());
    frame
}

pub(crate) fn control_response(tid: u8, message: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x01, 0x00, 0x00, 0x80, 0x00, 0x00, 0x01, tid];
    frame.extend_from_slice(&message.to_le_bytes());
    finish(frame, payload)
}

pub(crate) fn service_response(
    service: u8,
    client: u8,
    tid: u16,
    message: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = vec![0x01, 0x00, 0x00, 0x80, service, client, 0x02];
    frame.extend_from_slice(&tid.to_le_bytes());
    frame.extend_from_slice(&message.to_le_bytes());
    finish(frame, payload)
}

pub(crate) fn indication(service: u8, client: u8, message: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x01, 0x00, 0x00, 0x80, service, client, 0x04, 0x00, 0x00];
    frame.extend_from_slice(&message.to_le_bytes());
    finish(frame, payload)
}

pub(crate) fn versions_payload(services: &[(u8, u16, u16)]) -> Vec<u8> {
    let mut list = vec![services.len() as u8];
    for &(service, major, minor) in services {
        list.push(service);
        list.extend_from_slice(&major.to_le_bytes());
        list.extend_from_slice(&minor.to_le_bytes());
    }
    let mut payload = OK.to_vec();
    payload.push(0x01);
    payload.extend_from_slice(&(list.len() as u16).to_le_bytes());
    payload.extend_from_slice(&list);
    payload
}

/// Result TLV reporting `error`.
pub(crate) fn failure(error: u16) -> Vec<u8> {
    let mut payload = vec![0x02, 0x04, 0x00, 0x01, 0x00];
    payload.extend_from_slice(&error.to_le_bytes());
    payload
}

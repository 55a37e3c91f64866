use async_trait::async_trait;
use bytes::Bytes;
use hoard_core::{ContentAddress, LocationKind, LocationRef};
use hoard_engine::{LocationTransport, TransportError, TransportResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A fault injected for one location kind.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Every call fails as unreachable.
    Unreachable,
    /// Writes fail with a remote error.
    RejectPuts,
    /// Reads return bytes that do not match the address.
    Corrupt,
    /// Writes stall for the given time before going through.
    SlowPuts(Duration),
}

/// Wraps a real transport and injects per-kind faults.
pub struct FaultyTransport {
    inner: Box<dyn LocationTransport>,
    faults: Mutex<HashMap<LocationKind, Fault>>,
    put_attempts: Mutex<HashMap<LocationKind, usize>>,
}

#[allow(dead_code)]
impl FaultyTransport {
    pub fn new(inner: impl LocationTransport) -> Self {
        Self {
            inner: Box::new(inner),
            faults: Mutex::new(HashMap::new()),
            put_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn inject(&self, kind: LocationKind, fault: Fault) {
        self.faults.lock().unwrap().insert(kind, fault);
    }

    pub fn clear(&self, kind: LocationKind) {
        self.faults.lock().unwrap().remove(&kind);
    }

    pub fn put_attempts(&self, kind: LocationKind) -> usize {
        self.put_attempts
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    fn fault(&self, kind: LocationKind) -> Option<Fault> {
        self.faults.lock().unwrap().get(&kind).copied()
    }
}

fn unreachable(kind: LocationKind) -> TransportError {
    TransportError::Unreachable {
        kind,
        message: "injected".to_string(),
    }
}

#[async_trait]
impl LocationTransport for FaultyTransport {
    async fn fetch(&self, location: &LocationRef, hash: &ContentAddress) -> TransportResult<Bytes> {
        match self.fault(location.kind) {
            Some(Fault::Unreachable) => Err(unreachable(location.kind)),
            Some(Fault::Corrupt) => {
                let mut data = self.inner.fetch(location, hash).await?.to_vec();
                data.push(0xff);
                Ok(Bytes::from(data))
            }
            _ => self.inner.fetch(location, hash).await,
        }
    }

    async fn put(
        &self,
        kind: LocationKind,
        hash: &ContentAddress,
        data: Bytes,
    ) -> TransportResult<LocationRef> {
        *self.put_attempts.lock().unwrap().entry(kind).or_default() += 1;
        match self.fault(kind) {
            Some(Fault::Unreachable) => Err(unreachable(kind)),
            Some(Fault::RejectPuts) => Err(TransportError::Remote("write rejected".to_string())),
            Some(Fault::SlowPuts(delay)) => {
                tokio::time::sleep(delay).await;
                self.inner.put(kind, hash, data).await
            }
            _ => self.inner.put(kind, hash, data).await,
        }
    }
}

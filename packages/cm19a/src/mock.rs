//! A scripted stand-in for the USB device, used by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use cm19a_protocol::ProtocolTable;

use crate::transport::{Transport, TransportError};

pub const SAMPLE_PROTOCOL: &str = "\
[CM19A X10 CODES]
A,1,ON,14,34,CB,58,A7
A,1,OFF,14,34,CB,58,27
B,2,ON,14,74,CB,58,A7

[X10 RF REMOTE DIM/BRIGHT CODES]
A,1,DIM,14,34,CB,58,B7
";

pub fn sample_table() -> ProtocolTable {
    ProtocolTable::parse(SAMPLE_PROTOCOL).unwrap()
}

#[derive(Default)]
struct MockState {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    releases: AtomicUsize,
    short_by: AtomicUsize,
    fail_reads: AtomicBool,
    io_delay_ms: AtomicU64,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

/// Cloning shares the underlying state, so a test can keep a clone to
/// inspect after handing the other to a transceiver.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

struct Busy<'a>(&'a AtomicBool);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state.inbound.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Makes every write report `missing` fewer bytes than requested.
    pub fn short_writes_by(&self, missing: usize) {
        self.state.short_by.store(missing, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every read and write take at least `delay`.
    pub fn io_delay(&self, delay: Duration) {
        self.state
            .io_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn io_calls(&self) -> usize {
        self.reads() + self.writes()
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    /// Number of times a read or write started while another was in flight.
    pub fn overlaps(&self) -> usize {
        self.state.overlaps.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.written.lock().unwrap().clone()
    }

    fn enter(&self) -> Busy<'_> {
        if self.state.busy.swap(true, Ordering::SeqCst) {
            self.state.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let delay = self.state.io_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }

        Busy(&self.state.busy)
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let _busy = self.enter();

        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Usb(rusb::Error::NoDevice));
        }

        match self.state.inbound.lock().unwrap().pop_front() {
            Some(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            None => Err(TransportError::Timeout),
        }
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        let _busy = self.enter();

        self.state.written.lock().unwrap().push(data.to_vec());
        Ok(data
            .len()
            .saturating_sub(self.state.short_by.load(Ordering::SeqCst)))
    }

    fn release(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

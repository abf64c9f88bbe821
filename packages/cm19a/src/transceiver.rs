//! The transceiver driver.
//!
//! A [`Transceiver`] owns the claimed device and the protocol table. Commands
//! are sent from the caller's task while an optional background task polls the
//! device for frames coming in from RF remotes and queues them until they are
//! drained.
//!
//! The device is not reentrant. It lives behind a mutex and every read or
//! write runs on tokio's blocking pool while holding that mutex, so a send
//! and a poll can never touch the bus at the same time.

use std::{
    fmt, mem,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use cm19a_protocol::{
    Action, CommandKey, DecodedEvent, Frame, HouseCode, ProtocolParseError, ProtocolTable,
    INIT_SEQUENCES,
};
use log::{debug, error, info, trace, warn};
use thiserror::Error;
use tokio::{
    select,
    sync::oneshot,
    task::{self, JoinHandle},
    time::sleep,
};

use crate::{
    config::TransceiverConfig,
    transport::{Transport, TransportError},
    usb::{OpenError, UsbTransport, CM19A},
};

/// A snapshot of the driver's lifecycle flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverState {
    /// The device is claimed, the protocol is loaded and the handshake ran.
    /// Once this turns false it stays false.
    pub initialized: bool,
    /// The background poll task is alive.
    pub running: bool,
    /// An exclusive operation is in progress and polling is suppressed.
    pub paused: bool,
}

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("Could not read the protocol definition: {0}")]
    ProtocolSource(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolParseError),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("The transceiver is not initialized")]
    NotReady,

    #[error("No code for {0} in the protocol table")]
    EncodeNotFound(CommandKey),

    #[error("Write failed: {0}")]
    Write(TransportError),

    #[error("The device is no longer available")]
    Unavailable,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Raised while an exclusive operation runs. Polling resumes once every
/// outstanding guard has been dropped, however the operation ended.
struct Pause<'a>(&'a AtomicUsize);

impl Drop for Pause<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State shared between the caller-facing [`Transceiver`] and its poll task.
struct Shared<T> {
    device: Mutex<Option<T>>,
    table: ProtocolTable,
    config: TransceiverConfig,
    queue: Mutex<Vec<DecodedEvent>>,
    initialized: AtomicBool,
    running: AtomicBool,
    pauses: AtomicUsize,
}

impl<T: Transport> Shared<T> {
    fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.pauses.load(Ordering::SeqCst) > 0
    }

    fn pause(&self) -> Pause<'_> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Pause(&self.pauses)
    }

    /// Runs `f` against the device on the blocking pool while holding the
    /// device lock. Returns `None` once the device has been released.
    async fn with_device<R, F>(self: &Arc<Self>, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let shared = Arc::clone(self);

        let result = task::spawn_blocking(move || {
            let mut device = lock(&shared.device);
            device.as_mut().map(f)
        })
        .await;

        match result {
            Ok(result) => result,
            Err(e) => {
                error!("Device task failed: {}", e);
                None
            }
        }
    }

    async fn receive(self: &Arc<Self>) {
        let timeout = self.config.receive_timeout;

        match self.with_device(move |device| device.read_frame(timeout)).await {
            Some(Ok(Some(frame))) => self.accept(frame),
            Some(Ok(None)) | None => {}
            // Idle CM19As fail reads intermittently, so this is not worth more than a trace.
            Some(Err(e)) => trace!("Read failed, treating it as nothing to read: {}", e),
        }
    }

    /// Decodes an inbound frame and queues it.
    fn accept(&self, frame: Frame) {
        if frame.is_ack() {
            trace!("Transmission acknowledged");
            return;
        }

        let event = self.table.decode(&frame);
        debug!("Received {}", event);
        lock(&self.queue).push(event);
    }

    fn release(&self) {
        if let Some(mut device) = lock(&self.device).take() {
            device.release();
        }
    }
}

struct Poller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn poll<T: Transport>(shared: Arc<Shared<T>>, mut stop: oneshot::Receiver<()>) {
    debug!("Polling for inbound frames every {:?}", shared.config.refresh);

    loop {
        if shared.is_ready() && !shared.is_paused() {
            shared.receive().await;
        }

        select! {
            _ = &mut stop => break,
            _ = sleep(shared.config.refresh) => {}
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    debug!("Stopped polling");
}

/// A claimed CM19A (or any other [`Transport`]) ready to send and receive
/// X10 commands.
///
/// Dropping a transceiver stops polling and releases the device, but
/// [`Transceiver::shutdown`] should be preferred since it waits for the poll
/// task to finish. Dropping releases the device on the current thread and may
/// block for up to one transfer timeout if a read or write is in flight.
pub struct Transceiver<T: Transport> {
    shared: Arc<Shared<T>>,
    poller: Mutex<Option<Poller>>,
}

impl Transceiver<UsbTransport> {
    /// Opens the CM19A, loads the protocol definition and runs the
    /// initialization handshake.
    pub async fn initialize(config: TransceiverConfig) -> Result<Self, InitializationError> {
        Self::initialize_with(config, || UsbTransport::open(&CM19A)).await
    }
}

impl<T: Transport> Transceiver<T> {
    /// Like [`Transceiver::initialize`], with a caller supplied way of opening
    /// the device.
    ///
    /// If the protocol definition cannot be loaded the freshly opened device
    /// is released before the error is returned.
    pub async fn initialize_with<F>(
        config: TransceiverConfig,
        open: F,
    ) -> Result<Self, InitializationError>
    where
        F: FnOnce() -> Result<T, OpenError>,
    {
        let mut transport = open()?;

        let table = match config.protocol.load() {
            Ok(table) => table,
            Err(e) => {
                error!("Could not load the protocol definition: {}", e);
                transport.release();
                return Err(e);
            }
        };

        Ok(Self::from_parts(transport, table, config).await)
    }

    /// Builds a transceiver around an already claimed device.
    ///
    /// Writes the initialization sequences (failures are logged, not fatal)
    /// and starts the poll task if `config.polling` is set.
    pub async fn from_parts(transport: T, table: ProtocolTable, config: TransceiverConfig) -> Self {
        let shared = Arc::new(Shared {
            device: Mutex::new(Some(transport)),
            table,
            config,
            queue: Mutex::default(),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
        });

        let timeout = shared.config.send_timeout;
        for (index, sequence) in INIT_SEQUENCES.into_iter().enumerate() {
            let result = shared
                .with_device(move |device| device.write_frame(&sequence, timeout))
                .await;

            match result {
                Some(Ok(())) => trace!("Wrote initialization sequence {}", index + 1),
                Some(Err(e)) => error!(
                    "Error initializing the transceiver for RF remotes (sequence {}): {}",
                    index + 1,
                    e
                ),
                None => error!("Device went away during initialization"),
            }
        }

        shared.initialized.store(true, Ordering::SeqCst);
        info!("Transceiver ready");

        let poller = shared.config.polling.then(|| {
            let (stop, stop_rx) = oneshot::channel();
            shared.running.store(true, Ordering::SeqCst);

            Poller {
                stop,
                handle: tokio::spawn(poll(Arc::clone(&shared), stop_rx)),
            }
        });

        Self {
            shared,
            poller: Mutex::new(poller),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn state(&self) -> DriverState {
        DriverState {
            initialized: self.shared.is_ready(),
            running: self.shared.running.load(Ordering::SeqCst),
            paused: self.shared.is_paused(),
        }
    }

    pub fn table(&self) -> &ProtocolTable {
        &self.shared.table
    }

    pub fn config(&self) -> &TransceiverConfig {
        &self.shared.config
    }

    /// Sends a command once, returning whether the device accepted it.
    pub async fn send(&self, house: HouseCode, unit: &str, action: Action) -> bool {
        self.send_command(&CommandKey::new(house, unit, action)).await
    }

    pub async fn send_command(&self, key: &CommandKey) -> bool {
        match self.try_send(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not send {}: {}", key, e);
                false
            }
        }
    }

    /// Sends a command once.
    ///
    /// Fails without touching the device if the transceiver is closed or the
    /// command is not in the protocol table. Otherwise polling is paused, any
    /// frame already waiting is read and queued so it is not lost, and the
    /// encoded frame is written. Polling resumes whether or not the write
    /// succeeded.
    pub async fn try_send(&self, key: &CommandKey) -> Result<(), SendError> {
        if !self.is_ready() {
            return Err(SendError::NotReady);
        }

        let frame = *self
            .shared
            .table
            .encode(key)
            .ok_or_else(|| SendError::EncodeNotFound(key.clone()))?;

        let _pause = self
            .shared
            .running
            .load(Ordering::SeqCst)
            .then(|| self.shared.pause());

        let receive_timeout = self.shared.config.receive_timeout;
        let send_timeout = self.shared.config.send_timeout;
        let shared = Arc::clone(&self.shared);

        // The flushed frame is queued on the blocking pool, so it is kept even
        // if this future is dropped before the transfer completes.
        self.shared
            .with_device(move |device| {
                match device.read_frame(receive_timeout) {
                    Ok(Some(inbound)) => shared.accept(inbound),
                    Ok(None) => {}
                    Err(e) => trace!("Flush before send failed: {}", e),
                }

                device.write_frame(&frame, send_timeout)
            })
            .await
            .ok_or(SendError::Unavailable)?
            .map_err(SendError::Write)?;
        debug!("Sent {} as {}", key, frame);

        Ok(())
    }

    /// Checks the device once for an inbound frame and queues it.
    ///
    /// Does nothing while the transceiver is closed or paused. Read failures
    /// are treated as there being nothing to read.
    pub async fn receive(&self) {
        if !self.is_ready() || self.shared.is_paused() {
            return;
        }

        self.shared.receive().await;
    }

    /// Takes everything received so far, oldest first.
    pub fn drain_queue(&self) -> Vec<DecodedEvent> {
        let mut queue = lock(&self.shared.queue);
        if queue.is_empty() {
            return Vec::new();
        }

        let _pause = self.shared.pause();
        mem::take(&mut *queue)
    }

    /// Stops polling and releases the device. The transceiver cannot be
    /// used afterwards.
    ///
    /// Only needs a shared reference, so a transceiver held in an [`Arc`] by
    /// several tasks can still be shut down cleanly.
    pub async fn shutdown(&self) {
        let was_ready = self.shared.initialized.swap(false, Ordering::SeqCst);

        let poller = lock(&self.poller).take();
        if let Some(Poller { stop, handle }) = poller {
            // Fails only if the task is already gone.
            _ = stop.send(());
            if let Err(e) = handle.await {
                error!("Poll task failed: {}", e);
            }
        }

        if !was_ready {
            return;
        }

        let shared = Arc::clone(&self.shared);
        if let Err(e) = task::spawn_blocking(move || shared.release()).await {
            error!("Failed to release the device: {}", e);
        }

        info!("Transceiver closed");
    }
}

impl<T: Transport> Drop for Transceiver<T> {
    fn drop(&mut self) {
        let poller = self.poller.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(poller) = poller.take() {
            _ = poller.stop.send(());
        }

        if self.shared.initialized.swap(false, Ordering::SeqCst) {
            self.shared.release();
        }
    }
}

impl<T: Transport> fmt::Debug for Transceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transceiver")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

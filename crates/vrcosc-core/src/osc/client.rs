//! UDP OSC client with a listener registry.
//!
//! The client sends to VRChat's input port and, once receiving is enabled,
//! runs a background thread that decodes every inbound datagram and fans it
//! out to all registered listeners.

use super::codec;
use super::message::{OscMessage, OscValue};
use crate::error::Result;
use std::net::{SocketAddr, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default address VRChat listens on for OSC input.
pub const DEFAULT_SEND_ADDR: &str = "127.0.0.1:9000";
/// Default address VRChat sends OSC output to.
pub const DEFAULT_RECEIVE_ADDR: &str = "127.0.0.1:9001";

/// How long the receive thread blocks before re-checking its shutdown flag.
const RECEIVE_POLL: Duration = Duration::from_millis(100);

/// Receiver of inbound OSC messages.
///
/// Implementations must not block for long: all listeners are called in turn
/// on the receive thread.
pub trait OscListener: Send + Sync {
    /// Called once per inbound message while the listener is registered.
    fn on_data_received(&self, message: &OscMessage) -> anyhow::Result<()>;
}

type ListenerEntry = (String, Arc<dyn OscListener>);

struct ReceiveWorker {
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    local_addr: SocketAddr,
}

struct Inner {
    /// Socket used for outbound datagrams (None in noop mode).
    send_sock: Option<UdpSocket>,
    /// Where outbound datagrams go.
    target: String,
    /// Registered listeners, in registration order. Shared with the receive thread.
    listeners: Arc<RwLock<Vec<ListenerEntry>>>,
    receiver: Mutex<Option<ReceiveWorker>>,
}

/// Cloneable handle to the OSC client.
#[derive(Clone)]
pub struct OscClient {
    inner: Arc<Inner>,
}

impl OscClient {
    /// Create a client that sends to `target` from an ephemeral port.
    ///
    /// # Arguments
    /// * `target` - VRChat's receive address as `host:port`, usually
    ///   `127.0.0.1:9000`
    ///
    /// # Returns
    /// The client, or an IO error if the send socket cannot be bound or the
    /// target does not resolve.
    pub fn new<A: Into<String>>(target: A) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self::from_parts(Some(sock), target.into()))
    }

    /// Create a client that drops every outbound message.
    ///
    /// Listener registration and [`OscClient::dispatch`] still work, which
    /// makes this useful for driving modules without a network.
    pub fn noop() -> Self {
        Self::from_parts(None, "noop".to_string())
    }

    fn from_parts(send_sock: Option<UdpSocket>, target: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                send_sock,
                target,
                listeners: Arc::new(RwLock::new(Vec::new())),
                receiver: Mutex::new(None),
            }),
        }
    }

    /// The configured send target.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Check if this client is in noop mode.
    pub fn is_noop(&self) -> bool {
        self.inner.send_sock.is_none()
    }

    /// Send a single-value message.
    ///
    /// # Arguments
    /// * `address` - full OSC address, e.g. `/avatar/parameters/VRCOSC/Clock/Hours`
    /// * `value` - the argument
    ///
    /// # Returns
    /// `Ok(())` once the datagram is handed to the socket. Noop clients
    /// return `Ok(())` without sending.
    pub fn send_value<V: Into<OscValue>>(&self, address: &str, value: V) -> Result<()> {
        let message = OscMessage::single(address, value)?;
        self.send_message(&message)
    }

    /// Encode and send a message.
    pub fn send_message(&self, message: &OscMessage) -> Result<()> {
        let sock = match &self.inner.send_sock {
            Some(s) => s,
            None => return Ok(()), // noop mode
        };
        let buf = codec::encode(message)?;
        sock.send_to(&buf, &self.inner.target)?;
        log::trace!("[OSC] -> {} {:?}", message.address(), message.values());
        Ok(())
    }

    /// Register a listener under `id`. Registering an id twice replaces the
    /// earlier listener in place.
    pub fn register_listener<I: Into<String>>(&self, id: I, listener: Arc<dyn OscListener>) {
        let id = id.into();
        let mut listeners = self.inner.listeners.write().expect("Listener lock poisoned");
        if let Some(entry) = listeners.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = listener;
        } else {
            log::debug!("[OSC] Registered listener {}", id);
            listeners.push((id, listener));
        }
    }

    /// Remove the listener registered under `id`.
    ///
    /// Returns once no dispatch is in flight, so the listener receives no
    /// further callbacks after this call.
    pub fn deregister_listener(&self, id: &str) {
        let mut listeners = self.inner.listeners.write().expect("Listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(existing, _)| existing != id);
        if listeners.len() != before {
            log::debug!("[OSC] Deregistered listener {}", id);
        }
    }

    /// Whether a listener is registered under `id`.
    pub fn is_registered(&self, id: &str) -> bool {
        self.inner
            .listeners
            .read()
            .expect("Listener lock poisoned")
            .iter()
            .any(|(existing, _)| existing == id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().expect("Listener lock poisoned").len()
    }

    /// Deliver a message to every registered listener.
    ///
    /// A listener that returns an error or panics is logged and skipped; the
    /// remaining listeners still receive the message.
    pub fn dispatch(&self, message: &OscMessage) {
        dispatch_to(&self.inner.listeners, message);
    }

    /// Bind `addr` and start the background receive thread.
    ///
    /// Any previous receive thread is stopped first. Returns the bound address,
    /// which differs from `addr` when binding port 0.
    pub fn enable_receive(&self, addr: &str) -> Result<SocketAddr> {
        self.disable_receive();

        let sock = UdpSocket::bind(addr)?;
        sock.set_read_timeout(Some(RECEIVE_POLL))?;
        let local_addr = sock.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let listeners = self.inner.listeners.clone();
        let thread_shutdown = shutdown.clone();
        let thread = thread::Builder::new()
            .name("osc-receive".to_string())
            .spawn(move || receive_loop(sock, listeners, thread_shutdown))?;

        log::info!("[OSC] Listening on {}", local_addr);
        *self.inner.receiver.lock().expect("Receiver lock poisoned") = Some(ReceiveWorker {
            shutdown,
            thread,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop the receive thread, if running, and wait for it to exit.
    pub fn disable_receive(&self) {
        self.inner.stop_receiver();
    }

    /// Address of the receive socket, if receiving.
    pub fn receive_addr(&self) -> Option<SocketAddr> {
        self.inner
            .receiver
            .lock()
            .expect("Receiver lock poisoned")
            .as_ref()
            .map(|w| w.local_addr)
    }
}

impl Inner {
    fn stop_receiver(&self) {
        let worker = self.receiver.lock().expect("Receiver lock poisoned").take();
        if let Some(worker) = worker {
            worker.shutdown.store(true, Ordering::Relaxed);
            if worker.thread.join().is_err() {
                log::error!("[OSC] Receive thread panicked");
            }
            log::info!("[OSC] Stopped listening on {}", worker.local_addr);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_receiver();
    }
}

fn dispatch_to(listeners: &RwLock<Vec<ListenerEntry>>, message: &OscMessage) {
    let listeners = listeners.read().expect("Listener lock poisoned");
    for (id, listener) in listeners.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_data_received(message)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("[OSC] Listener {} failed on {}: {:#}", id, message.address(), e)
            }
            Err(_) => log::error!("[OSC] Listener {} panicked on {}", id, message.address()),
        }
    }
}

fn receive_loop(
    sock: UdpSocket,
    listeners: Arc<RwLock<Vec<ListenerEntry>>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0u8; rosc::decoder::MTU];

    while !shutdown.load(Ordering::Relaxed) {
        let size = match sock.recv_from(&mut buf) {
            Ok((size, _)) => size,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => {
                log::warn!("[OSC] Failed to receive datagram: {}", e);
                continue;
            }
        };

        match codec::decode_packet(&buf[..size]) {
            Ok(messages) => {
                for message in &messages {
                    dispatch_to(&listeners, message);
                }
            }
            Err(e) => log::debug!("[OSC] Dropped malformed datagram ({} bytes): {}", size, e),
        }
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("target", &self.inner.target)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

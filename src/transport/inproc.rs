//! The bundled in-process transport binding.
//!
//! A self-contained engine that carries messages between sockets of one
//! context over in-memory queues. Endpoints use the `inproc://name` form and
//! exist only within their context. The binding implements the full
//! primitive contract: bounded inboxes with high-water marks, prefix-filtered
//! pub-sub fan-out with drop-on-full, round-robin push distribution,
//! multi-part atomicity, and ETERM unwinding of blocked calls.
//!
//! Request-reply socket types are carried over the same sticky-peer delivery
//! as PAIR; the lockstep state machine is not enforced here.

use crate::error::{
  EADDRINUSE, EAGAIN, ECONNREFUSED, EFAULT, EINVAL, ENOTSOCK, ENOTSUP, EPROTONOSUPPORT, ETERM,
};
use crate::message::SocketFlags;
use crate::poll::PollEvents;
use crate::socket::options;
use crate::socket::SocketType;
use crate::transport::{
  PollWaiter, RawError, RawPollItem, RawResult, TransportContext, TransportSocket,
};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

const SCHEME: &str = "inproc://";

/// Cadence at which busy-wait paths (bounded sends, poll sets, the device
/// relay) re-examine queue state.
const SPIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
struct Frame {
  data: Bytes,
  more: bool,
}

type Message = Vec<Frame>;

/// Per-context engine state shared by every socket of the context.
struct ContextInner {
  id: usize,
  registry: Mutex<HashMap<String, Arc<SocketCore>>>,
  sockets: Mutex<Vec<Weak<SocketCore>>>,
  terminated: AtomicBool,
}

impl ContextInner {
  fn terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }

  fn check_alive(&self) -> RawResult<()> {
    if self.terminated() {
      Err(RawError::from_code(ETERM))
    } else {
      Ok(())
    }
  }
}

/// Queue state of one socket. Whole messages travel through the inbox so
/// multi-part delivery is atomic; the parts of the message currently being
/// read sit in `pending_in`.
struct SocketCore {
  kind: SocketType,
  inbox: Mutex<VecDeque<Message>>,
  recv_cond: Condvar,
  pending_in: Mutex<VecDeque<Frame>>,
  pending_out: Mutex<Vec<Frame>>,
  peers: Mutex<Vec<Arc<SocketCore>>>,
  next_peer: AtomicUsize,
  subscriptions: Mutex<Vec<Vec<u8>>>,
  options: Mutex<HashMap<i32, Vec<u8>>>,
  last_more: AtomicBool,
  closed: AtomicBool,
  endpoints: Mutex<Vec<String>>,
}

impl SocketCore {
  fn new(kind: SocketType) -> Arc<Self> {
    Arc::new(Self {
      kind,
      inbox: Mutex::new(VecDeque::new()),
      recv_cond: Condvar::new(),
      pending_in: Mutex::new(VecDeque::new()),
      pending_out: Mutex::new(Vec::new()),
      peers: Mutex::new(Vec::new()),
      next_peer: AtomicUsize::new(0),
      subscriptions: Mutex::new(Vec::new()),
      options: Mutex::new(default_options()),
      last_more: AtomicBool::new(false),
      closed: AtomicBool::new(false),
      endpoints: Mutex::new(Vec::new()),
    })
  }

  fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Inbox capacity in messages; a high-water mark of 0 means unbounded.
  fn receive_capacity(&self) -> usize {
    let hwm = self
      .options
      .lock()
      .get(&options::RCVHWM)
      .and_then(|v| <[u8; 4]>::try_from(v.as_slice()).ok())
      .map(i32::from_ne_bytes)
      .unwrap_or(0);
    if hwm <= 0 {
      usize::MAX
    } else {
      hwm as usize
    }
  }

  /// Queues a whole message, refusing it when the inbox is at capacity.
  fn push_message(&self, message: Message) -> bool {
    let mut inbox = self.inbox.lock();
    if inbox.len() >= self.receive_capacity() {
      return false;
    }
    inbox.push_back(message);
    self.recv_cond.notify_one();
    true
  }

  fn try_take_message(&self) -> Option<Message> {
    self.inbox.lock().pop_front()
  }

  fn has_space(&self) -> bool {
    self.inbox.lock().len() < self.receive_capacity()
  }

  fn readable(&self) -> bool {
    !self.pending_in.lock().is_empty() || !self.inbox.lock().is_empty()
  }

  fn writable(&self) -> bool {
    if !self.kind.can_send() {
      return false;
    }
    if self.kind == SocketType::Pub {
      return true;
    }
    self
      .peers
      .lock()
      .iter()
      .any(|p| !p.is_closed() && p.kind.can_receive() && p.has_space())
  }

  fn matches_subscription(&self, data: &[u8]) -> bool {
    self
      .subscriptions
      .lock()
      .iter()
      .any(|prefix| data.starts_with(prefix))
  }

  fn remove_peer(&self, target: &Arc<SocketCore>) {
    self
      .peers
      .lock()
      .retain(|p| !Arc::ptr_eq(p, target));
  }

  fn wake_receivers(&self) {
    let _inbox = self.inbox.lock();
    self.recv_cond.notify_all();
  }
}

fn default_options() -> HashMap<i32, Vec<u8>> {
  let mut map = HashMap::new();
  map.insert(options::AFFINITY, options::encode_u64(0));
  map.insert(options::IDENTITY, Vec::new());
  map.insert(options::RATE, options::encode_i32(100));
  map.insert(options::RECOVERY_IVL, options::encode_i32(10_000));
  map.insert(options::SNDBUF, options::encode_i32(0));
  map.insert(options::RCVBUF, options::encode_i32(0));
  map.insert(options::LINGER, options::encode_i32(-1));
  map.insert(options::RECONNECT_IVL, options::encode_i32(100));
  map.insert(options::BACKLOG, options::encode_i32(100));
  map.insert(options::RECONNECT_IVL_MAX, options::encode_i32(0));
  map.insert(options::MAX_MSG_SIZE, options::encode_i64(-1));
  map.insert(options::SNDHWM, options::encode_i32(1000));
  map.insert(options::RCVHWM, options::encode_i32(1000));
  map.insert(options::MULTICAST_HOPS, options::encode_i32(1));
  map.insert(options::RCVTIMEO, options::encode_i32(-1));
  map.insert(options::SNDTIMEO, options::encode_i32(-1));
  map
}

const WRITABLE_OPTIONS: &[i32] = &[
  options::AFFINITY,
  options::RATE,
  options::RECOVERY_IVL,
  options::SNDBUF,
  options::RCVBUF,
  options::LINGER,
  options::RECONNECT_IVL,
  options::BACKLOG,
  options::RECONNECT_IVL_MAX,
  options::MAX_MSG_SIZE,
  options::SNDHWM,
  options::RCVHWM,
  options::MULTICAST_HOPS,
  options::RCVTIMEO,
  options::SNDTIMEO,
];

struct InprocSocket {
  ctx: Arc<ContextInner>,
  core: Arc<SocketCore>,
}

impl InprocSocket {
  fn check_open(&self) -> RawResult<()> {
    if self.core.is_closed() {
      Err(RawError::from_code(ENOTSOCK))
    } else {
      Ok(())
    }
  }

  fn endpoint_name(endpoint: &str) -> RawResult<&str> {
    endpoint
      .strip_prefix(SCHEME)
      .filter(|name| !name.is_empty())
      .ok_or_else(|| RawError::from_code(EPROTONOSUPPORT))
  }

  /// Hands the whole message to the target(s) this socket type selects.
  /// Fails with EAGAIN when no target can accept it right now.
  fn try_deliver(&self, message: &Message) -> RawResult<()> {
    let peers: Vec<Arc<SocketCore>> = self
      .core
      .peers
      .lock()
      .iter()
      .filter(|p| !p.is_closed() && p.kind.can_receive())
      .cloned()
      .collect();

    match self.core.kind {
      SocketType::Pub => {
        let first = message.first().ok_or_else(|| RawError::from_code(EFAULT))?;
        for peer in peers {
          if peer.kind.can_subscribe() && !peer.matches_subscription(&first.data) {
            continue;
          }
          // Slow subscribers lose messages rather than stalling the publisher.
          if !peer.push_message(message.clone()) {
            tracing::trace!("dropping message for subscriber at capacity");
          }
        }
        Ok(())
      }
      SocketType::Push => {
        if peers.is_empty() {
          return Err(RawError::from_code(EAGAIN));
        }
        let start = self.core.next_peer.load(Ordering::Relaxed);
        for offset in 0..peers.len() {
          let index = (start + offset) % peers.len();
          if peers[index].push_message(message.clone()) {
            self.core.next_peer.store(index + 1, Ordering::Relaxed);
            return Ok(());
          }
        }
        Err(RawError::from_code(EAGAIN))
      }
      _ => {
        let peer = peers.first().ok_or_else(|| RawError::from_code(EAGAIN))?;
        if peer.push_message(message.clone()) {
          Ok(())
        } else {
          Err(RawError::from_code(EAGAIN))
        }
      }
    }
  }

  fn deliver(&self, message: &Message, dont_wait: bool) -> RawResult<()> {
    loop {
      match self.try_deliver(message) {
        Ok(()) => return Ok(()),
        Err(raw) if raw.code == EAGAIN => {
          if dont_wait {
            return Err(raw);
          }
          self.ctx.check_alive()?;
          thread::sleep(SPIN_INTERVAL);
        }
        Err(raw) => return Err(raw),
      }
    }
  }

  fn wait_message(&self, dont_wait: bool) -> RawResult<Message> {
    let mut inbox = self.core.inbox.lock();
    loop {
      if let Some(message) = inbox.pop_front() {
        return Ok(message);
      }
      if self.ctx.terminated() {
        return Err(RawError::from_code(ETERM));
      }
      if self.core.is_closed() {
        return Err(RawError::from_code(ENOTSOCK));
      }
      if dont_wait {
        return Err(RawError::from_code(EAGAIN));
      }
      self.core.recv_cond.wait(&mut inbox);
    }
  }
}

impl TransportSocket for InprocSocket {
  fn bind(&self, endpoint: &str) -> RawResult<()> {
    self.ctx.check_alive()?;
    self.check_open()?;
    Self::endpoint_name(endpoint)?;
    let mut registry = self.ctx.registry.lock();
    if registry.contains_key(endpoint) {
      return Err(RawError::from_code(EADDRINUSE));
    }
    registry.insert(endpoint.to_string(), Arc::clone(&self.core));
    self.core.endpoints.lock().push(endpoint.to_string());
    Ok(())
  }

  fn connect(&self, endpoint: &str) -> RawResult<()> {
    self.ctx.check_alive()?;
    self.check_open()?;
    Self::endpoint_name(endpoint)?;
    // No pending-connect state: the bound side must already exist.
    let bound = self
      .ctx
      .registry
      .lock()
      .get(endpoint)
      .cloned()
      .ok_or_else(|| RawError::from_code(ECONNREFUSED))?;
    bound.peers.lock().push(Arc::clone(&self.core));
    self.core.peers.lock().push(bound);
    Ok(())
  }

  fn close(&self) -> RawResult<()> {
    if self.core.closed.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    {
      let mut registry = self.ctx.registry.lock();
      for endpoint in self.core.endpoints.lock().drain(..) {
        registry.remove(&endpoint);
      }
    }
    let peers: Vec<Arc<SocketCore>> = self.core.peers.lock().drain(..).collect();
    for peer in peers {
      peer.remove_peer(&self.core);
    }
    self.core.wake_receivers();
    Ok(())
  }

  fn send(&self, flags: SocketFlags, data: &[u8]) -> RawResult<()> {
    self.ctx.check_alive()?;
    self.check_open()?;
    if !self.core.kind.can_send() {
      return Err(RawError::from_code(ENOTSUP));
    }
    let more = flags.contains(SocketFlags::SEND_MORE);
    {
      let mut pending = self.core.pending_out.lock();
      pending.push(Frame {
        data: Bytes::copy_from_slice(data),
        more,
      });
      if more {
        return Ok(());
      }
    }

    let message = self.core.pending_out.lock().clone();
    match self.deliver(&message, flags.contains(SocketFlags::DONT_WAIT)) {
      Ok(()) => {
        self.core.pending_out.lock().clear();
        Ok(())
      }
      Err(raw) => {
        // The final part is re-submitted on retry; earlier parts stay staged.
        self.core.pending_out.lock().pop();
        Err(raw)
      }
    }
  }

  fn recv(&self, flags: SocketFlags) -> RawResult<Bytes> {
    self.ctx.check_alive()?;
    self.check_open()?;
    if !self.core.kind.can_receive() {
      return Err(RawError::from_code(ENOTSUP));
    }
    {
      let mut pending = self.core.pending_in.lock();
      if let Some(frame) = pending.pop_front() {
        self.core.last_more.store(frame.more, Ordering::Release);
        return Ok(frame.data);
      }
    }

    let message = self.wait_message(flags.contains(SocketFlags::DONT_WAIT))?;
    let mut frames: VecDeque<Frame> = message.into();
    let first = frames.pop_front().ok_or_else(|| RawError::from_code(EFAULT))?;
    self.core.last_more.store(first.more, Ordering::Release);
    *self.core.pending_in.lock() = frames;
    Ok(first.data)
  }

  fn set_option(&self, option: i32, value: &[u8]) -> RawResult<()> {
    self.ctx.check_alive()?;
    self.check_open()?;
    match option {
      options::SUBSCRIBE => {
        if !self.core.kind.can_subscribe() {
          return Err(RawError::from_code(EINVAL));
        }
        self.core.subscriptions.lock().push(value.to_vec());
        Ok(())
      }
      options::UNSUBSCRIBE => {
        if !self.core.kind.can_subscribe() {
          return Err(RawError::from_code(EINVAL));
        }
        let mut subscriptions = self.core.subscriptions.lock();
        match subscriptions.iter().position(|p| p == value) {
          Some(index) => {
            subscriptions.remove(index);
            Ok(())
          }
          None => Err(RawError::from_code(EINVAL)),
        }
      }
      options::IDENTITY => {
        if value.is_empty() || value.len() > 255 {
          return Err(RawError::from_code(EINVAL));
        }
        self.core.options.lock().insert(option, value.to_vec());
        Ok(())
      }
      _ if WRITABLE_OPTIONS.contains(&option) => {
        self.core.options.lock().insert(option, value.to_vec());
        Ok(())
      }
      _ => Err(RawError::from_code(EINVAL)),
    }
  }

  fn get_option(&self, option: i32) -> RawResult<Vec<u8>> {
    self.ctx.check_alive()?;
    self.check_open()?;
    if option == options::RCVMORE {
      let more = self.core.last_more.load(Ordering::Acquire) as i32;
      return Ok(options::encode_i32(more));
    }
    self
      .core
      .options
      .lock()
      .get(&option)
      .cloned()
      .ok_or_else(|| RawError::from_code(EINVAL))
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

struct InprocWaiter {
  ctx: Arc<ContextInner>,
}

impl PollWaiter for InprocWaiter {
  fn wait(&mut self, items: &mut [RawPollItem<'_>], timeout_ms: i64) -> RawResult<usize> {
    let deadline = if timeout_ms < 0 {
      None
    } else {
      Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    };

    loop {
      if self.ctx.terminated() {
        return Err(RawError::from_code(ETERM));
      }

      let mut ready = 0;
      for item in items.iter_mut() {
        let socket = item
          .socket
          .as_any()
          .downcast_ref::<InprocSocket>()
          .ok_or_else(|| RawError::from_code(ENOTSOCK))?;
        let mut revents = PollEvents::empty();
        if item.events.contains(PollEvents::IN) && socket.core.readable() {
          revents |= PollEvents::IN;
        }
        if item.events.contains(PollEvents::OUT) && socket.core.writable() {
          revents |= PollEvents::OUT;
        }
        item.revents = revents;
        if !revents.is_empty() {
          ready += 1;
        }
      }
      if ready > 0 {
        return Ok(ready);
      }
      if let Some(deadline) = deadline {
        if Instant::now() >= deadline {
          return Ok(0);
        }
      }
      thread::sleep(SPIN_INTERVAL);
    }
  }
}

/// The in-process [`TransportContext`] implementation.
pub struct InprocTransport {
  inner: Arc<ContextInner>,
}

impl InprocTransport {
  /// Creates a fresh in-process context.
  pub fn create() -> Arc<dyn TransportContext> {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
    Arc::new(Self {
      inner: Arc::new(ContextInner {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        registry: Mutex::new(HashMap::new()),
        sockets: Mutex::new(Vec::new()),
        terminated: AtomicBool::new(false),
      }),
    })
  }
}

impl TransportContext for InprocTransport {
  fn open_socket(&self, kind: SocketType) -> RawResult<Box<dyn TransportSocket>> {
    self.inner.check_alive()?;
    let core = SocketCore::new(kind);
    self.inner.sockets.lock().push(Arc::downgrade(&core));
    Ok(Box::new(InprocSocket {
      ctx: Arc::clone(&self.inner),
      core,
    }))
  }

  fn poller(&self, _capacity: usize) -> RawResult<Box<dyn PollWaiter>> {
    self.inner.check_alive()?;
    Ok(Box::new(InprocWaiter {
      ctx: Arc::clone(&self.inner),
    }))
  }

  fn run_device(
    &self,
    frontend: &dyn TransportSocket,
    backend: &dyn TransportSocket,
    running: &AtomicBool,
  ) -> RawResult<()> {
    let frontend = frontend
      .as_any()
      .downcast_ref::<InprocSocket>()
      .ok_or_else(|| RawError::from_code(ENOTSOCK))?;
    let backend = backend
      .as_any()
      .downcast_ref::<InprocSocket>()
      .ok_or_else(|| RawError::from_code(ENOTSOCK))?;

    while running.load(Ordering::Acquire) {
      self.inner.check_alive()?;
      let mut idle = true;
      if let Some(message) = frontend.core.try_take_message() {
        relay(backend, &message, running)?;
        idle = false;
      }
      if let Some(message) = backend.core.try_take_message() {
        relay(frontend, &message, running)?;
        idle = false;
      }
      if idle {
        thread::sleep(SPIN_INTERVAL);
      }
    }
    Ok(())
  }

  fn terminate(&self) -> RawResult<()> {
    if self.inner.terminated.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    for weak in self.inner.sockets.lock().iter() {
      if let Some(core) = weak.upgrade() {
        core.wake_receivers();
      }
    }
    Ok(())
  }

  fn id(&self) -> usize {
    self.inner.id
  }
}

/// Forwards one whole message, waiting for inbox space unless the relay is
/// being stopped (a message in flight at stop time is dropped).
fn relay(dst: &InprocSocket, message: &Message, running: &AtomicBool) -> RawResult<()> {
  loop {
    match dst.try_deliver(message) {
      Ok(()) => return Ok(()),
      Err(raw) if raw.code == EAGAIN => {
        if !running.load(Ordering::Acquire) {
          return Ok(());
        }
        dst.ctx.check_alive()?;
        thread::sleep(SPIN_INTERVAL);
      }
      Err(raw) => return Err(raw),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pair(ctx: &Arc<dyn TransportContext>, endpoint: &str) -> (Box<dyn TransportSocket>, Box<dyn TransportSocket>) {
    let a = ctx.open_socket(SocketType::Pair).unwrap();
    let b = ctx.open_socket(SocketType::Pair).unwrap();
    a.bind(endpoint).unwrap();
    b.connect(endpoint).unwrap();
    (a, b)
  }

  #[test]
  fn connect_requires_a_bound_endpoint() {
    let ctx = InprocTransport::create();
    let socket = ctx.open_socket(SocketType::Pair).unwrap();
    let err = socket.connect("inproc://nobody-home").unwrap_err();
    assert_eq!(err.code, ECONNREFUSED);
  }

  #[test]
  fn duplicate_bind_is_refused() {
    let ctx = InprocTransport::create();
    let a = ctx.open_socket(SocketType::Pair).unwrap();
    let b = ctx.open_socket(SocketType::Pair).unwrap();
    a.bind("inproc://taken").unwrap();
    assert_eq!(b.bind("inproc://taken").unwrap_err().code, EADDRINUSE);
  }

  #[test]
  fn multipart_is_delivered_atomically() {
    let ctx = InprocTransport::create();
    let (a, b) = pair(&ctx, "inproc://multipart");
    a.send(SocketFlags::SEND_MORE, b"head").unwrap();
    a.send(SocketFlags::NONE, b"tail").unwrap();

    assert_eq!(&b.recv(SocketFlags::NONE).unwrap()[..], b"head");
    let more = b.get_option(options::RCVMORE).unwrap();
    assert_eq!(i32::from_ne_bytes(more.try_into().unwrap()), 1);
    assert_eq!(&b.recv(SocketFlags::NONE).unwrap()[..], b"tail");
  }

  #[test]
  fn nonblocking_recv_reports_eagain_when_empty() {
    let ctx = InprocTransport::create();
    let (_a, b) = pair(&ctx, "inproc://empty");
    let err = b.recv(SocketFlags::DONT_WAIT).unwrap_err();
    assert_eq!(err.code, EAGAIN);
  }

  #[test]
  fn terminate_fails_blocked_operations_with_eterm() {
    let ctx = InprocTransport::create();
    let (_a, b) = pair(&ctx, "inproc://terminated");
    ctx.terminate().unwrap();
    assert_eq!(b.recv(SocketFlags::NONE).unwrap_err().code, ETERM);
  }

  #[test]
  fn subscription_prefixes_filter_publishes() {
    let ctx = InprocTransport::create();
    let publisher = ctx.open_socket(SocketType::Pub).unwrap();
    let subscriber = ctx.open_socket(SocketType::Sub).unwrap();
    publisher.bind("inproc://feed").unwrap();
    subscriber.connect("inproc://feed").unwrap();
    subscriber.set_option(options::SUBSCRIBE, b"topic.a").unwrap();

    publisher.send(SocketFlags::NONE, b"topic.a update").unwrap();
    publisher.send(SocketFlags::NONE, b"topic.b update").unwrap();

    assert_eq!(&subscriber.recv(SocketFlags::NONE).unwrap()[..], b"topic.a update");
    assert_eq!(subscriber.recv(SocketFlags::DONT_WAIT).unwrap_err().code, EAGAIN);
  }
}

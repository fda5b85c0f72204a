//! Exercises the retry protocol against a scripted transport, verifying how
//! many raw calls each operation makes and how each error code is absorbed.

mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use zsock::error::{EAGAIN, EINTR, EINVAL, ENOTSUP, ETERM};
use zsock::message::SocketFlags;
use zsock::socket::options;
use zsock::transport::{
  PollWaiter, RawError, RawResult, TransportContext, TransportSocket,
};
use zsock::{Context, Device, ReceiveResult, SendResult, SocketType, ZmqError};

/// One scripted outcome for a raw send or receive call.
enum Step {
  Data(&'static [u8]),
  Ok,
  Fail(i32),
}

#[derive(Default)]
struct ScriptCore {
  recv_script: Mutex<VecDeque<Step>>,
  send_script: Mutex<VecDeque<Step>>,
  recv_calls: AtomicUsize,
  send_calls: AtomicUsize,
  rcvmore_calls: AtomicUsize,
}

struct ScriptSocket {
  core: Arc<ScriptCore>,
}

impl TransportSocket for ScriptSocket {
  fn bind(&self, _endpoint: &str) -> RawResult<()> {
    Ok(())
  }

  fn connect(&self, _endpoint: &str) -> RawResult<()> {
    Ok(())
  }

  fn close(&self) -> RawResult<()> {
    Ok(())
  }

  fn send(&self, _flags: SocketFlags, _data: &[u8]) -> RawResult<()> {
    self.core.send_calls.fetch_add(1, Ordering::Relaxed);
    match self.core.send_script.lock().pop_front() {
      Some(Step::Ok) | Some(Step::Data(_)) => Ok(()),
      Some(Step::Fail(code)) => Err(RawError::from_code(code)),
      None => Err(RawError::from_code(EAGAIN)),
    }
  }

  fn recv(&self, _flags: SocketFlags) -> RawResult<Bytes> {
    self.core.recv_calls.fetch_add(1, Ordering::Relaxed);
    match self.core.recv_script.lock().pop_front() {
      Some(Step::Data(data)) => Ok(Bytes::from_static(data)),
      Some(Step::Ok) => Ok(Bytes::new()),
      Some(Step::Fail(code)) => Err(RawError::from_code(code)),
      None => Err(RawError::from_code(EAGAIN)),
    }
  }

  fn set_option(&self, _option: i32, _value: &[u8]) -> RawResult<()> {
    Ok(())
  }

  fn get_option(&self, option: i32) -> RawResult<Vec<u8>> {
    if option == options::RCVMORE {
      self.core.rcvmore_calls.fetch_add(1, Ordering::Relaxed);
      Ok(0i32.to_ne_bytes().to_vec())
    } else {
      Err(RawError::from_code(EINVAL))
    }
  }

  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
}

/// Hands each opened socket the next prepared script.
struct ScriptTransport {
  cores: Mutex<VecDeque<Arc<ScriptCore>>>,
  device_script: Mutex<VecDeque<Step>>,
}

impl ScriptTransport {
  fn new() -> Self {
    Self {
      cores: Mutex::new(VecDeque::new()),
      device_script: Mutex::new(VecDeque::new()),
    }
  }

  fn prepare(&self, recv: Vec<Step>, send: Vec<Step>) -> Arc<ScriptCore> {
    let core = Arc::new(ScriptCore::default());
    *core.recv_script.lock() = recv.into();
    *core.send_script.lock() = send.into();
    self.cores.lock().push_back(Arc::clone(&core));
    core
  }
}

impl TransportContext for ScriptTransport {
  fn open_socket(&self, _kind: SocketType) -> RawResult<Box<dyn TransportSocket>> {
    let core = self
      .cores
      .lock()
      .pop_front()
      .ok_or_else(|| RawError::from_code(ENOTSUP))?;
    Ok(Box::new(ScriptSocket { core }))
  }

  fn poller(&self, _capacity: usize) -> RawResult<Box<dyn PollWaiter>> {
    Err(RawError::from_code(ENOTSUP))
  }

  fn run_device(
    &self,
    _frontend: &dyn TransportSocket,
    _backend: &dyn TransportSocket,
    _running: &AtomicBool,
  ) -> RawResult<()> {
    match self.device_script.lock().pop_front() {
      Some(Step::Fail(code)) => Err(RawError::from_code(code)),
      _ => Ok(()),
    }
  }

  fn terminate(&self) -> RawResult<()> {
    Ok(())
  }

  fn id(&self) -> usize {
    usize::MAX
  }
}

fn scripted(recv: Vec<Step>, send: Vec<Step>) -> (Context, Arc<ScriptCore>) {
  common::init_tracing();
  let transport = Arc::new(ScriptTransport::new());
  let core = transport.prepare(recv, send);
  (Context::with_transport(transport), core)
}

#[test]
fn zero_timeout_receive_probes_exactly_once() {
  let (context, core) = scripted(vec![Step::Fail(EAGAIN)], vec![]);
  let socket = context.socket(SocketType::Pair).unwrap();

  let message = socket.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(message.result(), ReceiveResult::TryAgain);
  assert_eq!(core.recv_calls.load(Ordering::Relaxed), 1);
  // The receive-more indicator is only consulted after a successful receive.
  assert_eq!(core.rcvmore_calls.load(Ordering::Relaxed), 0);
}

#[test]
fn interrupted_calls_are_retried_transparently() {
  let (context, core) = scripted(
    vec![Step::Fail(EINTR), Step::Fail(EINTR), Step::Data(b"finally")],
    vec![],
  );
  let socket = context.socket(SocketType::Pair).unwrap();

  let message = socket.recv().unwrap();
  assert_eq!(message.result(), ReceiveResult::Received);
  assert_eq!(message.data(), b"finally");
  assert_eq!(core.recv_calls.load(Ordering::Relaxed), 3);
  assert_eq!(core.rcvmore_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn context_termination_becomes_the_interrupted_outcome() {
  let (context, _core) = scripted(vec![Step::Fail(ETERM)], vec![Step::Fail(ETERM)]);
  let socket = context.socket(SocketType::Pair).unwrap();

  let message = socket.recv().unwrap();
  assert_eq!(message.result(), ReceiveResult::Interrupted);
  assert_eq!(socket.send(b"x").unwrap(), SendResult::Interrupted);
}

#[test]
fn fatal_codes_surface_as_transport_errors() {
  let (context, _core) = scripted(vec![Step::Fail(EINVAL)], vec![]);
  let socket = context.socket(SocketType::Pair).unwrap();

  match socket.recv() {
    Err(ZmqError::Transport { code, .. }) => assert_eq!(code, EINVAL),
    other => panic!("expected a transport error, got {other:?}"),
  }
}

#[test]
fn full_transport_reports_try_again_without_blocking() {
  let (context, core) = scripted(vec![], vec![Step::Fail(EAGAIN)]);
  let socket = context.socket(SocketType::Pair).unwrap();

  assert_eq!(socket.send(b"x").unwrap(), SendResult::TryAgain);
  assert_eq!(core.send_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn timed_receive_retries_until_the_deadline() {
  // An empty script keeps answering EAGAIN.
  let (context, core) = scripted(vec![], vec![]);
  let socket = context.socket(SocketType::Pair).unwrap();

  let timeout = Duration::from_millis(30);
  let start = Instant::now();
  let message = socket.recv_timeout(timeout).unwrap();
  assert_eq!(message.result(), ReceiveResult::TryAgain);
  assert!(start.elapsed() >= timeout);
  assert!(core.recv_calls.load(Ordering::Relaxed) >= 2);
}

#[test]
fn interruptions_do_not_consume_the_caller_budget() {
  let (context, core) = scripted(
    vec![Step::Fail(EINTR), Step::Fail(EINTR), Step::Data(b"kept")],
    vec![],
  );
  let socket = context.socket(SocketType::Pair).unwrap();

  let message = socket.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(message.result(), ReceiveResult::Received);
  assert_eq!(message.data(), b"kept");
  assert_eq!(core.recv_calls.load(Ordering::Relaxed), 3);
}

#[test]
fn a_fresh_device_run_clears_the_previous_run_error() {
  common::init_tracing();
  let transport = Arc::new(ScriptTransport::new());
  transport.prepare(vec![], vec![]);
  transport.prepare(vec![], vec![]);
  *transport.device_script.lock() = vec![Step::Fail(EINVAL)].into();
  let engine: Arc<dyn TransportContext> = transport.clone();
  let context = Context::with_transport(engine);

  let mut device = Device::streamer(&context).unwrap();
  assert!(device.start().is_err());
  assert!(device.last_error().is_some());

  // The exhausted script lets the next run finish cleanly; its outcome must
  // not be shadowed by the earlier failure.
  device.start().unwrap();
  assert!(device.last_error().is_none());
}

#[test]
fn timed_send_succeeds_after_transient_pressure() {
  let (context, core) = scripted(
    vec![],
    vec![Step::Fail(EAGAIN), Step::Fail(EAGAIN), Step::Ok],
  );
  let socket = context.socket(SocketType::Pair).unwrap();

  let result = socket
    .send_timeout(b"payload", Duration::from_secs(5))
    .unwrap();
  assert_eq!(result, SendResult::Sent);
  assert_eq!(core.send_calls.load(Ordering::Relaxed), 3);
}

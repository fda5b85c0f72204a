mod common;

use common::{test_context, unique_endpoint, RECV_TIMEOUT};
use std::time::Duration;
use zsock::{ReceiveResult, SocketType, ZmqError};

#[test]
fn subscriber_receives_only_matching_prefixes() {
  let context = test_context();
  let endpoint = unique_endpoint("filtered-feed");
  let publisher = context.socket(SocketType::Pub).unwrap();
  let subscriber = context.socket(SocketType::Sub).unwrap();
  publisher.bind(&endpoint).unwrap();
  subscriber.connect(&endpoint).unwrap();
  subscriber.subscribe(b"weather.").unwrap();

  publisher.send(b"weather.london sunny").unwrap();
  publisher.send(b"sports.football 2-1").unwrap();
  publisher.send(b"weather.oslo rain").unwrap();

  let first = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(first.data(), b"weather.london sunny");
  let second = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(second.data(), b"weather.oslo rain");

  let nothing = subscriber.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(nothing.result(), ReceiveResult::TryAgain);
}

#[test]
fn unsubscribed_socket_receives_nothing() {
  let context = test_context();
  let endpoint = unique_endpoint("silent-feed");
  let publisher = context.socket(SocketType::Pub).unwrap();
  let subscriber = context.socket(SocketType::Sub).unwrap();
  publisher.bind(&endpoint).unwrap();
  subscriber.connect(&endpoint).unwrap();

  publisher.send(b"anyone listening?").unwrap();
  let nothing = subscriber.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(nothing.result(), ReceiveResult::TryAgain);
}

#[test]
fn subscribe_all_matches_everything() {
  let context = test_context();
  let endpoint = unique_endpoint("firehose");
  let publisher = context.socket(SocketType::Pub).unwrap();
  let subscriber = context.socket(SocketType::Sub).unwrap();
  publisher.bind(&endpoint).unwrap();
  subscriber.connect(&endpoint).unwrap();
  subscriber.subscribe_all().unwrap();

  publisher.send(b"alpha").unwrap();
  publisher.send(b"beta").unwrap();

  assert_eq!(subscriber.recv_timeout(RECV_TIMEOUT).unwrap().data(), b"alpha");
  assert_eq!(subscriber.recv_timeout(RECV_TIMEOUT).unwrap().data(), b"beta");
}

#[test]
fn unsubscribe_stops_delivery() {
  let context = test_context();
  let endpoint = unique_endpoint("revoked-feed");
  let publisher = context.socket(SocketType::Pub).unwrap();
  let subscriber = context.socket(SocketType::Sub).unwrap();
  publisher.bind(&endpoint).unwrap();
  subscriber.connect(&endpoint).unwrap();
  subscriber.subscribe(b"topic").unwrap();

  publisher.send(b"topic one").unwrap();
  assert_eq!(subscriber.recv_timeout(RECV_TIMEOUT).unwrap().data(), b"topic one");

  subscriber.unsubscribe(b"topic").unwrap();
  publisher.send(b"topic two").unwrap();
  let nothing = subscriber.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(nothing.result(), ReceiveResult::TryAgain);
}

#[test]
fn every_subscriber_gets_its_own_copy() {
  let context = test_context();
  let endpoint = unique_endpoint("fanout");
  let publisher = context.socket(SocketType::Pub).unwrap();
  publisher.bind(&endpoint).unwrap();

  let first = context.socket(SocketType::Sub).unwrap();
  let second = context.socket(SocketType::Sub).unwrap();
  for subscriber in [&first, &second] {
    subscriber.connect(&endpoint).unwrap();
    subscriber.subscribe_all().unwrap();
  }

  publisher.send(b"broadcast").unwrap();
  assert_eq!(first.recv_timeout(RECV_TIMEOUT).unwrap().data(), b"broadcast");
  assert_eq!(second.recv_timeout(RECV_TIMEOUT).unwrap().data(), b"broadcast");
}

#[test]
fn publishing_without_subscribers_succeeds() {
  let context = test_context();
  let endpoint = unique_endpoint("empty-room");
  let publisher = context.socket(SocketType::Pub).unwrap();
  publisher.bind(&endpoint).unwrap();

  // PUB never blocks; undeliverable messages are dropped.
  publisher.send(b"shout into the void").unwrap();
}

#[test]
fn multipart_publish_is_filtered_on_the_first_part() {
  let context = test_context();
  let endpoint = unique_endpoint("multipart-feed");
  let publisher = context.socket(SocketType::Pub).unwrap();
  let subscriber = context.socket(SocketType::Sub).unwrap();
  publisher.bind(&endpoint).unwrap();
  subscriber.connect(&endpoint).unwrap();
  subscriber.subscribe(b"match").unwrap();

  publisher.send_part(b"match-topic").unwrap();
  publisher.send(b"payload").unwrap();
  publisher.send_part(b"other-topic").unwrap();
  publisher.send(b"hidden payload").unwrap();

  let envelope = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(envelope.data(), b"match-topic");
  assert!(envelope.has_more());
  let payload = subscriber.recv().unwrap();
  assert_eq!(payload.data(), b"payload");
  assert!(!payload.has_more());

  let nothing = subscriber.recv_timeout(Duration::ZERO).unwrap();
  assert_eq!(nothing.result(), ReceiveResult::TryAgain);
}

#[test]
fn subscribing_on_a_non_sub_socket_is_rejected() {
  let context = test_context();
  let publisher = context.socket(SocketType::Pub).unwrap();
  assert!(matches!(
    publisher.subscribe(b"nope"),
    Err(ZmqError::InvalidSocketType("PUB"))
  ));
}

/// The messaging pattern of a socket.
///
/// Instead of one wrapper type per pattern, a single [`Socket`] is tagged with
/// its type at construction and the capability predicates below gate which
/// operations it legally exposes.
///
/// [`Socket`]: crate::socket::Socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// **PAIR:** Exclusive one-to-one connection between two peers.
  Pair,
  /// **PUB (Publish):** Distributes messages to all connected subscribers.
  /// Messages are prefix-filtered on the subscriber side. Cannot receive.
  Pub,
  /// **SUB (Subscribe):** Receives messages from connected PUB sockets for
  /// the prefixes it subscribed to. Cannot send.
  Sub,
  /// **REQ (Request):** Sends requests and receives replies in a strict
  /// alternating sequence.
  Req,
  /// **REP (Reply):** Receives requests and sends replies in a strict
  /// alternating sequence.
  Rep,
  /// **DEALER (extended REQ):** Asynchronous request-reply; load-balances
  /// outgoing messages and fair-queues incoming ones.
  Dealer,
  /// **ROUTER (extended REP):** Asynchronous request-reply; routes outgoing
  /// messages to specific peers.
  Router,
  /// **PUSH:** Distributes messages round-robin to connected PULL workers.
  /// Cannot receive.
  Push,
  /// **PULL:** Fair-queues messages from connected PUSH distributors.
  /// Cannot send.
  Pull,
}

impl SocketType {
  /// Whether sockets of this type may send message parts.
  pub fn can_send(self) -> bool {
    !matches!(self, SocketType::Sub | SocketType::Pull)
  }

  /// Whether sockets of this type may receive message parts.
  pub fn can_receive(self) -> bool {
    !matches!(self, SocketType::Pub | SocketType::Push)
  }

  /// Whether sockets of this type accept subscription filters.
  pub fn can_subscribe(self) -> bool {
    matches!(self, SocketType::Sub)
  }

  pub fn name(self) -> &'static str {
    match self {
      SocketType::Pair => "PAIR",
      SocketType::Pub => "PUB",
      SocketType::Sub => "SUB",
      SocketType::Req => "REQ",
      SocketType::Rep => "REP",
      SocketType::Dealer => "DEALER",
      SocketType::Router => "ROUTER",
      SocketType::Push => "PUSH",
      SocketType::Pull => "PULL",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn capability_sets_follow_the_pattern() {
    assert!(SocketType::Pub.can_send() && !SocketType::Pub.can_receive());
    assert!(!SocketType::Sub.can_send() && SocketType::Sub.can_receive());
    assert!(SocketType::Sub.can_subscribe() && !SocketType::Pub.can_subscribe());
    assert!(SocketType::Pair.can_send() && SocketType::Pair.can_receive());
    assert!(SocketType::Push.can_send() && !SocketType::Push.can_receive());
    assert!(!SocketType::Pull.can_send() && SocketType::Pull.can_receive());
  }
}

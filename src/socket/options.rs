use std::time::Duration;

use crate::error::ZmqError;

// Option ids follow the classic libzmq numbering.
pub const AFFINITY: i32 = 4;
pub const IDENTITY: i32 = 5;
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const RATE: i32 = 8;
pub const RECOVERY_IVL: i32 = 9;
pub const SNDBUF: i32 = 11;
pub const RCVBUF: i32 = 12;
pub const RCVMORE: i32 = 13;
pub const LINGER: i32 = 17;
pub const RECONNECT_IVL: i32 = 18;
pub const BACKLOG: i32 = 19;
pub const RECONNECT_IVL_MAX: i32 = 21;
pub const MAX_MSG_SIZE: i32 = 22;
pub const SNDHWM: i32 = 23;
pub const RCVHWM: i32 = 24;
pub const MULTICAST_HOPS: i32 = 25;
pub const RCVTIMEO: i32 = 27;
pub const SNDTIMEO: i32 = 28;

// --- Value encoding helpers ---
//
// Option values cross the transport boundary as native-endian byte slices,
// matching the C API convention. Durations travel as i32 milliseconds with
// -1 standing for "infinite" (`None`).

pub(crate) fn encode_i32(value: i32) -> Vec<u8> {
  value.to_ne_bytes().to_vec()
}

pub(crate) fn encode_i64(value: i64) -> Vec<u8> {
  value.to_ne_bytes().to_vec()
}

pub(crate) fn encode_u64(value: u64) -> Vec<u8> {
  value.to_ne_bytes().to_vec()
}

pub(crate) fn parse_i32_option(value: &[u8], option: i32) -> Result<i32, ZmqError> {
  let arr: [u8; 4] = value
    .try_into()
    .map_err(|_| ZmqError::InvalidOptionValue(option))?;
  Ok(i32::from_ne_bytes(arr))
}

pub(crate) fn parse_i64_option(value: &[u8], option: i32) -> Result<i64, ZmqError> {
  let arr: [u8; 8] = value
    .try_into()
    .map_err(|_| ZmqError::InvalidOptionValue(option))?;
  Ok(i64::from_ne_bytes(arr))
}

pub(crate) fn parse_u64_option(value: &[u8], option: i32) -> Result<u64, ZmqError> {
  let arr: [u8; 8] = value
    .try_into()
    .map_err(|_| ZmqError::InvalidOptionValue(option))?;
  Ok(u64::from_ne_bytes(arr))
}

pub(crate) fn parse_bool_option(value: &[u8], option: i32) -> Result<bool, ZmqError> {
  Ok(parse_i32_option(value, option)? == 1)
}

/// Encodes `None` as -1 ("infinite") and `Some(d)` as whole milliseconds.
pub(crate) fn encode_duration_ms(value: Option<Duration>) -> Vec<u8> {
  let ms = match value {
    None => -1i32,
    Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
  };
  encode_i32(ms)
}

pub(crate) fn parse_duration_ms_option(value: &[u8], option: i32) -> Result<Option<Duration>, ZmqError> {
  match parse_i32_option(value, option)? {
    -1 => Ok(None),
    ms @ 0.. => Ok(Some(Duration::from_millis(ms as u64))),
    _ => Err(ZmqError::InvalidOptionValue(option)),
  }
}

/// Identities are limited to 255 bytes, as in the classic transport.
pub(crate) fn check_identity(value: &[u8]) -> Result<(), ZmqError> {
  if value.is_empty() || value.len() > 255 {
    Err(ZmqError::InvalidOptionValue(IDENTITY))
  } else {
    Ok(())
  }
}

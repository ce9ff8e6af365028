//! # Event Model
//!
//! Wire representation of one analytics event and the fixed-format
//! timestamp shared by every time field.

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Textual timestamp layout: second precision, no timezone suffix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Quoted literal clients send for an absent timestamp.
const NULL_LITERAL: &str = "null";

/// Errors raised while decoding an event
#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid timestamp {input:?}, expected YYYY-MM-DD HH:MM:SS: {reason}")]
    Timestamp { input: String, reason: String },

    #[error("invalid event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Timestamp with second precision that may be absent.
///
/// The zero value (`LocalDateTime::ZERO`) stands for "not reported". Naive
/// values carry no zone; they are interpreted as UTC when persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDateTime(Option<NaiveDateTime>);

impl LocalDateTime {
    /// The absent timestamp
    pub const ZERO: Self = Self(None);

    /// Wrap a naive timestamp, dropping sub-second precision
    pub fn new(value: NaiveDateTime) -> Self {
        Self(Some(value.with_nanosecond(0).unwrap_or(value)))
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::new(Utc::now().naive_utc())
    }

    /// Parse the fixed textual format. The literal `null` yields the zero value.
    pub fn parse(input: &str) -> Result<Self, EventError> {
        if input == NULL_LITERAL {
            return Ok(Self::ZERO);
        }

        let invalid = |reason: String| EventError::Timestamp { input: input.to_string(), reason };

        // chrono accepts padding variations the wire format does not
        if !has_timestamp_shape(input.as_bytes()) {
            return Err(invalid("layout mismatch".to_string()));
        }

        NaiveDateTime::parse_from_str(input, TIMESTAMP_FORMAT)
            .map(Self::new)
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_naive(&self) -> Option<NaiveDateTime> {
        self.0
    }

    /// Seconds since the Unix epoch, as stored in a `DateTime` column.
    /// The zero value maps to 0.
    pub fn unix_seconds(&self) -> u32 {
        self.0
            .map(|value| value.and_utc().timestamp().clamp(0, i64::from(u32::MAX)) as u32)
            .unwrap_or(0)
    }
}

/// Exactly `DDDD-DD-DD DD:DD:DD`, one ASCII digit per `D`.
fn has_timestamp_shape(bytes: &[u8]) -> bool {
    const LAYOUT: &[u8; 19] = b"DDDD-DD-DD DD:DD:DD";

    bytes.len() == LAYOUT.len()
        && bytes.iter().zip(LAYOUT).all(|(&b, &expected)| match expected {
            b'D' => b.is_ascii_digit(),
            sep => b == sep,
        })
}

impl From<NaiveDateTime> for LocalDateTime {
    fn from(value: NaiveDateTime) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for LocalDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{}", value.format(TIMESTAMP_FORMAT)),
            None => f.write_str(NULL_LITERAL),
        }
    }
}

// A zero timestamp serializes as JSON null here; `Event` omits zero-valued
// time fields entirely before this is reached.
impl Serialize for LocalDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(value) => serializer.collect_str(&value.format(TIMESTAMP_FORMAT)),
            None => serializer.serialize_none(),
        }
    }
}

struct LocalDateTimeVisitor;

impl<'de> Visitor<'de> for LocalDateTimeVisitor {
    type Value = LocalDateTime;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a \"YYYY-MM-DD HH:MM:SS\" string or \"null\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        LocalDateTime::parse(value).map_err(E::custom)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LocalDateTime::ZERO)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LocalDateTime::ZERO)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_option(LocalDateTimeVisitor)
    }
}

/// One analytics record as received over HTTP.
///
/// `ip` and `server_time` are server-owned: whatever the client sends for
/// them is replaced by [`Event::enrich`] before the event is enqueued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(skip_serializing_if = "LocalDateTime::is_zero")]
    pub client_time: LocalDateTime,
    pub device_id: String,
    pub device_os: String,
    pub session: String,
    pub sequence: i32,
    pub event: String,
    pub param_int: Option<i32>,
    pub param_str: Option<String>,
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "LocalDateTime::is_zero")]
    pub server_time: LocalDateTime,
}

impl Event {
    /// Decode one event from a JSON document
    pub fn from_json(body: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Stamp server-side fields, ignoring anything the client supplied for them
    pub fn enrich(mut self, peer: Option<SocketAddr>, now: LocalDateTime) -> Self {
        self.server_time = now;
        self.ip = peer.map(|addr| addr.ip().to_string());
        self
    }

    /// Network form of `ip`. Missing or unparsable addresses yield `None`.
    pub fn ip_v4(&self) -> Option<Ipv4Addr> {
        match self.ip.as_deref()?.parse::<IpAddr>().ok()? {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(addr) => addr.to_ipv4_mapped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const EXAMPLE: &str = r#"{"client_time":"2020-12-01 23:59:00","device_id":"0287D9AA-4ADF-4B37-A60F-3E9E645C821E","device_os":"iOS 13.5.1","session":"ybuRi8mAUypxjbxQ","sequence":1,"event":"app_start","param_int":0,"param_str":"some text"}"#;

    fn at(h: u32, m: u32, s: u32) -> LocalDateTime {
        LocalDateTime::new(NaiveDate::from_ymd_opt(2020, 12, 1).unwrap().and_hms_opt(h, m, s).unwrap())
    }

    #[test]
    fn test_decode_example_body() {
        let event = Event::from_json(EXAMPLE.as_bytes()).unwrap();

        assert_eq!(event.client_time, at(23, 59, 0));
        assert_eq!(event.device_id, "0287D9AA-4ADF-4B37-A60F-3E9E645C821E");
        assert_eq!(event.device_os, "iOS 13.5.1");
        assert_eq!(event.sequence, 1);
        assert_eq!(event.event, "app_start");
        assert_eq!(event.param_int, Some(0));
        assert_eq!(event.param_str.as_deref(), Some("some text"));
        assert!(event.ip.is_none());
        assert!(event.server_time.is_zero());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let event = Event { client_time: at(8, 30, 15), ..Default::default() };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""client_time":"2020-12-01 08:30:15""#));

        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.client_time, event.client_time);
    }

    #[test]
    fn test_zero_timestamp_is_omitted_and_decodes_back_to_zero() {
        let event = Event { device_id: "d".to_string(), ..Default::default() };

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("client_time"));
        assert!(!json.contains("server_time"));

        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert!(decoded.client_time.is_zero());
        assert!(decoded.server_time.is_zero());
    }

    #[test]
    fn test_zero_timestamp_outside_a_field_encodes_as_null() {
        let values = vec![LocalDateTime::ZERO, at(1, 2, 3)];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,"2020-12-01 01:02:03"]"#);

        let decoded: Vec<LocalDateTime> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_quoted_null_decodes_to_zero() {
        let event: Event = serde_json::from_str(r#"{"client_time":"null","sequence":2}"#).unwrap();
        assert!(event.client_time.is_zero());
        assert_eq!(event.sequence, 2);

        let event: Event = serde_json::from_str(r#"{"client_time":null}"#).unwrap();
        assert!(event.client_time.is_zero());

        let event: Event = serde_json::from_str(r#"{"server_time":"null"}"#).unwrap();
        assert!(event.server_time.is_zero());
    }

    #[test]
    fn test_malformed_timestamp_is_a_descriptive_error() {
        let err = Event::from_json(br#"{"client_time":"2020-12-01T23:59:00Z"}"#).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2020-12-01T23:59:00Z"), "{message}");
        assert!(message.contains("YYYY-MM-DD HH:MM:SS"), "{message}");

        assert!(LocalDateTime::parse("2020-12-01").is_err());
        assert!(LocalDateTime::parse("2020-12-01 23:59:00.5").is_err());
        assert!(LocalDateTime::parse("NULL").is_err());

        for input in [
            "2020-1-1 1:2:3",
            "2020-12-0123:59:00",
            "2020-12-01     23:59:00",
            " 2020-12-01 23:59:00",
            "+2020-12-01 23:59:00",
            "2020-12-01 23:59:00 ",
            "2020-12-01\t23:59:00",
        ] {
            assert!(
                matches!(LocalDateTime::parse(input), Err(EventError::Timestamp { .. })),
                "{input:?} should be rejected"
            );
        }

        // Right shape, impossible date
        assert!(LocalDateTime::parse("2020-13-01 23:59:00").is_err());
        assert!(LocalDateTime::parse("2020-02-30 00:00:00").is_err());
        assert_eq!(LocalDateTime::parse("2020-12-01 00:00:00").unwrap(), at(0, 0, 0));
    }

    #[test]
    fn test_wrong_param_types_fail_decoding() {
        assert!(Event::from_json(br#"{"param_int":"zero"}"#).is_err());
        assert!(Event::from_json(br#"{"param_str":42}"#).is_err());
        assert!(Event::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_enrich_overwrites_client_supplied_fields() {
        let body = r#"{"device_id":"x","ip":"10.9.9.9","server_time":"1999-01-01 00:00:00"}"#;
        let event = Event::from_json(body.as_bytes()).unwrap();
        let now = at(12, 0, 0);

        let enriched = event.enrich(Some("192.168.1.20:53211".parse().unwrap()), now);

        assert_eq!(enriched.ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(enriched.server_time, now);
        assert_eq!(enriched.device_id, "x");

        let unknown_peer = enriched.enrich(None, now);
        assert!(unknown_peer.ip.is_none());
    }

    #[test]
    fn test_ip_v4_conversion() {
        let mut event = Event { ip: Some("203.0.113.7".to_string()), ..Default::default() };
        assert_eq!(event.ip_v4(), Some(Ipv4Addr::new(203, 0, 113, 7)));

        event.ip = Some("::ffff:203.0.113.7".to_string());
        assert_eq!(event.ip_v4(), Some(Ipv4Addr::new(203, 0, 113, 7)));

        event.ip = Some("2001:db8::1".to_string());
        assert_eq!(event.ip_v4(), None);

        event.ip = Some("not-an-ip".to_string());
        assert_eq!(event.ip_v4(), None);

        event.ip = None;
        assert_eq!(event.ip_v4(), None);
    }

    #[test]
    fn test_now_has_second_precision() {
        let now = LocalDateTime::now();
        assert_eq!(now.as_naive().unwrap().nanosecond(), 0);
        assert!(now.unix_seconds() > 0);
        assert_eq!(LocalDateTime::ZERO.unix_seconds(), 0);
        assert_eq!(at(0, 0, 0).unix_seconds(), 1_606_780_800);
    }
}

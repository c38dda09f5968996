//! Field codec (C2): type-directed encode/decode between the wire's NUL
//! split text fields and typed Rust values.
//!
//! A [`FieldCursor`] wraps the field list produced by `wire::read_frame`
//! plus the protocol/message version context needed to evaluate gates.
//! Encoding is the mirror image: an [`OutgoingFields`] builder that
//! appends encoded bytes, honoring the same two protocol-version gates.

use crate::error::ProtocolError;

/// Sentinel the gateway uses on the wire for an absent `i32` value.
pub const INT32_UNSET: i32 = i32::MAX;
/// Sentinel the gateway uses on the wire for an absent `f64` value.
pub const DOUBLE_UNSET: f64 = 1.7976931348623157e+308;

/// The four optional bounds that gate a single field's read or write.
/// Protocol-version bounds are inclusive-lower, exclusive-upper; message-
/// version bounds follow the same convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gates {
    pub min_protocol_version: Option<i32>,
    pub max_protocol_version: Option<i32>,
    pub min_message_version: Option<i32>,
    pub max_message_version: Option<i32>,
}

impl Gates {
    pub const NONE: Gates = Gates {
        min_protocol_version: None,
        max_protocol_version: None,
        min_message_version: None,
        max_message_version: None,
    };

    pub fn min_protocol(min_protocol_version: i32) -> Self {
        Gates {
            min_protocol_version: Some(min_protocol_version),
            ..Gates::NONE
        }
    }

    fn allows(&self, protocol_version: i32, message_version: i32) -> bool {
        if let Some(min) = self.min_protocol_version {
            if protocol_version < min {
                return false;
            }
        }
        if let Some(max) = self.max_protocol_version {
            if protocol_version >= max {
                return false;
            }
        }
        if let Some(min) = self.min_message_version {
            if message_version < min {
                return false;
            }
        }
        if let Some(max) = self.max_message_version {
            if message_version >= max {
                return false;
            }
        }
        true
    }
}

/// A read cursor over one decoded frame's fields.
pub struct FieldCursor<'a> {
    fields: &'a [String],
    idx: usize,
    protocol_version: i32,
    message_version: i32,
}

impl<'a> FieldCursor<'a> {
    pub fn new(fields: &'a [String], protocol_version: i32, message_version: i32) -> Self {
        Self {
            fields,
            idx: 0,
            protocol_version,
            message_version,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.idx >= self.fields.len()
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    pub fn message_version(&self) -> i32 {
        self.message_version
    }

    /// Look at the current field's raw text without advancing the cursor.
    /// Used by the instrument registry to canonicalize on contract id
    /// before the rest of an instrument is decoded.
    pub fn peek_raw(&self) -> Result<&'a str, ProtocolError> {
        self.fields
            .get(self.idx)
            .map(String::as_str)
            .ok_or(ProtocolError::NotEnoughFields {
                expected: self.idx + 1,
                found: self.fields.len(),
            })
    }

    fn next_raw(&mut self) -> Result<&'a str, ProtocolError> {
        let text = self.peek_raw()?;
        self.idx += 1;
        Ok(text)
    }

    /// Raw string field: always consumed verbatim, including empty.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        Ok(self.next_raw()?.to_string())
    }

    /// Gated raw string read. A failed gate consumes nothing and returns
    /// `default`.
    pub fn read_string_gated(
        &mut self,
        gates: Gates,
        default: String,
    ) -> Result<String, ProtocolError> {
        if !gates.allows(self.protocol_version, self.message_version) {
            return Ok(default);
        }
        self.read_string()
    }

    /// Integer field. Empty text or the `INT32_UNSET` sentinel decode as
    /// `None`.
    pub fn read_i32(&mut self) -> Result<Option<i32>, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(None);
        }
        let value: i32 = text
            .parse()
            .map_err(|_| ProtocolError::BadInteger(text.to_string()))?;
        if value == INT32_UNSET {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    pub fn read_i32_gated(&mut self, gates: Gates) -> Result<Option<i32>, ProtocolError> {
        if !gates.allows(self.protocol_version, self.message_version) {
            return Ok(None);
        }
        self.read_i32()
    }

    /// Request id: a plain integer, never gated, never unset.
    pub fn read_request_id(&mut self) -> Result<i32, ProtocolError> {
        let text = self.next_raw()?;
        text.parse()
            .map_err(|_| ProtocolError::BadInteger(text.to_string()))
    }

    /// Floating point field. Empty text or the `DOUBLE_UNSET` sentinel
    /// decode as `None`.
    pub fn read_f64(&mut self) -> Result<Option<f64>, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(None);
        }
        let value: f64 = text
            .parse()
            .map_err(|_| ProtocolError::BadFloat(text.to_string()))?;
        if value == DOUBLE_UNSET {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    pub fn read_f64_gated(&mut self, gates: Gates) -> Result<Option<f64>, ProtocolError> {
        if !gates.allows(self.protocol_version, self.message_version) {
            return Ok(None);
        }
        self.read_f64()
    }

    /// Boolean field: wire text is parsed as an integer and compared to
    /// zero. Empty text decodes as `None`.
    pub fn read_bool(&mut self) -> Result<Option<bool>, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(None);
        }
        let value: i64 = text
            .parse()
            .map_err(|_| ProtocolError::BadInteger(text.to_string()))?;
        Ok(Some(value != 0))
    }

    pub fn read_bool_gated(&mut self, gates: Gates) -> Result<Option<bool>, ProtocolError> {
        if !gates.allows(self.protocol_version, self.message_version) {
            return Ok(None);
        }
        self.read_bool()
    }

    /// Date field: `YYYYMMDD`. Empty text decodes as `None`.
    pub fn read_date(&mut self) -> Result<Option<chrono::NaiveDate>, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(None);
        }
        chrono::NaiveDate::parse_from_str(text, "%Y%m%d")
            .map(Some)
            .map_err(|_| ProtocolError::UnsupportedFieldType)
    }

    /// Date-time field: `YYYYMMDD  HH:MM:SS` with an optional trailing
    /// time-zone token, which is returned alongside the parsed value
    /// since the codec has no timezone database to resolve it against.
    /// Empty text decodes as `None`.
    pub fn read_date_time(
        &mut self,
    ) -> Result<Option<(chrono::NaiveDateTime, Option<String>)>, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(None);
        }
        let mut parts = text.split_whitespace();
        let date = parts.next().ok_or(ProtocolError::UnsupportedFieldType)?;
        let time = parts.next().ok_or(ProtocolError::UnsupportedFieldType)?;
        let tz = parts.next().map(str::to_string);
        let combined = format!("{date} {time}");
        let parsed = chrono::NaiveDateTime::parse_from_str(&combined, "%Y%m%d %H:%M:%S")
            .map_err(|_| ProtocolError::UnsupportedFieldType)?;
        Ok(Some((parsed, tz)))
    }

    /// Enumeration read with a caller-supplied text/int resolver.
    /// Tries a direct text match, then an integer match, then falls back
    /// to the raw string via `fallback`.
    pub fn read_enum<T>(
        &mut self,
        from_text: impl Fn(&str) -> Option<T>,
        from_int: impl Fn(i32) -> Option<T>,
        fallback: impl Fn(String) -> T,
    ) -> Result<T, ProtocolError> {
        let text = self.next_raw()?.to_string();
        if let Some(value) = from_text(&text) {
            return Ok(value);
        }
        if let Ok(as_int) = text.parse::<i32>() {
            if let Some(value) = from_int(as_int) {
                return Ok(value);
            }
        }
        Ok(fallback(text))
    }

    /// Homogeneous list: a leading count, then that many elements decoded
    /// by `read_one`.
    pub fn read_list<T>(
        &mut self,
        mut read_one: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<Vec<T>, ProtocolError> {
        let count = self.read_count()?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read_one(self)?);
        }
        Ok(out)
    }

    /// Homogeneous map: a leading count, then that many (key, value)
    /// pairs. Returned as a `Vec` so callers preserve wire insertion
    /// order; the gateway treats these as ordered key/value lists, not
    /// hash maps.
    pub fn read_ordered_map<K, V>(
        &mut self,
        mut read_key: impl FnMut(&mut Self) -> Result<K, ProtocolError>,
        mut read_value: impl FnMut(&mut Self) -> Result<V, ProtocolError>,
    ) -> Result<Vec<(K, V)>, ProtocolError> {
        let count = self.read_count()?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_key(self)?;
            let value = read_value(self)?;
            out.push((key, value));
        }
        Ok(out)
    }

    fn read_count(&mut self) -> Result<usize, ProtocolError> {
        let text = self.next_raw()?;
        if text.is_empty() {
            return Ok(0);
        }
        text.parse()
            .map_err(|_| ProtocolError::BadCount(text.to_string()))
    }
}

/// An ordered key/value list, preserving wire insertion order. A thin
/// alias rather than a wrapper type: callers index it the way they
/// would a small association list, never by hash lookup.
pub type OrderedMap<K, V> = Vec<(K, V)>;

/// Accumulates encoded field bytes for one outgoing frame.
#[derive(Debug, Default)]
pub struct OutgoingFields {
    fields: Vec<Vec<u8>>,
    protocol_version: i32,
}

impl OutgoingFields {
    pub fn new(protocol_version: i32) -> Self {
        Self {
            fields: Vec::new(),
            protocol_version,
        }
    }

    pub fn into_bytes(self) -> Vec<Vec<u8>> {
        self.fields
    }

    pub fn push_raw(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.fields.push(bytes);
        self
    }

    pub fn push_string(&mut self, value: impl AsRef<str>) -> &mut Self {
        self.push_raw(value.as_ref().as_bytes().to_vec())
    }

    pub fn push_i32(&mut self, value: i32) -> &mut Self {
        self.push_string(value.to_string())
    }

    /// Absent becomes an empty field, per the optional/nullable rule.
    pub fn push_i32_opt(&mut self, value: Option<i32>) -> &mut Self {
        match value {
            Some(v) => self.push_i32(v),
            None => self.push_raw(Vec::new()),
        }
    }

    pub fn push_f64(&mut self, value: f64) -> &mut Self {
        self.push_string(format!("{}", value))
    }

    pub fn push_f64_opt(&mut self, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.push_f64(v),
            None => self.push_raw(Vec::new()),
        }
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push_raw(if value { b"1".to_vec() } else { b"0".to_vec() })
    }

    pub fn push_date(&mut self, value: chrono::NaiveDate) -> &mut Self {
        self.push_string(value.format("%Y%m%d").to_string())
    }

    pub fn push_list<T>(&mut self, values: &[T], mut push_one: impl FnMut(&mut Self, &T)) -> &mut Self {
        self.push_i32(values.len() as i32);
        for value in values {
            push_one(self, value);
        }
        self
    }

    /// Appends `fields` only if the gate passes; a failed gate appends
    /// nothing, matching `OutgoingMessage.add` in the source this was
    /// ported from.
    pub fn push_gated(
        &mut self,
        gates: Gates,
        mut push_fields: impl FnMut(&mut Self),
    ) -> &mut Self {
        // A write gate only ever evaluates protocol-version bounds; there
        // is no outgoing "message version" to compare against, so pass
        // the protocol version on both sides of the gate check.
        if gates.allows(self.protocol_version, self.protocol_version) {
            push_fields(self);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(fields: &[&str], protocol_version: i32, message_version: i32) -> FieldCursor<'_> {
        // Leaked only for the lifetime of the test; fine for unit tests.
        let owned: &'static [String] = Box::leak(
            fields
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        );
        FieldCursor::new(owned, protocol_version, message_version)
    }

    #[test]
    fn int_sentinel_decodes_as_unset() {
        let mut c = cursor(&["2147483647", "", "7"], 150, 1);
        assert_eq!(c.read_i32().unwrap(), None);
        assert_eq!(c.read_i32().unwrap(), None);
        assert_eq!(c.read_i32().unwrap(), Some(7));
    }

    #[test]
    fn float_sentinel_decodes_as_unset() {
        let mut c = cursor(&["1.7976931348623157e+308", "", "3.5"], 150, 1);
        assert_eq!(c.read_f64().unwrap(), None);
        assert_eq!(c.read_f64().unwrap(), None);
        assert_eq!(c.read_f64().unwrap(), Some(3.5));
    }

    #[test]
    fn bool_parses_as_int_compared_to_zero() {
        let mut c = cursor(&["0", "1", "2"], 150, 1);
        assert_eq!(c.read_bool().unwrap(), Some(false));
        assert_eq!(c.read_bool().unwrap(), Some(true));
        assert_eq!(c.read_bool().unwrap(), Some(true));
    }

    #[test]
    fn gate_failure_consumes_nothing_and_returns_default() {
        let mut c = cursor(&["42"], 100, 1);
        let gated = c.read_i32_gated(Gates::min_protocol(200)).unwrap();
        assert_eq!(gated, None);
        // Cursor did not advance: the same field is still readable.
        assert_eq!(c.read_i32().unwrap(), Some(42));
    }

    #[test]
    fn peek_does_not_advance() {
        let mut c = cursor(&["42", "7"], 100, 1);
        assert_eq!(c.peek_raw().unwrap(), "42");
        assert_eq!(c.peek_raw().unwrap(), "42");
        assert_eq!(c.read_i32().unwrap(), Some(42));
        assert_eq!(c.read_i32().unwrap(), Some(7));
    }

    #[test]
    fn list_reads_count_then_elements() {
        let mut c = cursor(&["3", "a", "b", "c"], 100, 1);
        let values = c.read_list(|c| c.read_string()).unwrap();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_count_field_is_zero_elements() {
        let mut c = cursor(&[""], 100, 1);
        let values: Vec<String> = c.read_list(|c| c.read_string()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut c = cursor(&["2", "k1", "v1", "k2", "v2"], 100, 1);
        let map = c
            .read_ordered_map(|c| c.read_string(), |c| c.read_string())
            .unwrap();
        assert_eq!(
            map,
            vec![("k1".to_string(), "v1".to_string()), ("k2".to_string(), "v2".to_string())]
        );
    }

    #[test]
    fn date_parses_yyyymmdd() {
        let mut c = cursor(&["20240115", ""], 100, 1);
        assert_eq!(
            c.read_date().unwrap(),
            Some(chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(c.read_date().unwrap(), None);
    }

    #[test]
    fn date_time_splits_optional_timezone() {
        let mut c = cursor(&["20240115  09:30:00 US/Eastern", "20240115  09:30:00"], 100, 1);
        let (dt, tz) = c.read_date_time().unwrap().unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 09:30:00");
        assert_eq!(tz.as_deref(), Some("US/Eastern"));

        let (dt2, tz2) = c.read_date_time().unwrap().unwrap();
        assert_eq!(dt2.to_string(), "2024-01-15 09:30:00");
        assert_eq!(tz2, None);
    }

    #[test]
    fn enum_falls_back_to_text_then_int_then_raw() {
        #[derive(Debug, PartialEq)]
        enum Side {
            Buy,
            Sell,
            Unknown(String),
        }
        let from_text = |t: &str| match t {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        };
        let from_int = |i: i32| match i {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        };

        let mut c = cursor(&["BUY", "1", "SHORT"], 100, 1);
        assert_eq!(
            c.read_enum(from_text, from_int, |s| Side::Unknown(s)).unwrap(),
            Side::Buy
        );
        assert_eq!(
            c.read_enum(from_text, from_int, |s| Side::Unknown(s)).unwrap(),
            Side::Sell
        );
        assert_eq!(
            c.read_enum(from_text, from_int, |s| Side::Unknown(s)).unwrap(),
            Side::Unknown("SHORT".to_string())
        );
    }

    #[test]
    fn write_gate_appends_nothing_on_failure() {
        let mut out = OutgoingFields::new(100);
        out.push_gated(Gates::min_protocol(200), |o| {
            o.push_i32(1);
        });
        assert!(out.into_bytes().is_empty());
    }

    #[test]
    fn write_gate_appends_when_met() {
        let mut out = OutgoingFields::new(200);
        out.push_gated(Gates::min_protocol(200), |o| {
            o.push_i32(1);
        });
        assert_eq!(out.into_bytes(), vec![b"1".to_vec()]);
    }
}

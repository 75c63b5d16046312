//! # Owned Values and Data Types
//!
//! The `DataType` discriminant and the owned `Value` enum used for table
//! cells, query constants and evaluation results. Values carry everything the
//! comparison layer needs: cross-numeric ordering, case-aware string
//! equality, and a total order for sort/distinct processing.
//!
//! ## Comparability
//!
//! Two typed values are comparable when `DataType::are_comparable` says so:
//! the numeric family (`Int`, `Float`, `Double`, `Decimal`) compares across
//! member types, `String` and `Binary` compare byte-wise with each other, and
//! every remaining type only compares with itself.
//!
//! ## Timestamps
//!
//! `Timestamp` stores seconds since the epoch plus a nanosecond part. The two
//! components must agree in sign (both non-negative or both non-positive);
//! the constructor rejects anything else. The ordering derives from the pair,
//! which is correct exactly because of the sign rule.

use eyre::{bail, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

use crate::error::CoreError;

/// Canonical column/value type discriminant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int = 0,
    Bool = 1,
    String = 2,
    Binary = 3,
    Timestamp = 4,
    Float = 5,
    Double = 6,
    Decimal = 7,
    ObjectId = 8,
    Uuid = 9,
    Link = 10,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Bool => "bool",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Timestamp => "timestamp",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Decimal => "decimal",
            DataType::ObjectId => "objectId",
            DataType::Uuid => "uuid",
            DataType::Link => "link",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::Double | DataType::Decimal
        )
    }

    /// Whether values of the two types can meaningfully be compared.
    pub fn are_comparable(a: DataType, b: DataType) -> bool {
        if a == b {
            return true;
        }
        if a.is_numeric() && b.is_numeric() {
            return true;
        }
        matches!(
            (a, b),
            (DataType::String, DataType::Binary) | (DataType::Binary, DataType::String)
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable per-table object key. Zero is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjKey(pub u64);

/// Seconds since the Unix epoch plus a nanosecond remainder, with consistent
/// signs across the two parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanoseconds: i32) -> Result<Self> {
        let both_non_negative = seconds >= 0 && nanoseconds >= 0;
        let both_non_positive = seconds <= 0 && nanoseconds <= 0;
        if !(both_non_negative || both_non_positive) {
            bail!(CoreError::Type("Invalid timestamp format".into()));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> i32 {
        self.nanoseconds
    }

    /// Parses the two literal timestamp forms of the query language:
    /// `Tseconds:nanoseconds` and `YYYY-MM-DD{T|@}HH:MM:SS[:NANOS]`.
    pub fn parse(text: &str) -> Result<Self> {
        if let Some(rest) = text.strip_prefix('T') {
            if rest.contains(':') {
                let (sec_str, nano_str) = rest.split_once(':').unwrap();
                let seconds: i64 = sec_str
                    .parse()
                    .map_err(|_| CoreError::Type(format!("Invalid timestamp '{}'", text)))?;
                let nanoseconds: i32 = nano_str
                    .parse()
                    .map_err(|_| CoreError::Type(format!("Invalid timestamp '{}'", text)))?;
                return Timestamp::new(seconds, nanoseconds);
            }
        }
        Self::parse_readable(text)
    }

    fn parse_readable(text: &str) -> Result<Self> {
        let sep = if text.contains('@') { '@' } else { 'T' };
        let (date_str, time_str) = text
            .split_once(sep)
            .ok_or_else(|| CoreError::Type(format!("Invalid timestamp '{}'", text)))?;

        let date: Vec<&str> = date_str.split('-').collect();
        let time: Vec<&str> = time_str.split(':').collect();
        if date.len() != 3 || !(time.len() == 3 || time.len() == 4) {
            bail!(CoreError::Type(format!("Invalid timestamp '{}'", text)));
        }

        let field = |s: &str| -> Result<i64> {
            s.parse::<i64>()
                .map_err(|_| CoreError::Type(format!("Invalid timestamp '{}'", text)).into())
        };
        let year = field(date[0])?;
        let month = field(date[1])?;
        let day = field(date[2])?;
        let hour = field(time[0])?;
        let minute = field(time[1])?;
        let second = field(time[2])?;
        let mut nanoseconds = if time.len() == 4 {
            field(time[3])? as i32
        } else {
            0
        };

        if year < 1900 {
            bail!(CoreError::Type(
                "Conversion of dates before 1900 is not supported.".into()
            ));
        }
        if nanoseconds < 0 {
            bail!(CoreError::Type(
                "The nanoseconds of a Timestamp cannot be negative.".into()
            ));
        }
        if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year as i32, month as u32) as i64
        {
            bail!(CoreError::Type(format!("Invalid timestamp '{}'", text)));
        }

        let days = days_since_epoch(year as i32, month as u32, day as u32) as i64;
        let seconds = days * 86_400 + hour * 3_600 + minute * 60 + second;
        // seconds determines the sign of the nanoseconds part
        if seconds < 0 {
            nanoseconds = -nanoseconds;
        }
        Timestamp::new(seconds, nanoseconds)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

fn days_since_epoch(year: i32, month: u32, day: u32) -> i32 {
    let mut days: i32 = 0;

    if year >= 1970 {
        for y in 1970..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
    } else {
        for y in year..1970 {
            days -= if is_leap_year(y) { 366 } else { 365 };
        }
    }

    for m in 1..month {
        days += days_in_month(year, m) as i32;
    }

    days + day as i32 - 1
}

/// 12-byte object identifier, written as 24 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let bytes = parse_hex_fixed::<12>(text)
            .ok_or_else(|| CoreError::Type(format!("Invalid object id '{}'", text)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// 16-byte UUID, accepted with or without dashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid([u8; 16]);

impl Uuid {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let compact: String = text.chars().filter(|c| *c != '-').collect();
        let bytes = parse_hex_fixed::<16>(&compact)
            .ok_or_else(|| CoreError::Type(format!("Invalid UUID '{}'", text)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        for (i, byte) in b.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

fn parse_hex_fixed<const N: usize>(text: &str) -> Option<[u8; N]> {
    if text.len() != N * 2 || !text.is_ascii() {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

/// Decodes a base64 payload; `None` on any malformed input.
pub fn decode_base64(text: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let bytes = text.as_bytes();
    if !bytes.len().is_multiple_of(4) {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
    let mut chunks = bytes.chunks_exact(4);
    for chunk in &mut chunks {
        let pad = chunk.iter().rev().take_while(|&&c| c == b'=').count();
        if pad > 2 {
            return None;
        }
        let mut acc: u32 = 0;
        for (i, &c) in chunk.iter().enumerate() {
            let v = if c == b'=' && i >= 4 - pad {
                0
            } else {
                value(c)? as u32
            };
            acc = (acc << 6) | v;
        }
        out.push((acc >> 16) as u8);
        if pad < 2 {
            out.push((acc >> 8) as u8);
        }
        if pad < 1 {
            out.push(acc as u8);
        }
    }
    if !chunks.remainder().is_empty() {
        return None;
    }
    Some(out)
}

/// Owned runtime value: one variant per `DataType`, plus `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    String(String),
    Binary(Vec<u8>),
    Timestamp(Timestamp),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    ObjectId(ObjectId),
    Uuid(Uuid),
    Link(ObjKey),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type of the value, or `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Int),
            Value::Bool(_) => Some(DataType::Bool),
            Value::String(_) => Some(DataType::String),
            Value::Binary(_) => Some(DataType::Binary),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Float(_) => Some(DataType::Float),
            Value::Double(_) => Some(DataType::Double),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::ObjectId(_) => Some(DataType::ObjectId),
            Value::Uuid(_) => Some(DataType::Uuid),
            Value::Link(_) => Some(DataType::Link),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Ordering between two non-null values of comparable types. `None` when
    /// the types are incomparable or a float comparison involves NaN.
    pub fn partial_cmp_with(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Binary(a), Binary(b)) => Some(a.cmp(b)),
            (String(a), Binary(b)) => Some(a.as_bytes().cmp(&b[..])),
            (Binary(a), String(b)) => Some(a[..].cmp(b.as_bytes())),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (ObjectId(a), ObjectId(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (Link(a), Link(b)) => Some(a.cmp(b)),
            (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Total order used by sort and distinct: null sorts first, numeric types
    /// compare across each other, NaN sorts after every other number.
    pub fn cmp_for_sort(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ord) = self.partial_cmp_with(other) {
            return ord;
        }
        // NaN on either side, or incomparable types: fall back to a stable
        // discriminant order so the sort stays total.
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => Ordering::Equal,
            },
            _ => {
                let da = self.data_type().map(|t| t as u8).unwrap_or(u8::MAX);
                let db = other.data_type().map(|t| t as u8).unwrap_or(u8::MAX);
                da.cmp(&db)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_types_are_mutually_comparable() {
        assert!(DataType::are_comparable(DataType::Int, DataType::Double));
        assert!(DataType::are_comparable(DataType::Float, DataType::Decimal));
        assert!(DataType::are_comparable(DataType::String, DataType::Binary));
        assert!(!DataType::are_comparable(DataType::Int, DataType::String));
        assert!(!DataType::are_comparable(DataType::Uuid, DataType::Timestamp));
    }

    #[test]
    fn timestamp_rejects_mixed_signs() {
        assert!(Timestamp::new(5, -1).is_err());
        assert!(Timestamp::new(-5, 1).is_err());
        assert!(Timestamp::new(5, 1).is_ok());
        assert!(Timestamp::new(-5, -1).is_ok());
        assert!(Timestamp::new(0, 0).is_ok());
    }

    #[test]
    fn timestamp_parse_raw_form() {
        let ts = Timestamp::parse("T1234:567").unwrap();
        assert_eq!(ts.seconds(), 1234);
        assert_eq!(ts.nanoseconds(), 567);

        let ts = Timestamp::parse("T-1234:-567").unwrap();
        assert_eq!(ts.seconds(), -1234);
        assert_eq!(ts.nanoseconds(), -567);
    }

    #[test]
    fn timestamp_parse_readable_form() {
        let ts = Timestamp::parse("1970-01-01T00:00:00").unwrap();
        assert_eq!(ts.seconds(), 0);
        assert_eq!(ts.nanoseconds(), 0);

        let ts = Timestamp::parse("2024-01-15@13:45:30").unwrap();
        assert_eq!(ts.seconds(), 19737 * 86_400 + 13 * 3_600 + 45 * 60 + 30);

        let ts = Timestamp::parse("2024-01-15T13:45:30:123").unwrap();
        assert_eq!(ts.nanoseconds(), 123);
    }

    #[test]
    fn timestamp_parse_rejects_pre_1900() {
        let err = Timestamp::parse("1899-12-31T23:59:59").unwrap_err();
        assert!(err.to_string().contains("1900"));
    }

    #[test]
    fn timestamp_parse_rejects_negative_nanos() {
        assert!(Timestamp::parse("2024-01-15T13:45:30:-5").is_err());
    }

    #[test]
    fn timestamp_before_epoch_negates_nanos() {
        let ts = Timestamp::parse("1969-12-31T00:00:00:500").unwrap();
        assert!(ts.seconds() < 0);
        assert_eq!(ts.nanoseconds(), -500);
    }

    #[test]
    fn uuid_parse_with_and_without_dashes() {
        let a = Uuid::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let b = Uuid::parse("550e8400e29b41d4a716446655440000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn uuid_parse_rejects_bad_length() {
        assert!(Uuid::parse("550e8400").is_err());
    }

    #[test]
    fn object_id_round_trips_through_hex() {
        let text = "6181253f0b5e9e2a42d06fdb";
        let oid = ObjectId::parse(text).unwrap();
        assert_eq!(oid.to_string(), text);
    }

    #[test]
    fn base64_decodes_padded_payloads() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("Zm9v").unwrap(), b"foo");
        assert_eq!(decode_base64("").unwrap(), Vec::<u8>::new());
        assert!(decode_base64("a!!!").is_none());
    }

    #[test]
    fn cross_numeric_ordering() {
        let one = Value::Int(1);
        let one_and_half = Value::Double(1.5);
        assert_eq!(
            one.partial_cmp_with(&one_and_half),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float(2.0).partial_cmp_with(&Value::Int(2)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn sort_order_puts_nulls_first_and_nan_last() {
        assert_eq!(
            Value::Null.cmp_for_sort(&Value::Int(0)),
            Ordering::Less
        );
        assert_eq!(
            Value::Double(f64::NAN).cmp_for_sort(&Value::Double(1.0)),
            Ordering::Greater
        );
    }
}

//! Value types shared by the engine: timestamps, fixed-precision quantities
//! and token references.
use super::error::ValidationError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// Largest precision (in bits) a [`Quantity`] can be configured with.
pub const MAX_PRECISION: u64 = 64;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(TimeStamp)
    }
    /// Shifts the timestamp by a signed number of seconds, saturating at the
    /// representable range.
    pub fn offset_secs(&self, secs: i64) -> Self {
        let shifted = self
            .0
            .checked_add_signed(Duration::seconds(secs))
            .unwrap_or(self.0);
        Self(shifted)
    }
    pub fn is_before(&self, other: &TimeStamp<Utc>) -> bool {
        self.0 < other.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Unsigned integer bounded by `2^precision - 1`.
///
/// Quantities travel as strings on the wire, either decimal or `0x`-prefixed
/// hexadecimal. Arithmetic is checked against the precision so that a sum of
/// valid quantities can never silently wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    value: u128,
    precision: u64,
}

impl Quantity {
    pub fn zero(precision: u64) -> Self {
        Self {
            value: 0,
            precision,
        }
    }

    pub fn from_u64(value: u64, precision: u64) -> Result<Self, ValidationError> {
        Self::bounded(value as u128, precision)
    }

    pub fn parse(raw: &str, precision: u64) -> Result<Self, ValidationError> {
        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex_digits) => u128::from_str_radix(hex_digits, 16),
            None => raw.parse::<u128>(),
        };
        let value = parsed.map_err(|e| {
            ValidationError::InvalidQuantity(format!("failed parsing quantity [{raw}]: {e}"))
        })?;
        Self::bounded(value, precision)
    }

    fn bounded(value: u128, precision: u64) -> Result<Self, ValidationError> {
        if precision == 0 || precision > MAX_PRECISION {
            return Err(ValidationError::InvalidQuantity(format!(
                "invalid precision [{precision}], expected 1..={MAX_PRECISION}"
            )));
        }
        if value >> precision != 0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "quantity [{value}] exceeds precision [{precision}]"
            )));
        }
        Ok(Self { value, precision })
    }

    pub fn checked_add(self, other: Quantity) -> Result<Self, ValidationError> {
        if self.precision != other.precision {
            return Err(ValidationError::InvalidQuantity(format!(
                "precision mismatch [{}]!=[{}]",
                self.precision, other.precision
            )));
        }
        let sum = self.value.checked_add(other.value).ok_or_else(|| {
            ValidationError::InvalidQuantity("quantity addition overflow".to_string())
        })?;
        Self::bounded(sum, self.precision)
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn precision(&self) -> u64 {
        self.precision
    }

    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Reference to a token committed on the ledger: the transaction that
/// created it and its position among that transaction's outputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
pub struct TokenId {
    #[n(0)]
    pub tx_id: String,
    #[n(1)]
    pub index: u64,
}

impl TokenId {
    pub fn new(tx_id: impl Into<String>, index: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }
    /// Ledger key of the token, also used to derive per-input metadata keys.
    pub fn key(&self) -> String {
        format!("{}.{}", self.tx_id, self.index)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.tx_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamp_offset_and_ordering() {
        let now = TimeStamp::from_unix(1_700_000_000).unwrap();
        let earlier = now.offset_secs(-1);

        assert!(earlier.is_before(&now));
        assert!(!now.is_before(&earlier));
        assert!(!now.is_before(&now));
    }

    #[test]
    fn quantity_parses_decimal_and_hex() {
        assert_eq!(Quantity::parse("10", 64).unwrap().value(), 10);
        assert_eq!(Quantity::parse("0x0a", 64).unwrap().value(), 10);
        assert_eq!(Quantity::parse("0XFF", 64).unwrap().value(), 255);
        assert!(Quantity::parse("ten", 64).is_err());
        assert!(Quantity::parse("", 64).is_err());
    }

    #[test]
    fn quantity_respects_precision() {
        assert!(Quantity::parse("255", 8).is_ok());
        assert!(Quantity::parse("256", 8).is_err());
        assert!(Quantity::parse("1", 0).is_err());
        assert!(Quantity::parse("1", 65).is_err());

        let max = Quantity::from_u64(u64::MAX, 64).unwrap();
        assert_eq!(max.to_hex(), "0xffffffffffffffff");
    }

    #[test]
    fn quantity_addition_is_checked() {
        let a = Quantity::parse("200", 8).unwrap();
        let b = Quantity::parse("55", 8).unwrap();
        assert_eq!(a.checked_add(b).unwrap().value(), 255);

        let c = Quantity::parse("56", 8).unwrap();
        assert!(a.checked_add(c).is_err());

        let other = Quantity::parse("1", 16).unwrap();
        assert!(a.checked_add(other).is_err());
    }

    #[test]
    fn token_id_key() {
        let id = TokenId::new("tx1", 3);
        assert_eq!(id.key(), "tx1.3");
        assert_eq!(id.to_string(), "[tx1:3]");
    }
}

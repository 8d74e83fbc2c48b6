use derive_more::Display;
use std::{fmt, str::FromStr};

pub const OBJECT_ID_BYTES: usize = 12;

///
/// Double
///
/// IEEE-754 double compared by bit pattern, so NaN equals itself and
/// `-0.0` stays distinct from `0.0`. NaN payloads are canonicalized on
/// construction so every NaN shares one bit pattern.
///

#[derive(Clone, Copy, Display)]
#[display("{_0}")]
pub struct Double(f64);

impl Double {
    #[must_use]
    pub const fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(f64::NAN)
        } else {
            Self(value)
        }
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl fmt::Debug for Double {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Double({:?})", self.0)
    }
}

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Double {}

impl From<f64> for Double {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

///
/// ObjectId
///
/// Twelve opaque bytes, rendered as lower-case hex.
///

#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId([u8; OBJECT_ID_BYTES]);

impl ObjectId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_BYTES]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_BYTES] {
        &self.0
    }

    /// Build an id from a byte slice of exactly twelve bytes.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; OBJECT_ID_BYTES]>::try_from(bytes).ok().map(Self)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; OBJECT_ID_BYTES];
        hex::decode_to_slice(s, &mut bytes)?;

        Ok(Self(bytes))
    }
}

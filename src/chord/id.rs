use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ChordError;

/// Width of the widest supported ring, matching the SHA-256 digest.
pub const MAX_ID_BITS: u32 = 256;
pub const ID_BYTES: usize = 32;

/// A position on the ring, stored big-endian so that byte order is numeric order.
///
/// Values are only meaningful relative to the [`IdentifierSpace`] that produced them;
/// every constructor that takes arbitrary input goes through [`IdentifierSpace::reduce`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identifier([u8; ID_BYTES]);

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Small rings would otherwise print 64 leading zeros
        let first = self.0.iter().position(|b| *b != 0).unwrap_or(ID_BYTES - 1);
        write!(f, "0x{}", hex::encode(&self.0[first..]))
    }
}

impl Identifier {
    pub fn from_u64(value: u64) -> Self {
        let mut id = [0u8; ID_BYTES];
        id[ID_BYTES - 8..].copy_from_slice(&value.to_be_bytes());
        Identifier(id)
    }

    /// Parses a big-endian value of at most 32 bytes, right-aligned.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, ChordError> {
        if bytes.len() > ID_BYTES {
            return Err(ChordError::InvalidRequest(format!(
                "identifier is {} bytes, at most {} allowed",
                bytes.len(),
                ID_BYTES
            )));
        }
        let mut id = [0u8; ID_BYTES];
        id[ID_BYTES - bytes.len()..].copy_from_slice(bytes);
        Ok(Identifier(id))
    }

    pub fn to_bytes(&self) -> [u8; ID_BYTES] {
        self.0
    }

    /// Low 64 bits, for rings narrow enough to enumerate.
    pub fn low_u64(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[ID_BYTES - 8..]);
        u64::from_be_bytes(low)
    }

    fn wrapping_add_power_of_two(&self, k: u32) -> Self {
        let mut out = self.0;
        let mut index = ID_BYTES - 1 - (k / 8) as usize;
        let mut carry = 1u16 << (k % 8);
        loop {
            let sum = out[index] as u16 + carry;
            out[index] = sum as u8;
            carry = sum >> 8;
            if carry == 0 || index == 0 {
                break;
            }
            index -= 1;
        }
        Identifier(out)
    }

    fn wrapping_sub_power_of_two(&self, k: u32) -> Self {
        let mut out = self.0;
        let mut index = ID_BYTES - 1 - (k / 8) as usize;
        let mut borrow = 1i16 << (k % 8);
        loop {
            let diff = out[index] as i16 - borrow;
            if diff < 0 {
                out[index] = (diff + 256) as u8;
                borrow = 1;
            } else {
                out[index] = diff as u8;
                borrow = 0;
            }
            if borrow == 0 || index == 0 {
                break;
            }
            index -= 1;
        }
        Identifier(out)
    }
}

/// The circular m-bit identifier space `[0, 2^m)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierSpace {
    bits: u32,
}

impl IdentifierSpace {
    pub fn new(bits: u32) -> Result<Self, ChordError> {
        if bits == 0 || bits > MAX_ID_BITS {
            return Err(ChordError::InvalidConfig(format!(
                "identifier width must be within 1..={}, got {}",
                MAX_ID_BITS, bits
            )));
        }
        Ok(Self { bits })
    }

    /// m, which is also the number of finger table entries.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn identifier(&self, value: u64) -> Identifier {
        self.reduce(Identifier::from_u64(value))
    }

    /// Takes an identifier modulo 2^m.
    pub fn reduce(&self, id: Identifier) -> Identifier {
        let mut raw = id.0;
        let full = (self.bits / 8) as usize;
        let rem = self.bits % 8;
        for (i, byte) in raw.iter_mut().rev().enumerate() {
            if i < full {
                continue;
            }
            if i == full && rem > 0 {
                *byte &= (1u8 << rem) - 1;
            } else {
                *byte = 0;
            }
        }
        Identifier(raw)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.reduce(*id) == *id
    }

    /// Derives a ring position from arbitrary bytes: SHA-256, read big-endian, mod 2^m.
    pub fn hash(&self, bytes: &[u8]) -> Identifier {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let mut id = [0u8; ID_BYTES];
        id.copy_from_slice(&hasher.finalize());
        self.reduce(Identifier(id))
    }

    /// Node identifier for a `host:port` address.
    pub fn node_id(&self, address: &str) -> Identifier {
        self.hash(address.as_bytes())
    }

    /// `(id + 2^k) mod 2^m`
    pub fn add_power_of_two(&self, id: &Identifier, k: u32) -> Identifier {
        if k >= self.bits {
            // 2^k is a multiple of 2^m
            return *id;
        }
        self.reduce(id.wrapping_add_power_of_two(k))
    }

    /// `(id - 2^k) mod 2^m`
    pub fn sub_power_of_two(&self, id: &Identifier, k: u32) -> Identifier {
        if k >= self.bits {
            return *id;
        }
        self.reduce(id.wrapping_sub_power_of_two(k))
    }

    pub fn successor_id(&self, id: &Identifier) -> Identifier {
        self.add_power_of_two(id, 0)
    }

    /// Start of finger `i` (1-based): `(n + 2^(i-1)) mod 2^m`.
    pub fn finger_start(&self, n: &Identifier, i: usize) -> Identifier {
        self.add_power_of_two(n, i as u32 - 1)
    }

    /// Exclusive end of finger `i`: `(n + 2^i) mod 2^m`.
    pub fn finger_end(&self, n: &Identifier, i: usize) -> Identifier {
        self.add_power_of_two(n, i as u32)
    }
}

/// `id ∈ (start, end]` walking clockwise. `start == end` covers the whole ring.
pub fn in_circular_interval(id: &Identifier, start: &Identifier, end: &Identifier) -> bool {
    if start < end {
        id > start && id <= end
    } else {
        id > start || id <= end
    }
}

/// `id ∈ (start, end)` walking clockwise. `start == end` covers everything but `start`.
pub fn in_open_interval(id: &Identifier, start: &Identifier, end: &Identifier) -> bool {
    in_circular_interval(id, start, end) && id != end
}

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

/// Largest value a single limb holds (`2^53 - 1`).
pub const LIMB_MAX: u64 = (1 << 53) - 1;
const LIMB_BASE: u128 = 1 << 53;

/// Unbounded, monotonically increasing activation counter.
///
/// Stored as little-endian base-2^53 limbs. Every limb stays within
/// [`LIMB_MAX`] and the most significant limb is non-zero unless the value is
/// zero, so structural equality is value equality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ActivationId {
    limbs: Vec<u64>,
}

impl ActivationId {
    pub fn zero() -> Self {
        Self { limbs: vec![0] }
    }

    pub fn new(value: u64) -> Self {
        let high = value >> 53;
        if high == 0 {
            Self { limbs: vec![value] }
        } else {
            Self {
                limbs: vec![value & LIMB_MAX, high],
            }
        }
    }

    /// Add `n` (at most [`LIMB_MAX`]), carrying into new limbs as needed.
    pub fn add(&mut self, n: u64) {
        debug_assert!(n <= LIMB_MAX, "increment must fit in one limb");
        let mut carry = n;
        let mut index = 0;
        loop {
            let limb = self.limbs[index];
            if carry <= LIMB_MAX - limb {
                self.limbs[index] = limb + carry;
                return;
            }
            self.limbs[index] = limb + carry - (LIMB_MAX + 1);
            if index == self.limbs.len() - 1 {
                self.limbs.push(1);
                return;
            }
            carry = 1;
            index += 1;
        }
    }

    pub fn add_one(&mut self) {
        self.add(1);
    }

    /// Full-width comparison, not just the low limb.
    pub fn equal(&self, other: &ActivationId) -> bool {
        self == other
    }

    pub fn limbs(&self) -> &[u64] {
        &self.limbs
    }

    /// The value as `u64`, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        let mut value: u64 = 0;
        for &limb in self.limbs.iter().rev() {
            value = value.checked_mul(LIMB_MAX + 1)?.checked_add(limb)?;
        }
        Some(value)
    }
}

impl Default for ActivationId {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for ActivationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

impl PartialOrd for ActivationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.limbs.as_slice() {
            return write!(f, "{}", single);
        }

        // Repeated division by 10^9, most significant limb first.
        const CHUNK: u128 = 1_000_000_000;
        let mut digits: Vec<u64> = self.limbs.iter().rev().copied().collect();
        let mut chunks: Vec<u32> = Vec::new();
        while digits.iter().any(|&d| d != 0) {
            let mut rem: u128 = 0;
            for digit in digits.iter_mut() {
                let cur = rem * LIMB_BASE + *digit as u128;
                *digit = (cur / CHUNK) as u64;
                rem = cur % CHUNK;
            }
            chunks.push(rem as u32);
        }

        let mut out = String::new();
        for (i, chunk) in chunks.iter().rev().enumerate() {
            if i == 0 {
                out.push_str(&chunk.to_string());
            } else {
                out.push_str(&format!("{:09}", chunk));
            }
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivationId({})", self)
    }
}

impl Serialize for ActivationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values() {
        let mut id = ActivationId::zero();
        assert_eq!(id.to_string(), "0");
        for _ in 0..42 {
            id.add_one();
        }
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.to_u64(), Some(42));
        assert_eq!(id.limbs().len(), 1);
    }

    #[test]
    fn test_carry_past_safe_integer_range() {
        let mut id = ActivationId::zero();
        id.add(LIMB_MAX);
        assert_eq!(id.to_string(), "9007199254740991");
        for _ in 0..6 {
            id.add_one();
        }
        assert_eq!(id.limbs(), &[5, 1]);
        assert_eq!(id.to_string(), "9007199254740997");
        // 2^53 + 5 and 2^53 + 4 collapse to the same f64.
        assert_eq!(9007199254740997u64 as f64, 9007199254740996u64 as f64);
        assert_eq!(id.to_u64(), Some(9007199254740997));
    }

    #[test]
    fn test_equal_compares_every_limb() {
        let mut a = ActivationId::zero();
        let mut b = ActivationId::zero();
        for id in [&mut a, &mut b] {
            id.add(LIMB_MAX);
            id.add(6);
        }
        assert!(a.equal(&b));

        let small = ActivationId::new(5);
        assert!(!a.equal(&small));
        assert_eq!(a.limbs()[0], small.limbs()[0]);
        assert!(small < a);
    }

    #[test]
    fn test_multi_limb_carry_chain() {
        let mut id = ActivationId::zero();
        id.add(LIMB_MAX);
        id.add_one();
        // [0, 1] -> bring low limb to max, then carry.
        id.add(LIMB_MAX);
        id.add_one();
        assert_eq!(id.limbs(), &[0, 2]);
        assert_eq!(id.to_string(), "18014398509481984");

        let big = ActivationId::new(u64::MAX);
        assert_eq!(big.to_string(), u64::MAX.to_string());
        let mut bigger = big.clone();
        bigger.add_one();
        assert_eq!(bigger.to_string(), "18446744073709551616");
        assert_eq!(bigger.to_u64(), None);
        assert!(bigger > big);
    }
}

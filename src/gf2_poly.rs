//! Polynomial arithmetic over GF(2), the two-element field.
//!
//! Coefficients are packed into `u64` limbs (little-endian: bit `i` of limb
//! `j` is the coefficient of `x^(64*j + i)`), so a polynomial of degree below
//! 64 stays in a single machine word and larger ones spill into further limbs
//! without per-bit allocation. Addition is XOR, multiplication and division
//! are schoolbook shift-and-XOR. All operations are total.

/// A polynomial over GF(2).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Gf2Poly {
    limbs: Vec<u64>,
}

const LIMB_BITS: usize = 64;

impl Gf2Poly {
    /// The zero polynomial.
    pub fn zero() -> Self {
        Gf2Poly { limbs: Vec::new() }
    }

    /// The constant polynomial 1.
    pub fn one() -> Self {
        Gf2Poly { limbs: vec![1] }
    }

    /// Whether this is the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    /// Build a polynomial from an MSB-first coefficient vector: the first
    /// entry is the coefficient of `x^(bits.len() - 1)`.
    pub fn from_bits(bits: &[bool]) -> Self {
        let n = bits.len();
        let mut poly = Gf2Poly::zero();
        for (j, &bit) in bits.iter().enumerate() {
            if bit {
                poly.set_bit(n - 1 - j);
            }
        }
        poly
    }

    /// Build a polynomial from a string of `'0'`/`'1'` characters, MSB-first.
    /// Other characters are ignored.
    pub fn from_bit_str(s: &str) -> Self {
        let bits = s
            .chars()
            .filter_map(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect::<Vec<_>>();
        Gf2Poly::from_bits(&bits)
    }

    /// MSB-first coefficient vector of exactly `width` entries, left-padded
    /// with zeros. The degree must be below `width`.
    pub fn to_bits(&self, width: usize) -> Vec<bool> {
        debug_assert!(self.degree().map_or(true, |d| d < width));
        (0..width).rev().map(|i| self.bit(i)).collect()
    }

    /// Degree of the polynomial, or `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        let last = self.limbs.last()?;
        let top = LIMB_BITS - 1 - last.leading_zeros() as usize;
        Some((self.limbs.len() - 1) * LIMB_BITS + top)
    }

    /// Coefficient of `x^i`.
    pub fn bit(&self, i: usize) -> bool {
        self.limbs
            .get(i / LIMB_BITS)
            .map_or(false, |limb| limb >> (i % LIMB_BITS) & 1 == 1)
    }

    fn set_bit(&mut self, i: usize) {
        let limb = i / LIMB_BITS;
        if self.limbs.len() <= limb {
            self.limbs.resize(limb + 1, 0);
        }
        self.limbs[limb] |= 1 << (i % LIMB_BITS);
    }

    fn normalize(&mut self) {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }

    // self ^= other << shift
    fn xor_shifted(&mut self, other: &Gf2Poly, shift: usize) {
        let (limb_shift, bit_shift) = (shift / LIMB_BITS, shift % LIMB_BITS);
        let needed = other.limbs.len() + limb_shift + 1;
        if self.limbs.len() < needed {
            self.limbs.resize(needed, 0);
        }
        for (i, &limb) in other.limbs.iter().enumerate() {
            self.limbs[i + limb_shift] ^= limb << bit_shift;
            if bit_shift > 0 {
                self.limbs[i + limb_shift + 1] ^= limb >> (LIMB_BITS - bit_shift);
            }
        }
        self.normalize();
    }

    /// Sum (= difference) of two polynomials: coefficient-wise XOR. The
    /// shorter coefficient vector is implicitly left-padded.
    pub fn add(&self, other: &Gf2Poly) -> Gf2Poly {
        let mut res = self.clone();
        res.xor_shifted(other, 0);
        res
    }

    /// Schoolbook product: XOR of `self` shifted by every set bit of `other`.
    pub fn mul(&self, other: &Gf2Poly) -> Gf2Poly {
        let mut res = Gf2Poly::zero();
        for (j, &limb) in other.limbs.iter().enumerate() {
            let mut rest = limb;
            while rest != 0 {
                let pos = j * LIMB_BITS + rest.trailing_zeros() as usize;
                res.xor_shifted(self, pos);
                rest &= rest - 1;
            }
        }
        res
    }

    /// Exponentiation by a non-negative integer, by squaring.
    pub fn pow(&self, mut exp: usize) -> Gf2Poly {
        let mut res = Gf2Poly::one();
        let mut base = self.clone();
        while exp > 0 {
            if exp & 1 == 1 {
                res = res.mul(&base);
            }
            base = base.mul(&base);
            exp >>= 1;
        }
        res
    }

    /// Euclidean division: returns (quotient, remainder) with
    /// `deg(remainder) < deg(divisor)`. The divisor must be non-zero.
    pub fn div_rem(&self, divisor: &Gf2Poly) -> (Gf2Poly, Gf2Poly) {
        let div_deg = divisor
            .degree()
            .expect("division by the zero polynomial");
        let mut rem = self.clone();
        let mut quot = Gf2Poly::zero();
        while let Some(rem_deg) = rem.degree() {
            if rem_deg < div_deg {
                break;
            }
            let shift = rem_deg - div_deg;
            rem.xor_shifted(divisor, shift);
            quot.set_bit(shift);
        }
        (quot, rem)
    }

    /// Remainder of Euclidean division by a non-zero polynomial.
    pub fn rem(&self, divisor: &Gf2Poly) -> Gf2Poly {
        self.div_rem(divisor).1
    }
}

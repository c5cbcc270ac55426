//! Exact rational arithmetic with a "soft widen" ladder.
//!
//! A [`Rat`] starts life at the narrowest integer width (`i8`) and widens
//! to the next rung of `{i8, i16, i32, i64, i128, BigInt}` whenever a fixed
//! width operation would overflow. The ladder is a closed enum dispatched
//! by pattern match, never by runtime type reflection.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::{BigRational, Ratio};
use num_traits::{CheckedAdd, CheckedMul, CheckedSub, ToPrimitive, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::NetError;

/// A rational number, represented at the narrowest integer width that has
/// been needed so far.
#[derive(Debug, Clone)]
pub enum Rat {
    W8(Ratio<i8>),
    W16(Ratio<i16>),
    W32(Ratio<i32>),
    W64(Ratio<i64>),
    W128(Ratio<i128>),
    Big(BigRational),
}

/// Marker for a rung of the width ladder, used by the equilibrium solver's
/// width-selection pass (it picks one width for an entire matrix, not a
/// width per scalar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    W128,
    Big,
}

const RUNGS: [Width; 6] = [
    Width::W8,
    Width::W16,
    Width::W32,
    Width::W64,
    Width::W128,
    Width::Big,
];

impl Rat {
    pub fn zero() -> Self {
        Rat::W8(Ratio::from_integer(0))
    }

    pub fn one() -> Self {
        Rat::W8(Ratio::from_integer(1))
    }

    pub fn from_i64(n: i64) -> Self {
        Self::from_ratio_i64(n, 1)
    }

    /// Build `num/den` at the narrowest width that represents it exactly.
    pub fn from_ratio_i64(num: i64, den: i64) -> Self {
        Rat::Big(BigRational::new(BigInt::from(num), BigInt::from(den))).narrow()
    }

    /// Best rational approximation of an (inexact, CIF-derived) `f64`
    /// fractional coordinate, via a continued-fraction expansion truncated
    /// at a denominator bound. Used only to hand an approximate position to
    /// collaborators that expect [`RVec3`] (e.g. SBU clustering); the exact
    /// side of this crate never reconstructs positions from floats.
    pub fn from_f64_approx(x: f64) -> Self {
        const DENOM_BOUND: i64 = 1_000_000;
        if !x.is_finite() {
            return Rat::zero();
        }
        let (mut h_prev, mut h_cur) = (1i64, 0i64);
        let (mut k_prev, mut k_cur) = (0i64, 1i64);
        let mut rem = x;
        loop {
            let a = rem.floor();
            let a_i = if a.is_finite() && a.abs() < 1e15 {
                a as i64
            } else {
                break;
            };
            let h_next = a_i.saturating_mul(h_cur).saturating_add(h_prev);
            let k_next = a_i.saturating_mul(k_cur).saturating_add(k_prev);
            if k_next == 0 || k_next.unsigned_abs() as i64 > DENOM_BOUND {
                break;
            }
            h_prev = h_cur;
            h_cur = h_next;
            k_prev = k_cur;
            k_cur = k_next;
            let frac = rem - a;
            if frac.abs() < 1e-12 {
                break;
            }
            rem = 1.0 / frac;
        }
        if k_cur == 0 {
            return Rat::zero();
        }
        Rat::from_ratio_i64(h_cur, k_cur)
    }

    fn rung(&self) -> usize {
        match self {
            Rat::W8(_) => 0,
            Rat::W16(_) => 1,
            Rat::W32(_) => 2,
            Rat::W64(_) => 3,
            Rat::W128(_) => 4,
            Rat::Big(_) => 5,
        }
    }

    pub fn width(&self) -> Width {
        RUNGS[self.rung()]
    }

    /// Promote exactly one rung up the ladder.
    fn step_up(&self) -> Rat {
        match self {
            Rat::W8(r) => Rat::W16(Ratio::new(*r.numer() as i16, *r.denom() as i16)),
            Rat::W16(r) => Rat::W32(Ratio::new(*r.numer() as i32, *r.denom() as i32)),
            Rat::W32(r) => Rat::W64(Ratio::new(*r.numer() as i64, *r.denom() as i64)),
            Rat::W64(r) => Rat::W128(Ratio::new(*r.numer() as i128, *r.denom() as i128)),
            Rat::W128(r) => Rat::Big(BigRational::new(
                BigInt::from(*r.numer()),
                BigInt::from(*r.denom()),
            )),
            Rat::Big(r) => Rat::Big(r.clone()),
        }
    }

    fn to_rung(&self, target: usize) -> Rat {
        let mut cur = self.clone();
        while cur.rung() < target {
            cur = cur.step_up();
        }
        cur
    }

    /// Force this value to a specific width, widening (never narrowing).
    pub fn to_width(&self, width: Width) -> Rat {
        self.to_rung(RUNGS.iter().position(|w| *w == width).unwrap())
    }

    pub fn to_big(&self) -> BigRational {
        match self {
            Rat::W8(r) => BigRational::new(BigInt::from(*r.numer()), BigInt::from(*r.denom())),
            Rat::W16(r) => BigRational::new(BigInt::from(*r.numer()), BigInt::from(*r.denom())),
            Rat::W32(r) => BigRational::new(BigInt::from(*r.numer()), BigInt::from(*r.denom())),
            Rat::W64(r) => BigRational::new(BigInt::from(*r.numer()), BigInt::from(*r.denom())),
            Rat::W128(r) => BigRational::new(BigInt::from(*r.numer()), BigInt::from(*r.denom())),
            Rat::Big(r) => r.clone(),
        }
    }

    /// Re-express at the narrowest width that represents this value exactly.
    pub fn narrow(&self) -> Rat {
        let big = self.to_big();
        let n = big.numer();
        let d = big.denom();
        macro_rules! try_width {
            ($t:ty, $variant:ident) => {
                if let (Some(nn), Some(dd)) = (n.to_i128(), d.to_i128()) {
                    if let (Ok(nn), Ok(dd)) = (<$t>::try_from(nn), <$t>::try_from(dd)) {
                        return Rat::$variant(Ratio::new(nn, dd));
                    }
                }
            };
        }
        try_width!(i8, W8);
        try_width!(i16, W16);
        try_width!(i32, W32);
        try_width!(i64, W64);
        try_width!(i128, W128);
        Rat::Big(big)
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Rat::W8(r) => r.is_zero(),
            Rat::W16(r) => r.is_zero(),
            Rat::W32(r) => r.is_zero(),
            Rat::W64(r) => r.is_zero(),
            Rat::W128(r) => r.is_zero(),
            Rat::Big(r) => r.is_zero(),
        }
    }

    pub fn neg(&self) -> Rat {
        match self {
            Rat::W8(r) => Rat::W8(-r),
            Rat::W16(r) => Rat::W16(-r),
            Rat::W32(r) => Rat::W32(-r),
            Rat::W64(r) => Rat::W64(-r),
            Rat::W128(r) => Rat::W128(-r),
            Rat::Big(r) => Rat::Big(-r),
        }
    }

    pub fn add(&self, other: &Rat) -> Rat {
        add_impl(self, other)
    }

    pub fn sub(&self, other: &Rat) -> Rat {
        sub_impl(self, other)
    }

    pub fn mul(&self, other: &Rat) -> Rat {
        mul_impl(self, other)
    }

    /// Exact division. `other` must be non-zero.
    pub fn div(&self, other: &Rat) -> Rat {
        debug_assert!(!other.is_zero(), "division by zero rational");
        let a = self.to_big();
        let b = other.to_big();
        Rat::Big(a / b).narrow()
    }

    /// `⌊self⌋` as an exact integer.
    pub fn floor_big(&self) -> BigInt {
        self.to_big().floor().to_integer()
    }

    /// `self - ⌊self⌋ ∈ [0, 1)`.
    pub fn back_to_unit(&self) -> Rat {
        let big = self.to_big();
        let floored = big.floor();
        Rat::Big(big - floored).narrow()
    }

    pub fn cmp_rat(&self, other: &Rat) -> Ordering {
        self.to_big().cmp(&other.to_big())
    }

    pub fn to_f64(&self) -> f64 {
        let big = self.to_big();
        big.numer().to_string().parse::<f64>().unwrap_or(f64::NAN)
            / big.denom().to_string().parse::<f64>().unwrap_or(1.0)
    }
}

impl PartialEq for Rat {
    fn eq(&self, other: &Self) -> bool {
        self.to_big() == other.to_big()
    }
}
impl Eq for Rat {}

impl PartialOrd for Rat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_rat(other))
    }
}
impl Ord for Rat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_rat(other)
    }
}

// `Ratio<T>`'s own serde impl only covers a single fixed `T`; `Rat` spans
// six rungs, so it serializes through its canonical "n/d" text form instead.
impl Serialize for Rat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_rat_text(&s).map_err(de::Error::custom)
    }
}

fn parse_rat_text(s: &str) -> Result<Rat, String> {
    match s.split_once('/') {
        Some((n, d)) => {
            let n: i64 = n.trim().parse().map_err(|_| format!("bad numerator in '{s}'"))?;
            let d: i64 = d.trim().parse().map_err(|_| format!("bad denominator in '{s}'"))?;
            Ok(Rat::from_ratio_i64(n, d))
        }
        None => {
            let n: i64 = s.trim().parse().map_err(|_| format!("bad integer '{s}'"))?;
            Ok(Rat::from_i64(n))
        }
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let big = self.to_big();
        if big.denom() == &BigInt::from(1) {
            write!(f, "{}", big.numer())
        } else {
            write!(f, "{}/{}", big.numer(), big.denom())
        }
    }
}

/// Checked addition at a single fixed width.
fn checked_add<T: Clone + Integer + CheckedMul + CheckedAdd>(
    a: &Ratio<T>,
    b: &Ratio<T>,
) -> Option<Ratio<T>> {
    let n = a
        .numer()
        .checked_mul(b.denom())?
        .checked_add(&b.numer().checked_mul(a.denom())?)?;
    let d = a.denom().checked_mul(b.denom())?;
    Some(Ratio::new(n, d))
}

fn checked_sub<T: Clone + Integer + CheckedMul + CheckedSub>(
    a: &Ratio<T>,
    b: &Ratio<T>,
) -> Option<Ratio<T>> {
    let n = a
        .numer()
        .checked_mul(b.denom())?
        .checked_sub(&b.numer().checked_mul(a.denom())?)?;
    let d = a.denom().checked_mul(b.denom())?;
    Some(Ratio::new(n, d))
}

fn checked_mul<T: Clone + Integer + CheckedMul>(a: &Ratio<T>, b: &Ratio<T>) -> Option<Ratio<T>> {
    let n = a.numer().checked_mul(b.numer())?;
    let d = a.denom().checked_mul(b.denom())?;
    Some(Ratio::new(n, d))
}

// Each op below tries the narrowest common rung first and widens by one
// step on overflow, falling back to unchecked `BigRational` arithmetic at
// the top rung (which cannot overflow). Expressed as a macro rather than a
// single generic function because each rung's `Ratio<T>` has a distinct `T`.
macro_rules! widen_retry_impl {
    ($name:ident, $checked_fn:ident, $big_op:tt) => {
        fn $name(lhs: &Rat, rhs: &Rat) -> Rat {
            let mut target = lhs.rung().max(rhs.rung());
            loop {
                let a = lhs.to_rung(target);
                let b = rhs.to_rung(target);
                match (&a, &b) {
                    (Rat::W8(x), Rat::W8(y)) => {
                        if let Some(s) = $checked_fn(x, y) {
                            return Rat::W8(s);
                        }
                    }
                    (Rat::W16(x), Rat::W16(y)) => {
                        if let Some(s) = $checked_fn(x, y) {
                            return Rat::W16(s);
                        }
                    }
                    (Rat::W32(x), Rat::W32(y)) => {
                        if let Some(s) = $checked_fn(x, y) {
                            return Rat::W32(s);
                        }
                    }
                    (Rat::W64(x), Rat::W64(y)) => {
                        if let Some(s) = $checked_fn(x, y) {
                            return Rat::W64(s);
                        }
                    }
                    (Rat::W128(x), Rat::W128(y)) => {
                        if let Some(s) = $checked_fn(x, y) {
                            return Rat::W128(s);
                        }
                    }
                    (Rat::Big(x), Rat::Big(y)) => {
                        return Rat::Big(x $big_op y);
                    }
                    _ => unreachable!("to_rung equalizes both operands' variants"),
                }
                target += 1;
            }
        }
    };
}

widen_retry_impl!(add_impl, checked_add, +);
widen_retry_impl!(sub_impl, checked_sub, -);
widen_retry_impl!(mul_impl, checked_mul, *);

/// 3-vector over [`Rat`].
pub type RVec3 = [Rat; 3];
/// 3x3 matrix over [`Rat`], row-major.
pub type RMat3 = [[Rat; 3]; 3];

pub fn rvec3_zero() -> RVec3 {
    [Rat::zero(), Rat::zero(), Rat::zero()]
}

fn is_zero_vec3(v: &RVec3) -> bool {
    v.iter().all(|x| x.is_zero())
}

fn cross(a: &RVec3, b: &RVec3) -> RVec3 {
    [
        a[1].mul(&b[2]).sub(&a[2].mul(&b[1])),
        a[2].mul(&b[0]).sub(&a[0].mul(&b[2])),
        a[0].mul(&b[1]).sub(&a[1].mul(&b[0])),
    ]
}

/// Is the 3x3 rational matrix `m` singular?
///
/// Deterministic pivot: the first column index (preferring 0, then 1, then
/// 2) with a non-zero entry in the first row. Eliminates the first row from
/// the other two columns, then checks the determinant of the remaining 2x2
/// block.
pub fn issingular(m: &RMat3) -> Result<bool, NetError> {
    let row0 = &m[0];
    let pivot = match (0..3).find(|&j| !row0[j].is_zero()) {
        Some(p) => p,
        None => return Ok(true),
    };
    let others: Vec<usize> = (0..3).filter(|&j| j != pivot).collect();

    let mut block = [[Rat::zero(), Rat::zero()], [Rat::zero(), Rat::zero()]];
    for (ci, &j) in others.iter().enumerate() {
        let factor = m[0][j].div(&m[0][pivot]);
        for (ri, &row) in [1usize, 2usize].iter().enumerate() {
            block[ri][ci] = m[row][j].sub(&factor.mul(&m[row][pivot]));
        }
    }
    let det = block[0][0]
        .mul(&block[1][1])
        .sub(&block[0][1].mul(&block[1][0]));
    Ok(det.is_zero())
}

/// Does the 3xn rational matrix (given as a slice of columns) have rank 3?
pub fn isrank3(columns: &[RVec3]) -> bool {
    let Some(u1_idx) = columns.iter().position(|c| !is_zero_vec3(c)) else {
        return false;
    };
    let u1 = &columns[u1_idx];

    let mut u2: Option<&RVec3> = None;
    for c in columns.iter().skip(u1_idx + 1) {
        if !is_zero_vec3(&cross(u1, c)) {
            u2 = Some(c);
            break;
        }
    }
    let Some(u2) = u2 else {
        return false;
    };

    for w in columns.iter() {
        let m: RMat3 = [
            [u1[0].clone(), u2[0].clone(), w[0].clone()],
            [u1[1].clone(), u2[1].clone(), w[1].clone()],
            [u1[2].clone(), u2[2].clone(), w[2].clone()],
        ];
        if let Ok(false) = issingular(&m) {
            return true;
        }
    }
    false
}

/// Pick the narrowest width in `{8,16,32,64,128}` whose signed range
/// contains every numerator and denominator in `values`; falls back to
/// arbitrary precision.
pub fn select_uniform_width(values: &[Rat]) -> Width {
    let mut lo = BigInt::from(0);
    let mut hi = BigInt::from(0);
    let mut any = false;
    for v in values {
        let big = v.to_big();
        for x in [big.numer().clone(), big.denom().clone()] {
            if !any {
                lo = x.clone();
                hi = x;
                any = true;
            } else {
                if x < lo {
                    lo = x.clone();
                }
                if x > hi {
                    hi = x;
                }
            }
        }
    }
    if !any {
        return Width::W8;
    }
    for (width, bits) in [
        (Width::W8, 8u32),
        (Width::W16, 16),
        (Width::W32, 32),
        (Width::W64, 64),
        (Width::W128, 128),
    ] {
        let bound = BigInt::from(1) << (bits - 1);
        if lo >= -bound.clone() && hi < bound {
            return width;
        }
    }
    Width::Big
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_to_unit_in_unit_interval() {
        let r = Rat::from_ratio_i64(11, 4);
        let u = r.back_to_unit();
        assert_eq!(u, Rat::from_ratio_i64(3, 4));
        let diff = r.sub(&u);
        assert_eq!(diff.floor_big(), diff.to_big().numer() / diff.to_big().denom());
    }

    #[test]
    fn test_back_to_unit_negative() {
        let r = Rat::from_ratio_i64(-1, 4);
        let u = r.back_to_unit();
        assert_eq!(u, Rat::from_ratio_i64(3, 4));
    }

    #[test]
    fn test_narrow_picks_smallest_width() {
        let r = Rat::from_ratio_i64(1, 2);
        assert_eq!(r.width(), Width::W8);
    }

    #[test]
    fn test_from_f64_approx_recovers_simple_fractions() {
        assert_eq!(Rat::from_f64_approx(0.5), Rat::from_ratio_i64(1, 2));
        assert_eq!(Rat::from_f64_approx(0.25), Rat::from_ratio_i64(1, 4));
        assert_eq!(Rat::from_f64_approx(0.0), Rat::zero());
    }

    #[test]
    fn test_widen_on_overflow() {
        let big = Rat::W8(Ratio::new(120i8, 1));
        let sum = big.add(&Rat::W8(Ratio::new(100i8, 1)));
        assert!(sum.width() > Width::W8);
        assert_eq!(sum, Rat::from_i64(220));
    }

    #[test]
    fn test_issingular_identity() {
        let m: RMat3 = [
            [Rat::one(), Rat::zero(), Rat::zero()],
            [Rat::zero(), Rat::one(), Rat::zero()],
            [Rat::zero(), Rat::zero(), Rat::one()],
        ];
        assert_eq!(issingular(&m).unwrap(), false);
    }

    #[test]
    fn test_issingular_rank_deficient() {
        let m: RMat3 = [
            [Rat::one(), Rat::from_i64(2), Rat::from_i64(3)],
            [Rat::from_i64(2), Rat::from_i64(4), Rat::from_i64(6)],
            [Rat::zero(), Rat::zero(), Rat::one()],
        ];
        assert_eq!(issingular(&m).unwrap(), true);
    }

    #[test]
    fn test_isrank3_true_for_basis() {
        let cols = vec![
            [Rat::one(), Rat::zero(), Rat::zero()],
            [Rat::zero(), Rat::one(), Rat::zero()],
            [Rat::zero(), Rat::zero(), Rat::one()],
        ];
        assert!(isrank3(&cols));
    }

    #[test]
    fn test_isrank3_false_for_coplanar() {
        let cols = vec![
            [Rat::one(), Rat::zero(), Rat::zero()],
            [Rat::zero(), Rat::one(), Rat::zero()],
            [Rat::one(), Rat::one(), Rat::zero()],
        ];
        assert!(!isrank3(&cols));
    }

    /// Testable property 2: `back_to_unit(r) in [0,1)` and
    /// `r - back_to_unit(r)` an integer, for a spread of random rationals
    /// rather than just the hand-picked cases above.
    #[test]
    fn test_back_to_unit_holds_over_random_rationals() {
        use rand::rngs::StdRng;
        use rand::Rng;
        use rand::SeedableRng;

        let mut rng: StdRng = SeedableRng::from_seed([7; 32]);
        for _ in 0..200 {
            let num: i32 = rng.gen_range(-10_000..10_000);
            let den: i32 = rng.gen_range(1..500);
            let r = Rat::from_ratio_i64(num as i64, den as i64);
            let u = r.back_to_unit();
            assert!(u.cmp_rat(&Rat::zero()) != Ordering::Less);
            assert!(u.cmp_rat(&Rat::one()) == Ordering::Less);
            let diff = r.sub(&u);
            assert_eq!(diff.floor_big(), diff.to_big().numer() / diff.to_big().denom());
        }
    }

    #[test]
    fn test_select_uniform_width_empty_is_w8() {
        assert_eq!(select_uniform_width(&[]), Width::W8);
    }

    #[test]
    fn test_select_uniform_width_picks_narrowest_that_fits() {
        let values = vec![Rat::from_i64(100), Rat::from_ratio_i64(-50, 3)];
        assert_eq!(select_uniform_width(&values), Width::W8);
    }

    #[test]
    fn test_select_uniform_width_widens_past_i8_bound() {
        let values = vec![Rat::from_i64(100), Rat::from_i64(200)];
        assert_eq!(select_uniform_width(&values), Width::W16);
    }

    #[test]
    fn test_select_uniform_width_falls_back_to_big() {
        let huge = Rat::Big(BigRational::from_integer(BigInt::from(1) << 130u32));
        assert_eq!(select_uniform_width(&[huge]), Width::Big);
    }
}

use std::fmt;

use ruint::aliases::{U256, U512};

/// Number of fractional digits every [`Decimal`] is normalized to internally.
///
/// 18 matches the most common ERC-20 decimals value and gives enough headroom that
/// rescaling a 6-decimal token (e.g. USDC) up to the canonical scale never truncates.
pub const SCALE: u32 = 18;

/// An exact, arbitrary-precision fixed-point number.
///
/// Share prices, TVL and fee figures all derive from ERC-20 integer balances that can use
/// the full 256 bits of a `uint256`. `f64` cannot represent those exactly and `rust_decimal`'s
/// 96-bit mantissa overflows on some of them, so this type stores an unscaled `U256` mantissa
/// (`value * 10^SCALE`) and performs multiplication/division through a `U512` intermediate so
/// the widening never loses precision before the final rescale back to `U256`. Every arithmetic
/// operation returns `Option`/`None` on overflow rather than panicking or wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    mantissa: U256,
}

impl Decimal {
    pub const SCALE: u32 = SCALE;

    pub const fn from_raw(mantissa: U256) -> Self {
        Self { mantissa }
    }

    pub const fn raw(self) -> U256 {
        self.mantissa
    }

    pub const fn zero() -> Self {
        Self { mantissa: U256::ZERO }
    }

    pub fn is_zero(self) -> bool {
        self.mantissa.is_zero()
    }

    /// Builds a `Decimal` from a raw token amount (e.g. an ERC-20 `balanceOf` result) and
    /// its `decimals()`, rescaling to [`SCALE`]. Values with more than 18 decimals are
    /// truncated rather than rounded, matching how the reader strategies read on-chain
    /// integers (truncation, never banker's rounding).
    pub fn from_token_amount(amount: U256, decimals: u8) -> Self {
        let decimals = decimals as u32;
        if decimals <= SCALE {
            Self { mantissa: amount * pow10(SCALE - decimals) }
        } else {
            Self { mantissa: amount / pow10(decimals - SCALE) }
        }
    }

    pub fn checked_add(self, other: Decimal) -> Option<Decimal> {
        self.mantissa.checked_add(other.mantissa).map(Decimal::from_raw)
    }

    pub fn checked_sub(self, other: Decimal) -> Option<Decimal> {
        self.mantissa.checked_sub(other.mantissa).map(Decimal::from_raw)
    }

    /// `(self * other)`, widened through `U512` before the intermediate is divided back
    /// down by `10^SCALE`, so neither the multiplication nor the rescale can overflow the
    /// way a plain `U256 * U256` would for two near-max-value operands.
    pub fn checked_mul(self, other: Decimal) -> Option<Decimal> {
        let product = U512::from(self.mantissa).checked_mul(U512::from(other.mantissa))?;
        let rescaled = product.checked_div(U512::from(pow10(SCALE)))?;
        U256::try_from(rescaled).ok().map(Decimal::from_raw)
    }

    /// `(self / other)`, with `self` pre-scaled by `10^SCALE` in `U512` before the divide
    /// so the quotient keeps full fractional precision instead of truncating to zero.
    pub fn checked_div(self, other: Decimal) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        let scaled_lhs = U512::from(self.mantissa).checked_mul(U512::from(pow10(SCALE)))?;
        let rescaled = scaled_lhs.checked_div(U512::from(other.mantissa))?;
        U256::try_from(rescaled).ok().map(Decimal::from_raw)
    }
}

fn pow10(exp: u32) -> U256 {
    let mut result = U256::from(1u64);
    let ten = U256::from(10u64);
    for _ in 0..exp {
        result *= ten;
    }
    result
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let one = pow10(SCALE);
        let integer = self.mantissa / one;
        let frac = self.mantissa % one;
        write!(f, "{integer}.{:0>width$}", frac, width = SCALE as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescales_lower_decimals_up_to_canonical_scale() {
        // 1_000_000 raw units of a 6-decimal token is exactly 1.0.
        let usdc = Decimal::from_token_amount(U256::from(1_000_000u64), 6);
        assert_eq!(usdc, Decimal::from_token_amount(U256::from(1u64) * pow10(18), 18));
    }

    #[test]
    fn mul_and_div_round_trip_without_precision_loss() {
        let a = Decimal::from_token_amount(U256::from(3u64), 0);
        let b = Decimal::from_token_amount(U256::from(7u64), 0);
        let product = a.checked_mul(b).unwrap();
        let back = product.checked_div(b).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn mul_handles_near_max_u256_operands_via_u512_widening() {
        let huge = Decimal::from_raw(U256::MAX / pow10(2));
        assert!(huge.checked_mul(Decimal::from_token_amount(U256::from(1u64), 0)).is_some());
    }

    #[test]
    fn div_by_zero_returns_none() {
        let a = Decimal::from_token_amount(U256::from(1u64), 0);
        assert_eq!(a.checked_div(Decimal::zero()), None);
    }

    #[test]
    fn display_matches_decimal_notation() {
        let half = Decimal::from_raw(pow10(18) / U256::from(2u64));
        assert_eq!(half.to_string(), "0.500000000000000000");
    }
}

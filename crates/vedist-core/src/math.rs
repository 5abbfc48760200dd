use primitive_types::U256;

use crate::types::{Amount, Timestamp, WEEK};
use crate::{Result, VedistError};

/// Start of the week containing `t` (weeks are aligned to the unix epoch).
pub fn floor_week(t: Timestamp) -> Timestamp {
    t / WEEK * WEEK
}

/// Smallest week boundary `>= t`.
pub fn ceil_week(t: Timestamp) -> Result<Timestamp> {
    let shifted = t
        .checked_add(WEEK - 1)
        .ok_or_else(|| {
            VedistError::BoundedValueExceeded("timestamp overflow in ceil_week".into())
        })?;
    Ok(floor_week(shifted))
}

/// `floor(a * b / denom)` with a 256-bit intermediate.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(VedistError::InvalidInput("division by zero".into()));
    }
    let num = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or_else(|| VedistError::BoundedValueExceeded("u256 overflow in mul".into()))?;
    let out = num / U256::from(denom);
    if out > U256::from(u128::MAX) {
        return Err(VedistError::BoundedValueExceeded("u128 overflow in div".into()));
    }
    Ok(out.as_u128())
}

pub fn add_i128(a: i128, b: i128) -> Result<i128> {
    a.checked_add(b)
        .ok_or_else(|| VedistError::BoundedValueExceeded("i128 overflow in add".into()))
}

pub fn sub_i128(a: i128, b: i128) -> Result<i128> {
    a.checked_sub(b)
        .ok_or_else(|| VedistError::BoundedValueExceeded("i128 overflow in sub".into()))
}

pub fn mul_i128(a: i128, b: i128) -> Result<i128> {
    a.checked_mul(b)
        .ok_or_else(|| VedistError::BoundedValueExceeded("i128 overflow in mul".into()))
}

/// Amount as a signed curve value.
pub fn amount_to_i128(amount: Amount) -> Result<i128> {
    i128::try_from(amount.get())
        .map_err(|_| VedistError::BoundedValueExceeded("amount exceeds i128 range".into()))
}

/// Per-second decay of a lock: `amount / max_lock_duration`, truncated.
pub fn lock_slope(amount: Amount, max_lock_duration: u64) -> Result<i128> {
    if max_lock_duration == 0 {
        return Err(VedistError::InvalidInput("max_lock_duration must be > 0".into()));
    }
    Ok(amount_to_i128(amount)? / max_lock_duration as i128)
}

/// Voting power of a lock at `now`: `slope * (end - now)`, 0 once expired.
pub fn lock_bias(slope: i128, end: Timestamp, now: Timestamp) -> Result<i128> {
    if end <= now {
        return Ok(0);
    }
    mul_i128(slope, (end - now) as i128)
}

/// `bias - slope * dt`, clamped at zero.
pub fn decay(bias: i128, slope: i128, dt: u64) -> Result<i128> {
    let drop = mul_i128(slope, dt as i128)?;
    Ok(sub_i128(bias, drop)?.max(0))
}

/// Boosted balance: `multiplier * decaying + principal`.
pub fn weighted_balance(decaying: i128, multiplier: u64, principal: Amount) -> Result<Amount> {
    let decaying = u128::try_from(decaying.max(0))
        .map_err(|_| VedistError::BoundedValueExceeded("negative bias".into()))?;
    let boosted = decaying
        .checked_mul(multiplier as u128)
        .ok_or_else(|| VedistError::BoundedValueExceeded("u128 overflow in boost".into()))?;
    Amount::new(boosted).checked_add(principal)
}

/// Non-negative curve value as an amount.
pub fn curve_to_amount(v: i128) -> Amount {
    Amount::new(v.max(0) as u128)
}

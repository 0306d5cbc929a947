//! Staking Pool Core Primitives
//!
//! Shared balance types, protocol bounds and the fixed-point conversions
//! between underlying units and pool shares.
//! All conversions truncate toward zero. No floats anywhere.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_core::H256;
use sp_runtime::{helpers_128bit::multiply_by_rational_with_rounding, Rounding, RuntimeDebug};

/// Share token metadata
pub const NAME: &str = "AdEx Staking Token";
pub const SYMBOL: &str = "ADX-STAKING";

/// Underlying token decimals (shares use the same scale)
pub const DECIMALS: u8 = 18;

/// 1 token = 10^18 base units
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Denominator for all promille parameters
pub const PROMILLE_BASE: u32 = 1_000;

/// Seconds per budget day
pub const DAY_SECONDS: u64 = 86_400;

/// Absolute ceiling for the guardian's daily extraction budget (30%)
pub const MAX_DAILY_PENALTY_PROMILLES: u32 = 300;

/// Rage exits can never pay out more than the fair value
pub const MAX_RAGE_RECEIVED_PROMILLES: u32 = PROMILLE_BASE;

/// Longest unbonding period governance may configure
pub const MAX_TIME_TO_UNBOND: u64 = 30 * DAY_SECONDS;

/// Genesis unbonding period: 20 days
pub const DEFAULT_TIME_TO_UNBOND: u64 = 20 * DAY_SECONDS;

/// Genesis rage-exit payout: 70% of fair value
pub const DEFAULT_RAGE_RECEIVED_PROMILLES: u32 = 700;

/// Genesis daily extraction budget: 5% of the pool
pub const DEFAULT_DAILY_PENALTY_PROMILLES: u32 = 50;

pub type Balance = u128;
/// Unix time in seconds
pub type Moment = u64;
pub type CommitmentId = H256;

/// A time-locked exit request.
///
/// Only the digest of the encoded record is stored on chain; the owner keeps
/// the fields and presents them again to withdraw. SCALE gives every field a
/// fixed width here (account, u128, u64), so the encoding is canonical.
#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct UnbondCommitment<AccountId> {
    pub owner: AccountId,
    pub shares: Balance,
    pub unlocks_at: Moment,
}

impl<AccountId: Encode> UnbondCommitment<AccountId> {
    pub fn new(owner: AccountId, shares: Balance, unlocks_at: Moment) -> Self {
        Self { owner, shares, unlocks_at }
    }

    /// blake2_256 over the SCALE encoding (owner ++ shares ++ unlocks_at)
    pub fn id(&self) -> CommitmentId {
        H256(sp_io::hashing::blake2_256(&self.encode()))
    }
}

/// Shares minted for a deposit of `amount`, given the pool totals before the
/// deposit. An empty pool (no shares, or nothing backing them) mints 1:1.
pub fn shares_for_deposit(amount: Balance, total_shares: Balance, total_balance: Balance) -> Option<Balance> {
    if total_shares == 0 || total_balance == 0 {
        return Some(amount);
    }
    multiply_by_rational_with_rounding(amount, total_shares, total_balance, Rounding::Down)
}

/// Underlying units backing `shares` at the given totals.
pub fn value_of_shares(shares: Balance, total_shares: Balance, total_balance: Balance) -> Option<Balance> {
    if total_shares == 0 {
        return Some(0);
    }
    multiply_by_rational_with_rounding(shares, total_balance, total_shares, Rounding::Down)
}

/// `value * promilles / 1000`, truncated.
pub fn apply_promilles(value: Balance, promilles: u32) -> Option<Balance> {
    multiply_by_rational_with_rounding(value, promilles as u128, PROMILLE_BASE as u128, Rounding::Down)
}

/// Underlying units per `UNIT` shares; zero for an empty pool.
pub fn share_value(total_shares: Balance, total_balance: Balance) -> Option<Balance> {
    value_of_shares(UNIT, total_shares, total_balance)
}

pub fn day_index(now: Moment) -> u64 {
    now / DAY_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_mints_one_to_one() {
        assert_eq!(shares_for_deposit(10, 0, 0), Some(10));
        // shares left without backing (fully penalized pool)
        assert_eq!(shares_for_deposit(10, 20, 0), Some(10));
    }

    #[test]
    fn test_mint_truncates_against_depositor() {
        assert_eq!(shares_for_deposit(10, 10, 10), Some(10));
        assert_eq!(shares_for_deposit(10, 20, 21), Some(9));
        assert_eq!(shares_for_deposit(1, 3, 4), Some(0));
    }

    #[test]
    fn test_value_truncates_against_owner() {
        assert_eq!(value_of_shares(10, 30, 30), Some(10));
        assert_eq!(value_of_shares(10, 30, 31), Some(10));
        assert_eq!(value_of_shares(10, 20, 21), Some(10));
        assert_eq!(value_of_shares(1, 3, 2), Some(0));
        assert_eq!(value_of_shares(5, 0, 0), Some(0));
    }

    #[test]
    fn test_wide_intermediate_does_not_overflow() {
        // 1e9 tokens at 18 decimals squared is far beyond u128
        let big = 1_000_000_000 * UNIT;
        assert_eq!(shares_for_deposit(big, big, big), Some(big));
        assert_eq!(value_of_shares(big, big * 2, big), Some(big / 2));
    }

    #[test]
    fn test_promilles() {
        assert_eq!(apply_promilles(10, 300), Some(3));
        assert_eq!(apply_promilles(10, 1_000), Some(10));
        assert_eq!(apply_promilles(999, 1), Some(0));
        assert_eq!(apply_promilles(30 * UNIT, 200), Some(6 * UNIT));
    }

    #[test]
    fn test_share_value() {
        assert_eq!(share_value(0, 0), Some(0));
        assert_eq!(share_value(10 * UNIT, 10 * UNIT), Some(UNIT));
        assert_eq!(share_value(20, 21), Some(UNIT + UNIT / 20));
    }

    #[test]
    fn test_day_index() {
        assert_eq!(day_index(0), 0);
        assert_eq!(day_index(DAY_SECONDS - 1), 0);
        assert_eq!(day_index(DAY_SECONDS), 1);
    }

    #[test]
    fn test_commitment_id_is_content_derived() {
        let a = UnbondCommitment::new(1u64, 10, 100);
        assert_eq!(a.id(), UnbondCommitment::new(1u64, 10, 100).id());
        assert_ne!(a.id(), UnbondCommitment::new(1u64, 10, 101).id());
        assert_ne!(a.id(), UnbondCommitment::new(2u64, 10, 100).id());
        assert_ne!(a.id(), UnbondCommitment::new(1u64, 11, 100).id());
        // fixed widths: 8 + 16 + 8 bytes for a u64 account
        assert_eq!(a.encode().len(), 32);
    }

    #[test]
    fn test_share_token_metadata() {
        assert_eq!(NAME, "AdEx Staking Token");
        assert_eq!(SYMBOL, "ADX-STAKING");
        assert_eq!(DECIMALS, 18);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(MAX_TIME_TO_UNBOND, 2_592_000);
        assert!(DEFAULT_TIME_TO_UNBOND <= MAX_TIME_TO_UNBOND);
        assert!(DEFAULT_DAILY_PENALTY_PROMILLES <= MAX_DAILY_PENALTY_PROMILLES);
        assert!(DEFAULT_RAGE_RECEIVED_PROMILLES <= MAX_RAGE_RECEIVED_PROMILLES);
    }
}

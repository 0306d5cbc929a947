//! # Staking Pool Pallet
//!
//! Pooled staking with proportional shares.
//!
//! ## How it works:
//! 1. Stakers `enter` with the underlying currency and receive shares
//!    (`amount * total_shares / total_balance`, 1:1 for an empty pool)
//! 2. Incentives credited to the pool raise the value of every share
//! 3. `leave` locks shares behind a content-addressed unbonding commitment;
//!    `withdraw` burns them once `unlocks_at` has passed
//! 4. `rage_leave` exits immediately at `RageReceivedPromilles` of fair value;
//!    the haircut stays in the pool for the remaining holders
//!
//! ## Risk extraction:
//! - The guardian may `claim` (pay out) or `penalize` (burn) pool funds
//! - Both draw on one daily budget: `total_balance * MaxDailyPenaltyPromilles / 1000`
//! - The budget resets when the unix day index changes
//!
//! ## Governance:
//! - A single governance account reassigns roles and tunes bounded parameters
//!
//! Every dispatchable runs in its own storage layer: a failed transfer
//! anywhere in a call discards all of that call's writes.

#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;

#[cfg(test)]
mod mock;


#[frame_support::pallet]
pub mod pallet {
    use frame_support::{
        pallet_prelude::*,
        traits::{Currency, ExistenceRequirement, UnixTime},
        PalletId,
    };
    use frame_system::pallet_prelude::*;
    use sp_runtime::traits::AccountIdConversion;

    use stakepool_primitives::{
        apply_promilles, day_index, shares_for_deposit, value_of_shares, Balance, CommitmentId,
        Moment, UnbondCommitment, DEFAULT_DAILY_PENALTY_PROMILLES, DEFAULT_RAGE_RECEIVED_PROMILLES,
        DEFAULT_TIME_TO_UNBOND, MAX_DAILY_PENALTY_PROMILLES, MAX_RAGE_RECEIVED_PROMILLES,
        MAX_TIME_TO_UNBOND,
    };

    const LOG_TARGET: &str = "runtime::staking-pool";

    /// Supplier of protocol incentives (a supply controller in the runtime).
    ///
    /// `mint_incentive` must mint whatever has accrued directly into `pool`
    /// and return the amount, which the pallet then attributes to the pool.
    pub trait IncentiveSource<AccountId> {
        fn mint_incentive(pool: &AccountId) -> Balance;
    }

    impl<AccountId> IncentiveSource<AccountId> for () {
        fn mint_incentive(_pool: &AccountId) -> Balance {
            0
        }
    }

    #[pallet::config]
    pub trait Config: frame_system::Config {
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// The staked (underlying) currency
        type Currency: Currency<Self::AccountId, Balance = Balance>;

        /// Wall clock; unlock times and budget days are unix seconds
        type UnixTime: UnixTime;

        /// Derives the keyless account holding the pool's funds
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// Token identifier accepted by `claim`
        type AssetId: Parameter + Member + MaxEncodedLen + Copy;

        /// The only token the guardian may claim: the underlying currency
        #[pallet::constant]
        type UnderlyingAssetId: Get<Self::AssetId>;

        type Incentives: IncentiveSource<Self::AccountId>;
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    // ============================================
    // ACCOUNTING
    // ============================================

    #[pallet::storage]
    #[pallet::getter(fn total_shares)]
    pub type TotalShares<T: Config> = StorageValue<_, Balance, ValueQuery>;

    /// Underlying units attributed to shareholders
    #[pallet::storage]
    #[pallet::getter(fn total_balance)]
    pub type TotalBalance<T: Config> = StorageValue<_, Balance, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn shares)]
    pub type Shares<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, Balance, ValueQuery>;

    /// Shares reserved by open unbonding commitments (still counted in `Shares`)
    #[pallet::storage]
    #[pallet::getter(fn locked_shares)]
    pub type LockedShares<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, Balance, ValueQuery>;

    /// Commitment digest -> shares still locked under it
    #[pallet::storage]
    #[pallet::getter(fn commitments)]
    pub type Commitments<T: Config> = StorageMap<_, Identity, CommitmentId, Balance, ValueQuery>;

    /// Exit payouts the owner chose to collect later. Already removed from `TotalBalance`.
    #[pallet::storage]
    #[pallet::getter(fn pending_payouts)]
    pub type PendingPayouts<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, Balance, ValueQuery>;

    // ============================================
    // ROLES & PARAMETERS
    // ============================================

    #[pallet::storage]
    #[pallet::getter(fn governance)]
    pub type Governance<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    #[pallet::storage]
    #[pallet::getter(fn guardian)]
    pub type Guardian<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    /// Reserved for validator-side collaborators; never consulted here
    #[pallet::storage]
    #[pallet::getter(fn validator)]
    pub type Validator<T: Config> = StorageValue<_, T::AccountId, OptionQuery>;

    #[pallet::storage]
    #[pallet::getter(fn time_to_unbond)]
    pub type TimeToUnbond<T: Config> = StorageValue<_, Moment, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn rage_received_promilles)]
    pub type RageReceivedPromilles<T: Config> = StorageValue<_, u32, ValueQuery>;

    #[pallet::storage]
    #[pallet::getter(fn max_daily_penalty_promilles)]
    pub type MaxDailyPenaltyPromilles<T: Config> = StorageValue<_, u32, ValueQuery>;

    /// Day index (`now / 86400`) the spent counter belongs to
    #[pallet::storage]
    pub type PenaltyDaySeq<T: Config> = StorageValue<_, u64, ValueQuery>;

    #[pallet::storage]
    pub type PenaltySpentThisDay<T: Config> = StorageValue<_, Balance, ValueQuery>;

    // ============================================
    // GENESIS CONFIG
    // ============================================

    #[pallet::genesis_config]
    pub struct GenesisConfig<T: Config> {
        pub governance: Option<T::AccountId>,
        pub guardian: Option<T::AccountId>,
        pub validator: Option<T::AccountId>,
        pub time_to_unbond: Moment,
        pub rage_received_promilles: u32,
        pub max_daily_penalty_promilles: u32,
    }

    impl<T: Config> Default for GenesisConfig<T> {
        fn default() -> Self {
            Self {
                governance: None,
                guardian: None,
                validator: None,
                time_to_unbond: DEFAULT_TIME_TO_UNBOND,
                rage_received_promilles: DEFAULT_RAGE_RECEIVED_PROMILLES,
                max_daily_penalty_promilles: DEFAULT_DAILY_PENALTY_PROMILLES,
            }
        }
    }

    #[pallet::genesis_build]
    impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
        fn build(&self) {
            assert!(self.time_to_unbond <= MAX_TIME_TO_UNBOND, "time_to_unbond out of bounds");
            assert!(
                self.rage_received_promilles <= MAX_RAGE_RECEIVED_PROMILLES,
                "rage_received_promilles too large"
            );
            assert!(
                self.max_daily_penalty_promilles <= MAX_DAILY_PENALTY_PROMILLES,
                "max_daily_penalty_promilles too large"
            );

            if let Some(ref who) = self.governance {
                Governance::<T>::put(who);
            }
            if let Some(ref who) = self.guardian {
                Guardian::<T>::put(who);
            }
            if let Some(ref who) = self.validator {
                Validator::<T>::put(who);
            }
            TimeToUnbond::<T>::put(self.time_to_unbond);
            RageReceivedPromilles::<T>::put(self.rage_received_promilles);
            MaxDailyPenaltyPromilles::<T>::put(self.max_daily_penalty_promilles);

            // The seed is never attributed to shareholders
            let pool = Pallet::<T>::pool_account();
            let min = T::Currency::minimum_balance();
            if T::Currency::free_balance(&pool) < min {
                let _ = T::Currency::make_free_balance_be(&pool, min);
            }
        }
    }

    // ============================================
    // EVENTS
    // ============================================

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// Underlying deposited, shares minted to `beneficiary`
        Entered {
            payer: T::AccountId,
            beneficiary: T::AccountId,
            amount: Balance,
            minted_shares: Balance,
        },
        /// Shares locked until `unlocks_at` under `commitment`
        Left {
            owner: T::AccountId,
            shares: Balance,
            unlocks_at: Moment,
            commitment: CommitmentId,
        },
        /// Unbonded shares burned and paid out
        Withdrawn {
            owner: T::AccountId,
            shares: Balance,
            payout: Balance,
        },
        /// Shares burned immediately at the rage-exit discount
        RageLeft {
            owner: T::AccountId,
            shares: Balance,
            received_tokens: Balance,
        },
        /// Deferred exit payouts transferred to their owner
        PayoutCollected {
            owner: T::AccountId,
            amount: Balance,
        },
        SharesTransferred {
            from: T::AccountId,
            to: T::AccountId,
            shares: Balance,
        },
        /// Pool value increased without minting shares. `from` is `None` for
        /// amounts minted by the incentive source.
        IncentiveAdded {
            from: Option<T::AccountId>,
            amount: Balance,
        },
        Claimed {
            guardian: T::AccountId,
            token: T::AssetId,
            to: T::AccountId,
            amount: Balance,
        },
        Penalized {
            guardian: T::AccountId,
            amount: Balance,
        },
        GovernanceChanged { governance: T::AccountId },
        GuardianChanged { guardian: T::AccountId },
        ValidatorChanged { validator: T::AccountId },
        DailyPenaltyMaxChanged { promilles: u32 },
        RageReceivedChanged { promilles: u32 },
        TimeToUnbondChanged { seconds: Moment },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Caller is not the governance account
        NotGovernance,
        /// Caller is not the guardian
        NotGuardian,
        /// Daily penalty ceiling above 300 promilles
        DailyPenaltyTooLarge,
        /// Rage-exit payout above 1000 promilles
        TooLarge,
        /// Unbonding period outside [0, 30 days]
        OutOfBounds,
        /// Not enough unlocked shares
        InsufficientShares,
        /// Extraction exceeds the pool's attributed balance
        InsufficientBalance,
        /// Extraction exceeds what is left of today's budget
        DailyCapExceeded,
        /// The commitment has not unlocked yet
        UnlockTooEarly,
        /// No matching commitment holds these shares
        NoCommitment,
        /// Only the underlying asset can be claimed
        TokenNotWhitelisted,
        /// Pulling the deposit from the payer failed
        InsufficientAllowanceOrBalance,
        /// Moving funds out of the pool account failed
        TransferFailed,
        /// Nothing deferred for this account
        NothingToCollect,
        /// Zero-share exit request
        ZeroAmount,
        /// Arithmetic overflow
        ArithmeticOverflow,
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        #[cfg(feature = "try-runtime")]
        fn try_state(_n: BlockNumberFor<T>) -> Result<(), sp_runtime::TryRuntimeError> {
            Self::do_try_state().map_err(Into::into)
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Deposit `amount` and mint shares to the caller.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(60_000_000, 0))]
        pub fn enter(origin: OriginFor<T>, amount: Balance) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::do_enter(&who, who.clone(), amount)
        }

        /// Deposit `amount` from the caller and mint the shares to `beneficiary`.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(60_000_000, 0))]
        pub fn enter_to(origin: OriginFor<T>, beneficiary: T::AccountId, amount: Balance) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::do_enter(&who, beneficiary, amount)
        }

        /// Lock `shares` for `TimeToUnbond` seconds.
        ///
        /// Nothing is burned yet: the shares keep earning until `withdraw`.
        /// The commitment key is the digest of (owner, shares, unlocks_at), so
        /// identical requests in the same second add up in one bucket.
        /// `skip_incentive` skips pulling accrued incentives first.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(50_000_000, 0))]
        pub fn leave(origin: OriginFor<T>, shares: Balance, skip_incentive: bool) -> DispatchResult {
            let owner = ensure_signed(origin)?;
            ensure!(shares > 0, Error::<T>::ZeroAmount);

            if !skip_incentive {
                Self::sync_incentive();
            }

            ensure!(Self::unlocked_shares(&owner) >= shares, Error::<T>::InsufficientShares);

            let unlocks_at = Self::now()
                .checked_add(TimeToUnbond::<T>::get())
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            let commitment = UnbondCommitment::new(owner.clone(), shares, unlocks_at).id();

            Commitments::<T>::try_mutate(commitment, |locked| -> DispatchResult {
                *locked = locked.checked_add(shares).ok_or(Error::<T>::ArithmeticOverflow)?;
                Ok(())
            })?;
            LockedShares::<T>::mutate(&owner, |locked| *locked = locked.saturating_add(shares));

            Self::deposit_event(Event::Left { owner, shares, unlocks_at, commitment });
            Ok(())
        }

        /// Burn unlocked commitment shares and pay out their current value.
        ///
        /// With `skip_transfer` the payout is parked in `PendingPayouts`.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(80_000_000, 0))]
        pub fn withdraw(
            origin: OriginFor<T>,
            shares: Balance,
            unlocks_at: Moment,
            skip_transfer: bool,
        ) -> DispatchResult {
            let owner = ensure_signed(origin)?;
            Self::sync_incentive();

            ensure!(Self::now() >= unlocks_at, Error::<T>::UnlockTooEarly);

            let commitment = UnbondCommitment::new(owner.clone(), shares, unlocks_at).id();
            let locked = Commitments::<T>::get(commitment);
            ensure!(locked > 0 && locked >= shares, Error::<T>::NoCommitment);

            if locked == shares {
                Commitments::<T>::remove(commitment);
            } else {
                Commitments::<T>::insert(commitment, locked - shares);
            }
            LockedShares::<T>::mutate_exists(&owner, |maybe| {
                let rest = maybe.unwrap_or(0).saturating_sub(shares);
                *maybe = if rest == 0 { None } else { Some(rest) };
            });

            let payout = Self::burn_shares(&owner, shares)?;
            TotalBalance::<T>::mutate(|b| *b = b.saturating_sub(payout));
            Self::pay_out(&owner, payout, skip_transfer)?;

            log::info!(
                target: LOG_TARGET,
                "withdraw: {} shares paid {} (deferred: {})",
                shares,
                payout,
                skip_transfer
            );

            Self::deposit_event(Event::Withdrawn { owner, shares, payout });
            Ok(())
        }

        /// Exit immediately at `RageReceivedPromilles` of fair value.
        ///
        /// Only the discounted amount leaves the pool; the rest stays in
        /// `TotalBalance` and accrues to the remaining shares.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(80_000_000, 0))]
        pub fn rage_leave(origin: OriginFor<T>, shares: Balance, skip_transfer: bool) -> DispatchResult {
            let owner = ensure_signed(origin)?;
            Self::sync_incentive();

            ensure!(Self::unlocked_shares(&owner) >= shares, Error::<T>::InsufficientShares);

            let fair = Self::burn_shares(&owner, shares)?;
            let received = apply_promilles(fair, RageReceivedPromilles::<T>::get())
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            TotalBalance::<T>::mutate(|b| *b = b.saturating_sub(received));
            Self::pay_out(&owner, received, skip_transfer)?;

            log::info!(
                target: LOG_TARGET,
                "rage_leave: {} shares, fair {} received {}",
                shares,
                fair,
                received
            );

            Self::deposit_event(Event::RageLeft { owner, shares, received_tokens: received });
            Ok(())
        }

        /// Transfer every deferred payout owed to the caller.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(40_000_000, 0))]
        pub fn collect_payouts(origin: OriginFor<T>) -> DispatchResult {
            let owner = ensure_signed(origin)?;

            let amount = PendingPayouts::<T>::take(&owner);
            ensure!(amount > 0, Error::<T>::NothingToCollect);

            T::Currency::transfer(
                &Self::pool_account(),
                &owner,
                amount,
                ExistenceRequirement::KeepAlive,
            )
            .map_err(|_| Error::<T>::TransferFailed)?;

            Self::deposit_event(Event::PayoutCollected { owner, amount });
            Ok(())
        }

        /// Move unlocked shares to another account.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(30_000_000, 0))]
        pub fn transfer_shares(origin: OriginFor<T>, to: T::AccountId, shares: Balance) -> DispatchResult {
            let from = ensure_signed(origin)?;
            ensure!(Self::unlocked_shares(&from) >= shares, Error::<T>::InsufficientShares);

            if from != to {
                Self::set_shares(&from, Shares::<T>::get(&from) - shares);
                let credited = Shares::<T>::get(&to)
                    .checked_add(shares)
                    .ok_or(Error::<T>::ArithmeticOverflow)?;
                Self::set_shares(&to, credited);
            }

            Self::deposit_event(Event::SharesTransferred { from, to, shares });
            Ok(())
        }

        /// Top up the pool from the caller without minting shares.
        #[pallet::call_index(7)]
        #[pallet::weight(Weight::from_parts(40_000_000, 0))]
        pub fn add_incentive(origin: OriginFor<T>, amount: Balance) -> DispatchResult {
            let who = ensure_signed(origin)?;

            T::Currency::transfer(&who, &Self::pool_account(), amount, ExistenceRequirement::KeepAlive)
                .map_err(|_| Error::<T>::InsufficientAllowanceOrBalance)?;
            TotalBalance::<T>::try_mutate(|b| -> DispatchResult {
                *b = b.checked_add(amount).ok_or(Error::<T>::ArithmeticOverflow)?;
                Ok(())
            })?;

            Self::deposit_event(Event::IncentiveAdded { from: Some(who), amount });
            Ok(())
        }

        /// Guardian: pay `amount` of the underlying asset out of the pool to `to`.
        #[pallet::call_index(8)]
        #[pallet::weight(Weight::from_parts(60_000_000, 0))]
        pub fn claim(
            origin: OriginFor<T>,
            token: T::AssetId,
            to: T::AccountId,
            amount: Balance,
        ) -> DispatchResult {
            let guardian = ensure_signed(origin)?;
            Self::ensure_guardian(&guardian)?;
            ensure!(token == T::UnderlyingAssetId::get(), Error::<T>::TokenNotWhitelisted);

            Self::consume_penalty_budget(amount)?;

            T::Currency::transfer(&Self::pool_account(), &to, amount, ExistenceRequirement::KeepAlive)
                .map_err(|_| Error::<T>::TransferFailed)?;

            log::info!(target: LOG_TARGET, "guardian claimed {} from the pool", amount);

            Self::deposit_event(Event::Claimed { guardian, token, to, amount });
            Ok(())
        }

        /// Guardian: record a loss against the pool. The units are burned.
        #[pallet::call_index(9)]
        #[pallet::weight(Weight::from_parts(50_000_000, 0))]
        pub fn penalize(origin: OriginFor<T>, amount: Balance) -> DispatchResult {
            let guardian = ensure_signed(origin)?;
            Self::ensure_guardian(&guardian)?;

            Self::consume_penalty_budget(amount)?;

            let (burned, unpaid) = T::Currency::slash(&Self::pool_account(), amount);
            ensure!(unpaid == 0, Error::<T>::TransferFailed);
            drop(burned);

            log::info!(target: LOG_TARGET, "guardian penalized the pool by {}", amount);

            Self::deposit_event(Event::Penalized { guardian, amount });
            Ok(())
        }

        #[pallet::call_index(10)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_governance(origin: OriginFor<T>, governance: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;

            Governance::<T>::put(&governance);
            log::info!(target: LOG_TARGET, "governance handed over");
            Self::deposit_event(Event::GovernanceChanged { governance });
            Ok(())
        }

        #[pallet::call_index(11)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_guardian(origin: OriginFor<T>, guardian: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;

            Guardian::<T>::put(&guardian);
            Self::deposit_event(Event::GuardianChanged { guardian });
            Ok(())
        }

        #[pallet::call_index(12)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_validator(origin: OriginFor<T>, validator: T::AccountId) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;

            Validator::<T>::put(&validator);
            Self::deposit_event(Event::ValidatorChanged { validator });
            Ok(())
        }

        /// Ceiling is 300 promilles (30% of the pool per day).
        #[pallet::call_index(13)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_daily_penalty_max(origin: OriginFor<T>, promilles: u32) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;
            ensure!(promilles <= MAX_DAILY_PENALTY_PROMILLES, Error::<T>::DailyPenaltyTooLarge);

            MaxDailyPenaltyPromilles::<T>::put(promilles);
            Self::deposit_event(Event::DailyPenaltyMaxChanged { promilles });
            Ok(())
        }

        #[pallet::call_index(14)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_rage_received(origin: OriginFor<T>, promilles: u32) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;
            ensure!(promilles <= MAX_RAGE_RECEIVED_PROMILLES, Error::<T>::TooLarge);

            RageReceivedPromilles::<T>::put(promilles);
            Self::deposit_event(Event::RageReceivedChanged { promilles });
            Ok(())
        }

        /// Applies to new `leave` requests only; open commitments keep their unlock time.
        #[pallet::call_index(15)]
        #[pallet::weight(Weight::from_parts(10_000_000, 0))]
        pub fn set_time_to_unbond(origin: OriginFor<T>, seconds: Moment) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_governance(&who)?;
            ensure!(seconds <= MAX_TIME_TO_UNBOND, Error::<T>::OutOfBounds);

            TimeToUnbond::<T>::put(seconds);
            Self::deposit_event(Event::TimeToUnbondChanged { seconds });
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        /// The keyless account holding the pool's funds.
        ///
        /// Seeded with `minimum_balance()` at genesis, on top of `TotalBalance`.
        /// Outflows keep it alive, so the seed is never paid out or dusted.
        pub fn pool_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        pub fn now() -> Moment {
            T::UnixTime::now().as_secs()
        }

        /// Shares an owner may still leave, rage-leave or transfer
        pub fn unlocked_shares(owner: &T::AccountId) -> Balance {
            Shares::<T>::get(owner).saturating_sub(LockedShares::<T>::get(owner))
        }

        /// Underlying units per `UNIT` (10^18) shares.
        ///
        /// Views saturate at `Balance::MAX` instead of failing.
        pub fn share_value() -> Balance {
            stakepool_primitives::share_value(TotalShares::<T>::get(), TotalBalance::<T>::get())
                .unwrap_or(Balance::MAX)
        }

        pub fn commitment_id(owner: &T::AccountId, shares: Balance, unlocks_at: Moment) -> CommitmentId {
            UnbondCommitment::new(owner.clone(), shares, unlocks_at).id()
        }

        /// What withdrawing this commitment would pay right now (zero if it
        /// does not exist or holds fewer shares).
        pub fn unbonding_commitment_worth(owner: &T::AccountId, shares: Balance, unlocks_at: Moment) -> Balance {
            let locked = Commitments::<T>::get(Self::commitment_id(owner, shares, unlocks_at));
            if locked == 0 || locked < shares {
                return 0;
            }
            value_of_shares(shares, TotalShares::<T>::get(), TotalBalance::<T>::get())
                .unwrap_or(Balance::MAX)
        }

        /// Today's extraction ceiling against the current pool balance
        pub fn daily_cap() -> Balance {
            apply_promilles(TotalBalance::<T>::get(), MaxDailyPenaltyPromilles::<T>::get())
                .unwrap_or(Balance::MAX)
        }

        pub fn remaining_daily_budget() -> Balance {
            Self::daily_cap().saturating_sub(Self::spent_today(day_index(Self::now())))
        }

        fn spent_today(today: u64) -> Balance {
            if PenaltyDaySeq::<T>::get() == today {
                PenaltySpentThisDay::<T>::get()
            } else {
                0
            }
        }

        fn ensure_governance(who: &T::AccountId) -> DispatchResult {
            ensure!(Governance::<T>::get().as_ref() == Some(who), Error::<T>::NotGovernance);
            Ok(())
        }

        fn ensure_guardian(who: &T::AccountId) -> DispatchResult {
            ensure!(Guardian::<T>::get().as_ref() == Some(who), Error::<T>::NotGuardian);
            Ok(())
        }

        fn set_shares(owner: &T::AccountId, shares: Balance) {
            if shares == 0 {
                Shares::<T>::remove(owner);
            } else {
                Shares::<T>::insert(owner, shares);
            }
        }

        /// Pull whatever the incentive source has accrued into the pool.
        fn sync_incentive() {
            let minted = T::Incentives::mint_incentive(&Self::pool_account());
            if minted == 0 {
                return;
            }
            TotalBalance::<T>::mutate(|b| *b = b.saturating_add(minted));
            Self::deposit_event(Event::IncentiveAdded { from: None, amount: minted });
        }

        fn do_enter(payer: &T::AccountId, beneficiary: T::AccountId, amount: Balance) -> DispatchResult {
            Self::sync_incentive();

            let total_shares = TotalShares::<T>::get();
            let total_balance = TotalBalance::<T>::get();

            // Conversion uses the totals from before this deposit
            let minted_shares = shares_for_deposit(amount, total_shares, total_balance)
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            let new_total_balance = total_balance.checked_add(amount).ok_or(Error::<T>::ArithmeticOverflow)?;
            let new_total_shares = total_shares
                .checked_add(minted_shares)
                .ok_or(Error::<T>::ArithmeticOverflow)?;

            T::Currency::transfer(payer, &Self::pool_account(), amount, ExistenceRequirement::KeepAlive)
                .map_err(|_| Error::<T>::InsufficientAllowanceOrBalance)?;

            TotalBalance::<T>::put(new_total_balance);
            TotalShares::<T>::put(new_total_shares);
            Self::set_shares(&beneficiary, Shares::<T>::get(&beneficiary).saturating_add(minted_shares));

            Self::deposit_event(Event::Entered {
                payer: payer.clone(),
                beneficiary,
                amount,
                minted_shares,
            });
            Ok(())
        }

        /// Burn `shares` of `owner` and return their value at the pre-burn totals.
        /// `TotalBalance` is left to the caller.
        fn burn_shares(owner: &T::AccountId, shares: Balance) -> Result<Balance, DispatchError> {
            let total_shares = TotalShares::<T>::get();
            let value = value_of_shares(shares, total_shares, TotalBalance::<T>::get())
                .ok_or(Error::<T>::ArithmeticOverflow)?;

            let held = Shares::<T>::get(owner);
            ensure!(held >= shares, Error::<T>::InsufficientShares);
            Self::set_shares(owner, held - shares);
            TotalShares::<T>::put(total_shares.saturating_sub(shares));

            Ok(value)
        }

        fn pay_out(owner: &T::AccountId, amount: Balance, defer: bool) -> DispatchResult {
            if defer {
                PendingPayouts::<T>::mutate(owner, |p| *p = p.saturating_add(amount));
                return Ok(());
            }
            T::Currency::transfer(&Self::pool_account(), owner, amount, ExistenceRequirement::KeepAlive)
                .map_err(|_| Error::<T>::TransferFailed)?;
            Ok(())
        }

        /// Check the daily budget and debit the pool. Balance sufficiency is
        /// checked before the cap.
        fn consume_penalty_budget(amount: Balance) -> DispatchResult {
            let total_balance = TotalBalance::<T>::get();
            ensure!(amount <= total_balance, Error::<T>::InsufficientBalance);

            let today = day_index(Self::now());
            if PenaltyDaySeq::<T>::get() != today {
                log::debug!(target: LOG_TARGET, "penalty budget reset for day {}", today);
            }
            let spent = Self::spent_today(today)
                .checked_add(amount)
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            let cap = apply_promilles(total_balance, MaxDailyPenaltyPromilles::<T>::get())
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            ensure!(spent <= cap, Error::<T>::DailyCapExceeded);

            PenaltyDaySeq::<T>::put(today);
            PenaltySpentThisDay::<T>::put(spent);
            TotalBalance::<T>::put(total_balance - amount);
            Ok(())
        }

        /// Pool bookkeeping invariants:
        /// - `TotalShares` equals the sum of all share balances
        /// - no owner has more locked than held shares
        /// - open commitments hold exactly the locked shares
        /// - the pool account covers its seed, attributed and deferred funds
        #[cfg(any(feature = "try-runtime", test))]
        pub fn do_try_state() -> Result<(), &'static str> {
            let mut share_sum: Balance = 0;
            for shares in Shares::<T>::iter_values() {
                share_sum = share_sum.checked_add(shares).ok_or("share sum overflow")?;
            }
            ensure!(share_sum == TotalShares::<T>::get(), "TotalShares != sum of Shares");

            let mut locked_sum: Balance = 0;
            for (owner, locked) in LockedShares::<T>::iter() {
                ensure!(locked <= Shares::<T>::get(&owner), "locked shares exceed held shares");
                locked_sum = locked_sum.checked_add(locked).ok_or("locked sum overflow")?;
            }

            let mut committed_sum: Balance = 0;
            for committed in Commitments::<T>::iter_values() {
                ensure!(committed > 0, "zero commitment kept in storage");
                committed_sum = committed_sum.checked_add(committed).ok_or("commitment sum overflow")?;
            }
            ensure!(committed_sum == locked_sum, "commitments != sum of LockedShares");

            let pending: Balance = PendingPayouts::<T>::iter_values().fold(0, |acc, p| acc.saturating_add(p));
            ensure!(
                T::Currency::free_balance(&Self::pool_account())
                    >= TotalBalance::<T>::get()
                        .saturating_add(pending)
                        .saturating_add(T::Currency::minimum_balance()),
                "pool account does not cover its obligations"
            );
            Ok(())
        }
    }
}

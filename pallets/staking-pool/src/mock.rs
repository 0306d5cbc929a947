use crate as pallet_staking_pool;
use frame_support::{
    derive_impl, parameter_types,
    traits::{ConstU64, Currency},
    PalletId,
};
use sp_runtime::{traits::IdentityLookup, BuildStorage};
use stakepool_primitives::Balance;

type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
    pub enum Test {
        System: frame_system,
        Timestamp: pallet_timestamp,
        Balances: pallet_balances,
        StakingPool: pallet_staking_pool,
    }
);

pub const ALICE: u64 = 1;
pub const BOB: u64 = 2;
pub const CHARLIE: u64 = 3;
pub const GUARDIAN: u64 = 10;
pub const VALIDATOR: u64 = 11;
pub const GOVERNANCE: u64 = 12;
/// Never endowed
pub const PAUPER: u64 = 99;

pub const INITIAL_BALANCE: Balance = 1_000;
/// Tests start one second into day 100
pub const START: u64 = 100 * stakepool_primitives::DAY_SECONDS + 1;
pub const UNBOND: u64 = 3 * stakepool_primitives::DAY_SECONDS;

pub const UNDERLYING: u32 = 0;
pub const OTHER_TOKEN: u32 = 7;

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
    type Block = Block;
    type AccountId = u64;
    type Lookup = IdentityLookup<Self::AccountId>;
    type AccountData = pallet_balances::AccountData<Balance>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
    type Balance = Balance;
    type ExistentialDeposit = ExistentialDeposit;
    type AccountStore = System;
}

impl pallet_timestamp::Config for Test {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ConstU64<1>;
    type WeightInfo = ();
}

parameter_types! {
    pub static ExistentialDeposit: Balance = 1;
    pub const StakingPoolPalletId: PalletId = PalletId(*b"py/stake");
    pub const UnderlyingAssetId: u32 = UNDERLYING;
    /// Incentive the mock supply controller mints on its next call
    pub static AccruedIncentive: Balance = 0;
}

pub struct MockIncentives;
impl pallet_staking_pool::IncentiveSource<u64> for MockIncentives {
    fn mint_incentive(pool: &u64) -> Balance {
        let amount = AccruedIncentive::get();
        AccruedIncentive::set(0);
        if amount > 0 {
            let _ = Balances::deposit_creating(pool, amount);
        }
        amount
    }
}

impl pallet_staking_pool::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Currency = Balances;
    type UnixTime = Timestamp;
    type PalletId = StakingPoolPalletId;
    type AssetId = u32;
    type UnderlyingAssetId = UnderlyingAssetId;
    type Incentives = MockIncentives;
}

pub fn set_now(secs: u64) {
    Timestamp::set_timestamp(secs * 1_000);
}

pub fn advance(secs: u64) {
    set_now(StakingPool::now() + secs);
}

/// Pool account balance above its genesis seed
pub fn pool_funds() -> Balance {
    Balances::free_balance(StakingPool::pool_account()) - ExistentialDeposit::get()
}

pub fn new_test_ext() -> sp_io::TestExternalities {
    new_test_ext_with_existential_deposit(1)
}

pub fn new_test_ext_with_existential_deposit(existential_deposit: Balance) -> sp_io::TestExternalities {
    ExistentialDeposit::set(existential_deposit);

    let mut t = frame_system::GenesisConfig::<Test>::default()
        .build_storage()
        .unwrap();

    pallet_balances::GenesisConfig::<Test> {
        balances: vec![
            (ALICE, INITIAL_BALANCE),
            (BOB, INITIAL_BALANCE),
            (CHARLIE, INITIAL_BALANCE),
            (GUARDIAN, INITIAL_BALANCE),
            (GOVERNANCE, INITIAL_BALANCE),
        ],
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();

    pallet_staking_pool::GenesisConfig::<Test> {
        governance: Some(GOVERNANCE),
        guardian: Some(GUARDIAN),
        validator: Some(VALIDATOR),
        time_to_unbond: UNBOND,
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();

    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| {
        System::set_block_number(1);
        AccruedIncentive::set(0);
        set_now(START);
    });
    ext
}

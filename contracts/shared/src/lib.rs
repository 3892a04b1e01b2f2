//! Shared ledger helpers for the CanvasForge contracts.
//!
//! Both ledgers hold value as a SEP-41 token and accept "attached" payments by
//! pulling tokens from the payer inside the same invocation. The helpers here
//! keep that inflow/outflow handling identical across contracts.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{token::TokenClient, Address, Env};

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

/// Failure codes for the payment helpers. Each contract maps these into its
/// own `#[contracterror]` enum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    InvalidAmount = 1,
    PaymentMismatch = 2,
    Overflow = 3,
}

/// Pull `amount` tokens from `from` into the calling contract.
///
/// The contract's own balance is measured before and after the transfer; the
/// call fails with `PaymentMismatch` unless it grew by exactly `amount`, so a
/// token that skims on transfer can never credit more than it delivered.
/// `from` must have authorized the surrounding invocation.
pub fn collect_payment(
    env: &Env,
    token: &Address,
    from: &Address,
    amount: i128,
) -> Result<(), Error> {
    if amount <= 0 {
        return Err(Error::InvalidAmount);
    }

    let client = TokenClient::new(env, token);
    let this = env.current_contract_address();

    let before = client.balance(&this);
    client.transfer(from, &this, &amount);
    let received = client
        .balance(&this)
        .checked_sub(before)
        .ok_or(Error::Overflow)?;

    if received != amount {
        return Err(Error::PaymentMismatch);
    }
    Ok(())
}

/// Send `amount` tokens from the calling contract to `to`. Zero is a no-op.
pub fn disburse(env: &Env, token: &Address, to: &Address, amount: i128) {
    if amount > 0 {
        TokenClient::new(env, token).transfer(&env.current_contract_address(), to, &amount);
    }
}

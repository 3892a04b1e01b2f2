//! Round state machine.
//!
//! The pool's whole accounting state is `Pool { reserve, round }`. Every
//! mutator consumes the current state and returns either the next state or an
//! error, so a rejected call leaves nothing to roll back. The contract shell in
//! `lib.rs` only loads, authorizes, stores and moves tokens.

use soroban_sdk::{contracttype, Address};

use crate::Error;

/// How a round ended.
///
/// Codes 0..=2 are the values a caller may submit to `settle`. The remaining
/// variants are assigned by the engine itself.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Outcome {
    PlayerLose = 0,
    PlayerWin = 1,
    Draw = 2,
    EmergencyDraw = 3,
    TimedOut = 4,
}

impl Outcome {
    /// Decode an outcome code submitted by a caller.
    pub fn from_code(code: u32) -> Result<Self, Error> {
        match code {
            0 => Ok(Outcome::PlayerLose),
            1 => Ok(Outcome::PlayerWin),
            2 => Ok(Outcome::Draw),
            _ => Err(Error::InvalidOutcome),
        }
    }
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum RoundStatus {
    Idle = 0,
    Active = 1,
    Settled = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActiveRound {
    pub player: Address,
    pub human_stake: i128,
    pub counterparties: u32,
    /// `human_stake + human_stake * counterparties`; fixed until settlement.
    pub session_pool: i128,
    /// Ledger sequence at join.
    pub joined_at: u32,
    /// Last ledger sequence before `force_timeout` becomes available.
    pub deadline: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettledRound {
    pub player: Address,
    pub human_stake: i128,
    pub counterparties: u32,
    pub session_pool: i128,
    pub outcome: Outcome,
    pub paid_to_player: i128,
    pub paid_to_operator: i128,
}

/// The single round slot. `Idle` carries no payload, so returning to it
/// clears every per-round field.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Round {
    Idle,
    Active(ActiveRound),
    Settled(SettledRound),
}

impl Round {
    pub fn status(&self) -> RoundStatus {
        match self {
            Round::Idle => RoundStatus::Idle,
            Round::Active(_) => RoundStatus::Active,
            Round::Settled(_) => RoundStatus::Settled,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Round::Settled(settled) => Some(settled.outcome),
            _ => None,
        }
    }

    pub fn active(&self) -> Option<&ActiveRound> {
        match self {
            Round::Active(active) => Some(active),
            _ => None,
        }
    }

    pub fn settled(&self) -> Option<&SettledRound> {
        match self {
            Round::Settled(settled) => Some(settled),
            _ => None,
        }
    }
}

/// Tokens that must leave the contract after a transition has been stored.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Disbursement {
    pub to_player: i128,
    pub to_operator: i128,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pool {
    pub reserve: i128,
    pub round: Round,
}

impl Pool {
    pub fn new() -> Self {
        Pool {
            reserve: 0,
            round: Round::Idle,
        }
    }

    /// Operator deposit. Only accepted between rounds.
    pub fn fund(self, amount: i128) -> Result<Pool, Error> {
        if self.round != Round::Idle {
            return Err(Error::WrongPhase);
        }
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let reserve = self.reserve.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(Pool {
            reserve,
            round: Round::Idle,
        })
    }

    /// Open a round, earmarking `stake * counterparties` from the reserve to
    /// cover the automated side.
    pub fn join(
        self,
        player: Address,
        stake: i128,
        counterparties: u32,
        now: u32,
        timeout_ledgers: u32,
    ) -> Result<Pool, Error> {
        if self.round != Round::Idle {
            return Err(Error::WrongPhase);
        }
        if stake <= 0 {
            return Err(Error::InvalidStake);
        }
        if counterparties == 0 {
            return Err(Error::InvalidCounterparties);
        }

        let cover = stake
            .checked_mul(counterparties as i128)
            .ok_or(Error::Overflow)?;
        if self.reserve < cover {
            return Err(Error::InsufficientReserve);
        }

        let session_pool = stake.checked_add(cover).ok_or(Error::Overflow)?;
        let deadline = now.checked_add(timeout_ledgers).ok_or(Error::Overflow)?;
        let reserve = self.reserve.checked_sub(cover).ok_or(Error::Overflow)?;

        Ok(Pool {
            reserve,
            round: Round::Active(ActiveRound {
                player,
                human_stake: stake,
                counterparties,
                session_pool,
                joined_at: now,
                deadline,
            }),
        })
    }

    /// Disburse the session pool according to a caller-submitted outcome.
    pub fn settle(self, outcome: Outcome) -> Result<(Pool, Disbursement), Error> {
        let Round::Active(active) = self.round else {
            return Err(Error::WrongPhase);
        };

        let (to_player, returned) = match outcome {
            Outcome::PlayerWin => (active.session_pool, 0),
            Outcome::PlayerLose => (0, active.session_pool),
            Outcome::Draw => (
                active.human_stake,
                active
                    .session_pool
                    .checked_sub(active.human_stake)
                    .ok_or(Error::Overflow)?,
            ),
            Outcome::EmergencyDraw | Outcome::TimedOut => return Err(Error::InvalidOutcome),
        };

        let reserve = self.reserve.checked_add(returned).ok_or(Error::Overflow)?;
        let payout = Disbursement {
            to_player,
            to_operator: 0,
        };
        Ok((
            Pool {
                reserve,
                round: Round::Settled(close(active, outcome, payout)),
            },
            payout,
        ))
    }

    /// Operator acknowledgement that ends a settled round.
    pub fn reset(self) -> Result<Pool, Error> {
        if self.round.status() != RoundStatus::Settled {
            return Err(Error::WrongPhase);
        }
        Ok(Pool {
            reserve: self.reserve,
            round: Round::Idle,
        })
    }

    /// Drain the pool to the operator. An active round refunds the player's
    /// stake first and is closed as `EmergencyDraw`.
    pub fn emergency_withdraw(self) -> Result<(Pool, Disbursement), Error> {
        match self.round {
            Round::Idle => {
                let payout = Disbursement {
                    to_player: 0,
                    to_operator: self.reserve,
                };
                Ok((Pool::new(), payout))
            }
            Round::Active(active) => {
                let earmark = active
                    .session_pool
                    .checked_sub(active.human_stake)
                    .ok_or(Error::Overflow)?;
                let payout = Disbursement {
                    to_player: active.human_stake,
                    to_operator: self.reserve.checked_add(earmark).ok_or(Error::Overflow)?,
                };
                Ok((
                    Pool {
                        reserve: 0,
                        round: Round::Settled(close(active, Outcome::EmergencyDraw, payout)),
                    },
                    payout,
                ))
            }
            Round::Settled(_) => Err(Error::WrongPhase),
        }
    }

    /// Close a round whose deadline has passed without a settlement. Settles
    /// like a draw: the stake goes back to the player and the earmark back to
    /// the reserve.
    pub fn force_timeout(self, now: u32) -> Result<(Pool, Disbursement), Error> {
        let Round::Active(active) = self.round else {
            return Err(Error::WrongPhase);
        };
        if now <= active.deadline {
            return Err(Error::DeadlineNotReached);
        }

        let earmark = active
            .session_pool
            .checked_sub(active.human_stake)
            .ok_or(Error::Overflow)?;
        let reserve = self.reserve.checked_add(earmark).ok_or(Error::Overflow)?;
        let payout = Disbursement {
            to_player: active.human_stake,
            to_operator: 0,
        };
        Ok((
            Pool {
                reserve,
                round: Round::Settled(close(active, Outcome::TimedOut, payout)),
            },
            payout,
        ))
    }
}

impl Default for Pool {
    fn default() -> Self {
        Pool::new()
    }
}

fn close(active: ActiveRound, outcome: Outcome, payout: Disbursement) -> SettledRound {
    SettledRound {
        player: active.player,
        human_stake: active.human_stake,
        counterparties: active.counterparties,
        session_pool: active.session_pool,
        outcome,
        paid_to_player: payout.to_player,
        paid_to_operator: payout.to_operator,
    }
}

//! Unit tests for the Play Rewards contract.
use super::*;
use soroban_sdk::testutils::Address as _;
use soroban_sdk::token::{StellarAssetClient, TokenClient};
use soroban_sdk::{Address, Bytes, Env};

const UNIT: i128 = 1_000;

struct Setup<'a> {
    client: PlayRewardsClient<'a>,
    contract_id: Address,
    admin: Address,
    owner: Address,
    funder: Address,
    token: TokenClient<'a>,
}

fn setup(env: &Env) -> Setup<'_> {
    let admin = Address::generate(env);
    let recorder = Address::generate(env);
    let owner = Address::generate(env);
    let funder = Address::generate(env);
    let token_admin = Address::generate(env);

    let token_addr = env
        .register_stellar_asset_contract_v2(token_admin)
        .address();

    let contract_id = env.register(PlayRewards, ());
    let client = PlayRewardsClient::new(env, &contract_id);

    env.mock_all_auths();
    client.init(&admin, &token_addr, &recorder, &UNIT);
    StellarAssetClient::new(env, &token_addr).mint(&funder, &50_000i128);

    Setup {
        client,
        contract_id,
        admin,
        owner,
        funder,
        token: TokenClient::new(env, &token_addr),
    }
}

fn cid(env: &Env, id: &str) -> Bytes {
    Bytes::from_slice(env, id.as_bytes())
}

fn play_n(client: &PlayRewardsClient, id: &Bytes, n: u64) {
    for _ in 0..n {
        client.record_play(id);
    }
}

#[test]
fn test_init_rejects_reinit() {
    let env = Env::default();
    let s = setup(&env);
    let other = Address::generate(&env);

    let result = s.client.try_init(&s.admin, &other, &other, &UNIT);
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
}

#[test]
fn test_init_rejects_zero_reward_unit() {
    let env = Env::default();
    let contract_id = env.register(PlayRewards, ());
    let client = PlayRewardsClient::new(&env, &contract_id);
    env.mock_all_auths();

    let a = Address::generate(&env);
    assert_eq!(
        client.try_init(&a, &a, &a, &0i128),
        Err(Ok(Error::InvalidAmount))
    );
}

#[test]
fn test_register_is_idempotent() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-snake");

    assert!(s.client.register_creation(&id, &s.owner));
    play_n(&s.client, &id, 3);

    let squatter = Address::generate(&env);
    assert!(!s.client.register_creation(&id, &squatter));

    let counter = s.client.get_creation(&id);
    assert_eq!(counter.owner, s.owner);
    assert_eq!(counter.play_count, 3);
    assert_eq!(counter.accrued_reward, 0);
}

#[test]
fn test_register_requires_owner_auth() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-claimed");

    env.set_auths(&[]);
    assert!(s.client.try_register_creation(&id, &s.owner).is_err());
    assert_eq!(
        s.client.try_get_creation(&id),
        Err(Ok(Error::NotRegistered))
    );
}

#[test]
fn test_register_rejects_empty_id() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.client.try_register_creation(&Bytes::new(&env), &s.owner),
        Err(Ok(Error::InvalidCreationId))
    );
}

#[test]
fn test_record_play_requires_registration() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.client.try_record_play(&cid(&env, "unknown")),
        Err(Ok(Error::NotRegistered))
    );
}

#[test]
fn test_record_play_requires_recorder_auth() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-pong");
    s.client.register_creation(&id, &s.owner);

    env.set_auths(&[]);
    assert!(s.client.try_record_play(&id).is_err());
    assert_eq!(s.client.get_play_count(&id), 0);
}

#[test]
fn test_unregistered_views_return_zero() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "nobody");

    assert_eq!(s.client.get_play_count(&id), 0);
    assert_eq!(s.client.get_accrued_reward(&id), 0);
    assert_eq!(s.client.try_get_creation(&id), Err(Ok(Error::NotRegistered)));
}

#[test]
fn test_hundred_plays_accrue_one_unit() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-tetris");
    s.client.register_creation(&id, &s.owner);

    play_n(&s.client, &id, 99);
    assert_eq!(s.client.get_accrued_reward(&id), 0);

    assert_eq!(s.client.record_play(&id), 100);
    assert_eq!(s.client.get_play_count(&id), 100);
    assert_eq!(s.client.get_accrued_reward(&id), UNIT);
}

#[test]
fn test_two_hundred_fifty_plays_accrue_two_units() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-breakout");
    s.client.register_creation(&id, &s.owner);

    play_n(&s.client, &id, 250);

    assert_eq!(s.client.get_play_count(&id), 250);
    assert_eq!(s.client.get_accrued_reward(&id), 2 * UNIT);
}

#[test]
fn test_counters_are_per_creation() {
    let env = Env::default();
    let s = setup(&env);
    let a = cid(&env, "bafy-a");
    let b = cid(&env, "bafy-b");
    s.client.register_creation(&a, &s.owner);
    s.client.register_creation(&b, &s.owner);

    play_n(&s.client, &a, 100);
    play_n(&s.client, &b, 7);

    assert_eq!(s.client.get_accrued_reward(&a), UNIT);
    assert_eq!(s.client.get_accrued_reward(&b), 0);
    assert_eq!(s.client.get_play_count(&b), 7);
}

#[test]
fn test_fund_pool() {
    let env = Env::default();
    let s = setup(&env);

    s.client.fund_pool(&s.funder, &3_000i128);

    assert_eq!(s.client.get_pool_balance(), 3_000);
    assert_eq!(s.token.balance(&s.contract_id), 3_000);
    assert_eq!(s.token.balance(&s.funder), 47_000);

    assert_eq!(
        s.client.try_fund_pool(&s.funder, &0i128),
        Err(Ok(Error::InvalidAmount))
    );
}

#[test]
fn test_claim_pays_owner_and_resets_accrual() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-claim");
    s.client.register_creation(&id, &s.owner);
    s.client.fund_pool(&s.funder, &5_000i128);

    play_n(&s.client, &id, 200);
    assert_eq!(s.client.claim_rewards(&s.owner, &id), 2 * UNIT);

    assert_eq!(s.token.balance(&s.owner), 2 * UNIT);
    assert_eq!(s.client.get_pool_balance(), 5_000 - 2 * UNIT);
    assert_eq!(s.client.get_accrued_reward(&id), 0);
    assert_eq!(s.client.get_play_count(&id), 200);
    assert_eq!(s.token.balance(&s.contract_id), s.client.get_pool_balance());

    assert_eq!(
        s.client.try_claim_rewards(&s.owner, &id),
        Err(Ok(Error::NothingToClaim))
    );
}

#[test]
fn test_claim_by_non_owner_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-mine");
    s.client.register_creation(&id, &s.owner);
    s.client.fund_pool(&s.funder, &5_000i128);
    play_n(&s.client, &id, 100);

    let thief = Address::generate(&env);
    assert_eq!(
        s.client.try_claim_rewards(&thief, &id),
        Err(Ok(Error::Unauthorized))
    );
    assert_eq!(s.client.get_accrued_reward(&id), UNIT);
    assert_eq!(s.token.balance(&thief), 0);
}

#[test]
fn test_claim_with_nothing_accrued_rejected() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-new");
    s.client.register_creation(&id, &s.owner);

    assert_eq!(
        s.client.try_claim_rewards(&s.owner, &id),
        Err(Ok(Error::NothingToClaim))
    );
}

#[test]
fn test_claim_bounded_by_pool() {
    let env = Env::default();
    let s = setup(&env);
    let id = cid(&env, "bafy-popular");
    s.client.register_creation(&id, &s.owner);
    s.client.fund_pool(&s.funder, &(UNIT - 1));
    play_n(&s.client, &id, 100);

    assert_eq!(
        s.client.try_claim_rewards(&s.owner, &id),
        Err(Ok(Error::InsufficientPool))
    );
    assert_eq!(s.client.get_accrued_reward(&id), UNIT);

    s.client.fund_pool(&s.funder, &1i128);
    assert_eq!(s.client.claim_rewards(&s.owner, &id), UNIT);
    assert_eq!(s.client.get_pool_balance(), 0);
}

#[test]
fn test_claim_unregistered_rejected() {
    let env = Env::default();
    let s = setup(&env);

    assert_eq!(
        s.client.try_claim_rewards(&s.owner, &cid(&env, "ghost")),
        Err(Ok(Error::NotRegistered))
    );
}

#[test]
fn test_set_recorder_admin_only() {
    let env = Env::default();
    let s = setup(&env);
    let next = Address::generate(&env);

    assert_eq!(
        s.client.try_set_recorder(&s.owner, &next),
        Err(Ok(Error::Unauthorized))
    );

    s.client.set_recorder(&s.admin, &next);
    assert_eq!(s.client.get_recorder(), next);
}

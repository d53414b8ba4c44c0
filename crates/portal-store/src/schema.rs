//! Table definitions, applied idempotently on connect.
//!
//! `referrals.user_id` is UNIQUE: a user can be referred at most once, and
//! that constraint is what decides a race between two concurrent joins.

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        address     TEXT    NOT NULL UNIQUE,
        created_at  TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS progress (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id            INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        twitter_verified   INTEGER NOT NULL DEFAULT 0,
        twitter_account    TEXT    UNIQUE,
        telegram_verified  INTEGER NOT NULL DEFAULT 0,
        telegram_account   TEXT    UNIQUE,
        referral_code      TEXT    UNIQUE,
        updated_at         TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS referrals (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id               INTEGER NOT NULL UNIQUE REFERENCES users(id),
        referrer_progress_id  INTEGER NOT NULL REFERENCES progress(id),
        created_at            TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS referrals_referrer_idx ON referrals (referrer_progress_id)",
    "CREATE TABLE IF NOT EXISTS boosts (
        user_id            INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        token_a_balance    TEXT    NOT NULL,
        token_b_balance    TEXT    NOT NULL,
        token_c_balance    TEXT    NOT NULL,
        boost_coefficient  REAL    NOT NULL,
        has_boost_a        INTEGER NOT NULL,
        has_boost_b        INTEGER NOT NULL,
        has_boost_c        INTEGER NOT NULL,
        updated_at         TEXT    NOT NULL
    )",
];

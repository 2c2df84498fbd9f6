use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;

use crate::error::{CoreError, CoreResult};
use crate::model::Role;
use crate::store;

const RANDOM_SUFFIX_LEN: usize = 6;

/// Generates a login code for `role`. Uniqueness is the caller's problem;
/// see [`allocate_user_code`].
///
/// - student: `S` + 6 base62 characters
/// - teacher: `T` + 3 digits in 100..=999
/// - parent:  `P` + 3 digits in 100..=999
/// - admin:   `U` + 6 base62 characters
pub fn generate_code<R: Rng + ?Sized>(role: Role, rng: &mut R) -> String {
    match role {
        Role::Student => random_suffix_code('S', rng),
        Role::Teacher => three_digit_code('T', rng),
        Role::Parent => three_digit_code('P', rng),
        Role::Admin => random_suffix_code('U', rng),
    }
}

fn random_suffix_code<R: Rng + ?Sized>(prefix: char, rng: &mut R) -> String {
    let mut code = String::with_capacity(1 + RANDOM_SUFFIX_LEN);
    code.push(prefix);
    for _ in 0..RANDOM_SUFFIX_LEN {
        code.push(char::from(rng.sample(Alphanumeric)));
    }
    code
}

fn three_digit_code<R: Rng + ?Sized>(prefix: char, rng: &mut R) -> String {
    let n: u16 = rng.random_range(100..=999);
    format!("{}{}", prefix, n)
}

/// Generates codes until one is not taken in the users table. Gives up with
/// `Conflict` after `max_attempts` collisions; the teacher and parent spaces
/// only hold 900 codes each.
pub fn allocate_user_code<R: Rng + ?Sized>(
    conn: &Connection,
    role: Role,
    max_attempts: u32,
    rng: &mut R,
) -> CoreResult<String> {
    for attempt in 1..=max_attempts.max(1) {
        let code = generate_code(role, rng);
        if !store::user_exists(conn, &code)? {
            return Ok(code);
        }
        log::debug!("code collision on {} (attempt {})", code, attempt);
    }
    Err(CoreError::Conflict(format!(
        "no free {} code after {} attempts",
        role, max_attempts
    )))
}

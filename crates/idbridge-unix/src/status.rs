//! Password and account lifecycle derived from shadow aging fields
//!
//! Shadow stores day counts since the epoch (last change, disabled since)
//! and spans in days (min, max, warn, inactive). Unparsable fields count as
//! unset. A max age of 99999 or more means the password never expires.

use crate::schema::{field, shadow};
use chrono::{Duration, NaiveDate};
use idbridge_common::{
    AccountStatus, AccountStatusType, PasswordStatus, PasswordStatusType, date_from_days,
};

/// Max age meaning "never expires"
const NEVER_EXPIRES: i64 = 99_999;

/// Raw aging fields of a shadow row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowAging {
    pub last_change: Option<i64>,
    pub min_age: Option<i64>,
    pub max_age: Option<i64>,
    pub warn: Option<i64>,
    pub inactive: Option<i64>,
    pub disabled_since: Option<i64>,
}

fn day_field(row: &[String], column: usize) -> Option<i64> {
    let value = field(row, column).trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<i64>() {
        Ok(days) if days >= 0 => Some(days),
        _ => {
            tracing::debug!("Ignoring malformed aging field {} = {:?}", column, value);
            None
        }
    }
}

impl ShadowAging {
    /// Read the aging fields of a shadow row
    #[must_use]
    pub fn from_row(row: &[String]) -> Self {
        Self {
            last_change: day_field(row, shadow::LAST_CHANGE),
            min_age: day_field(row, shadow::MIN_AGE),
            max_age: day_field(row, shadow::MAX_AGE),
            warn: day_field(row, shadow::WARN),
            inactive: day_field(row, shadow::INACTIVE),
            disabled_since: day_field(row, shadow::DISABLED_SINCE),
        }
    }
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

/// Derive the password status on `today`
///
/// Priority: must change, expired, near expiry, locked by minimum age,
/// up to date.
#[must_use]
pub fn password_status(aging: &ShadowAging, today: NaiveDate) -> PasswordStatus {
    let must_change = aging.last_change == Some(0);
    let last_change = aging
        .last_change
        .filter(|&d| d > 0)
        .and_then(date_from_days);

    let expire = match (last_change, aging.max_age) {
        (Some(changed), Some(max)) if max < NEVER_EXPIRES => add_days(changed, max),
        _ => None,
    };
    let warn = match (expire, aging.warn) {
        (Some(expire), Some(warn)) => add_days(expire, -warn),
        _ => None,
    };
    let disable = match (expire, aging.inactive) {
        (Some(expire), Some(inactive)) => add_days(expire, inactive),
        _ => None,
    };
    let lock_until = match (last_change, aging.min_age) {
        (Some(changed), Some(min)) if min > 0 => add_days(changed, min),
        _ => None,
    };

    let status = if must_change {
        PasswordStatusType::NeedsChange
    } else if expire.is_some_and(|e| today > e) {
        PasswordStatusType::Expired
    } else if warn.is_some_and(|w| today >= w) {
        PasswordStatusType::NearExpiry
    } else if lock_until.is_some_and(|l| today < l) {
        PasswordStatusType::Locked
    } else {
        PasswordStatusType::UpToDate
    };

    PasswordStatus {
        last_change,
        expire,
        warn,
        disable,
        lock_until,
        must_change,
        status,
    }
}

/// Whether a stored hash carries the `!` lock prefix
#[must_use]
pub fn has_lock_prefix(hash: &str) -> bool {
    hash.starts_with('!')
}

/// Derive the account status on `today`
///
/// `aging` is `None` when the identity has no shadow row; the lock prefix
/// on the live hash is then the only signal.
#[must_use]
pub fn account_status(
    live_hash: &str,
    aging: Option<&ShadowAging>,
    password: Option<&PasswordStatus>,
    today: NaiveDate,
) -> AccountStatus {
    let locked_since = aging
        .and_then(|a| a.disabled_since)
        .and_then(date_from_days);
    let locked = locked_since.is_some() || has_lock_prefix(live_hash);
    let disabled_after = password.and_then(|p| p.disable);
    let disabled = disabled_after.is_some_and(|d| today > d);

    let status = if locked {
        AccountStatusType::Locked
    } else if disabled {
        AccountStatusType::Disabled
    } else {
        AccountStatusType::Active
    };

    AccountStatus {
        locked,
        disabled,
        locked_since,
        disabled_after,
        status,
    }
}

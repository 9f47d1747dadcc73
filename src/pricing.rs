// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rental pricing.
//!
//! A rental is billed per started day: the elapsed time is rounded up to
//! whole days, with a minimum of one day.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Number of days billed between `rented_at` and `returned_at`.
///
/// `ceil(elapsed / 24h)` over the full-precision duration, never less than 1.
/// A return timestamp earlier than the rent timestamp bills a single day.
pub fn billable_days(rented_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> i64 {
    let elapsed = returned_at - rented_at;
    if elapsed <= Duration::zero() {
        return 1;
    }
    let whole = elapsed.num_days();
    let started = i64::from(elapsed - Duration::days(whole) > Duration::zero());
    (whole + started).max(1)
}

/// Total price of a rental, or `None` if it does not fit in a [`Decimal`].
pub fn rental_price(
    rented_at: DateTime<Utc>,
    returned_at: DateTime<Utc>,
    price_per_day: Decimal,
) -> Option<Decimal> {
    Decimal::from(billable_days(rented_at, returned_at)).checked_mul(price_per_day)
}

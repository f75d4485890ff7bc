//! Cron schedule parsing and evaluation.
//!
//! Supported grammar, per field:
//!
//! | Form        | Meaning                                   |
//! |-------------|-------------------------------------------|
//! | `*`         | every value                               |
//! | `n`         | a single value                            |
//! | `a-b`       | inclusive range                           |
//! | `a,b,c`     | list of any of the other forms            |
//! | `*/s`       | every `s` starting at the field minimum   |
//! | `a/s`       | every `s` starting at `a`                 |
//! | `a-b/s`     | every `s` within `a-b`                    |
//! | `?`         | no constraint (day fields only)           |
//! | `L`         | last day of month / Saturday              |
//! | `LW`, `nW`  | last / nearest weekday (day-of-month)     |
//! | `nL`, `n#k` | last / k-th weekday n (day-of-week)       |
//!
//! Months and weekdays accept three-letter English names, case-insensitive.

mod expression;
mod field;

pub use expression::CronExpression;

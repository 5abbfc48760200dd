//! Point history: global and per-account decay curves over time.
//!
//! Global points are appended once per lock change (epoch 0 is the genesis point).
//! Weeks without activity are never materialized: a query or mutation rolls the
//! nearest stored point forward through the sparse slope-change schedule, clamping
//! bias and slope at zero at every scheduled change, which yields exactly the point
//! a transaction at that week boundary would have recorded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::RuntimeBounds;
use crate::config::EscrowConfig;
use crate::math::{
    add_i128, curve_to_amount, decay, floor_week, lock_bias, lock_slope, sub_i128,
    weighted_balance,
};
use crate::types::{AccountId, Amount, Epoch, Lock, Point, Timestamp, Weighting, WEEK};
use crate::{Result, VedistError};

/// Outcome of a bounded ledger catch-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointProgress {
    /// The global point now sits at `now`.
    Complete { epoch: Epoch },
    /// The bound was hit; the global point sits at `reached` and more calls are needed.
    Partial {
        epoch: Epoch,
        reached: Timestamp,
        pending_weeks: u64,
    },
}

/// A fully computed lock change, ready to be committed with [`PointHistoryLedger::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointChange {
    global: Point,
    user: Option<(AccountId, Point)>,
    slope_changes: Vec<(Timestamp, i128)>,
}

impl PointChange {
    pub fn global_point(&self) -> Point {
        self.global
    }

    pub fn user_point(&self) -> Option<Point> {
        self.user.map(|(_, p)| p)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointHistoryLedger {
    max_lock_duration: u64,
    weight_multiplier: u64,
    max_fill_weeks: u64,
    point_history: Vec<Point>,
    // Local epoch `e` lives at index `e - 1`.
    user_point_history: BTreeMap<AccountId, Vec<Point>>,
    slope_changes: BTreeMap<Timestamp, i128>,
}

impl PointHistoryLedger {
    pub fn new(genesis: Timestamp, escrow: &EscrowConfig, bounds: &RuntimeBounds) -> Self {
        Self {
            max_lock_duration: escrow.max_lock_duration,
            weight_multiplier: escrow.weight_multiplier,
            max_fill_weeks: bounds.max_fill_weeks,
            point_history: vec![Point {
                ts: genesis,
                ..Point::default()
            }],
            user_point_history: BTreeMap::new(),
            slope_changes: BTreeMap::new(),
        }
    }

    pub fn max_lock_duration(&self) -> u64 {
        self.max_lock_duration
    }

    pub fn weight_multiplier(&self) -> u64 {
        self.weight_multiplier
    }

    /// Current global epoch.
    pub fn epoch(&self) -> Epoch {
        (self.point_history.len() - 1) as Epoch
    }

    pub fn point(&self, epoch: Epoch) -> Option<Point> {
        self.point_history.get(usize::try_from(epoch).ok()?).copied()
    }

    pub fn last_point(&self) -> Point {
        self.point_history[self.point_history.len() - 1]
    }

    /// Number of points recorded for `account` (its latest local epoch).
    pub fn user_point_epoch(&self, account: &AccountId) -> Epoch {
        self.user_point_history
            .get(account)
            .map(|h| h.len() as Epoch)
            .unwrap_or(0)
    }

    /// Point at local epoch `epoch` (1-based).
    pub fn user_point(&self, account: &AccountId, epoch: Epoch) -> Option<Point> {
        let idx = usize::try_from(epoch.checked_sub(1)?).ok()?;
        self.user_point_history.get(account)?.get(idx).copied()
    }

    /// Accounts with any recorded history.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.user_point_history.keys()
    }

    pub fn slope_change_at(&self, t: Timestamp) -> i128 {
        self.slope_changes.get(&t).copied().unwrap_or(0)
    }

    /// Latest local epoch whose point is at or before `t` (0 if none).
    pub fn find_user_epoch(&self, account: &AccountId, t: Timestamp) -> Epoch {
        match self.user_point_history.get(account) {
            Some(history) => history.partition_point(|p| p.ts <= t) as Epoch,
            None => 0,
        }
    }

    /// Latest global epoch whose point is at or before `t`.
    pub fn find_epoch(&self, t: Timestamp) -> Option<Epoch> {
        let n = self.point_history.partition_point(|p| p.ts <= t);
        n.checked_sub(1).map(|e| e as Epoch)
    }

    /// Voting power of `account` at `t`.
    ///
    /// Zero before the account's first point; future timestamps extrapolate the decay.
    pub fn balance_at(
        &self,
        account: &AccountId,
        t: Timestamp,
        weighting: Weighting,
    ) -> Result<Amount> {
        let epoch = self.find_user_epoch(account, t);
        let point = match self.user_point(account, epoch) {
            Some(p) => p,
            None => return Ok(Amount::ZERO),
        };
        let bias = decay(point.bias, point.slope, t - point.ts)?;
        self.weigh(bias, point.underlying_supply, weighting)
    }

    /// Total voting power at `t`, replaying scheduled slope changes after the nearest point.
    pub fn supply_at(&self, t: Timestamp, weighting: Weighting) -> Result<Amount> {
        let point = match self.find_epoch(t).and_then(|e| self.point(e)) {
            Some(p) => p,
            None => return Ok(Amount::ZERO),
        };
        let rolled = self.roll_forward(point, t)?;
        self.weigh(rolled.bias, rolled.underlying_supply, weighting)
    }

    fn weigh(&self, bias: i128, principal: Amount, weighting: Weighting) -> Result<Amount> {
        match weighting {
            Weighting::Unweighted => Ok(curve_to_amount(bias)),
            Weighting::Weighted => weighted_balance(bias, self.weight_multiplier, principal),
        }
    }

    /// Week boundaries a roll from `from` to `to` crosses.
    fn pending_weeks(from: Timestamp, to: Timestamp) -> u64 {
        floor_week(to).saturating_sub(floor_week(from)) / WEEK
    }

    /// Advance `last` to `target` through the slope-change schedule.
    fn roll_forward(&self, mut last: Point, target: Timestamp) -> Result<Point> {
        while last.ts < target {
            if last.slope == 0 {
                // Scheduled changes are never positive, so nothing moves until `target`.
                last.ts = target;
                break;
            }
            let (t_i, d_slope) = match self.slope_changes.range(last.ts + 1..=target).next() {
                Some((&t, &d)) => (t, d),
                None => (target, 0),
            };
            last.bias = decay(last.bias, last.slope, t_i - last.ts)?;
            last.slope = add_i128(last.slope, d_slope)?.max(0);
            last.ts = t_i;
        }
        Ok(last)
    }

    fn ensure_monotone(&self, now: Timestamp) -> Result<Point> {
        let last = self.last_point();
        if now < last.ts {
            return Err(VedistError::InvalidInput(format!(
                "timestamp {now} precedes last checkpoint {}",
                last.ts
            )));
        }
        Ok(last)
    }

    /// Compute the global and user points for a lock change without mutating anything.
    ///
    /// Preconditions:
    /// - `now` is not before the last global point.
    /// - At most `max_fill_weeks` week boundaries separate the last global point from `now`.
    ///
    /// Postconditions:
    /// - Applying the result appends exactly one global point at `now`.
    pub fn plan_point_change(
        &self,
        account: Option<AccountId>,
        old: &Lock,
        new: &Lock,
        now: Timestamp,
    ) -> Result<PointChange> {
        let last = self.ensure_monotone(now)?;
        let pending = Self::pending_weeks(last.ts, now);
        if pending > self.max_fill_weeks {
            return Err(VedistError::CheckpointBacklog {
                pending_weeks: pending,
                max_weeks: self.max_fill_weeks,
            });
        }

        let (old_slope, old_bias) = self.lock_curve(old, now)?;
        let (new_slope, new_bias) = self.lock_curve(new, now)?;

        let mut old_dslope = self.slope_change_at(old.end);
        let mut new_dslope = if new.end != 0 {
            if new.end == old.end {
                old_dslope
            } else {
                self.slope_change_at(new.end)
            }
        } else {
            0
        };

        let mut global = self.roll_forward(last, now)?;
        global.slope = add_i128(global.slope, sub_i128(new_slope, old_slope)?)?.max(0);
        global.bias = add_i128(global.bias, sub_i128(new_bias, old_bias)?)?.max(0);
        global.underlying_supply = global
            .underlying_supply
            .checked_add(new.amount)?
            .checked_sub(old.amount)?;
        global.ts = now;

        let mut slope_changes = Vec::with_capacity(2);
        if old.end > now {
            old_dslope = add_i128(old_dslope, old_slope)?;
            if new.end == old.end {
                old_dslope = sub_i128(old_dslope, new_slope)?;
            }
            slope_changes.push((old.end, old_dslope));
        }
        if new.end > now && new.end > old.end {
            new_dslope = sub_i128(new_dslope, new_slope)?;
            slope_changes.push((new.end, new_dslope));
        }

        let user = account.map(|a| {
            (
                a,
                Point {
                    bias: new_bias,
                    slope: new_slope,
                    ts: now,
                    underlying_supply: new.amount,
                },
            )
        });

        Ok(PointChange {
            global,
            user,
            slope_changes,
        })
    }

    /// Commit a planned change. Infallible.
    pub fn apply(&mut self, change: PointChange) -> Epoch {
        for (t, d) in change.slope_changes {
            self.slope_changes.insert(t, d);
        }
        if let Some((account, point)) = change.user {
            self.user_point_history.entry(account).or_default().push(point);
        }
        self.point_history.push(change.global);
        let epoch = self.epoch();
        debug!(
            epoch,
            bias = change.global.bias,
            slope = change.global.slope,
            ts = change.global.ts,
            "global point recorded"
        );
        epoch
    }

    /// Plan and apply a lock change for `account`.
    pub fn record_point_change(
        &mut self,
        account: AccountId,
        old: &Lock,
        new: &Lock,
        now: Timestamp,
    ) -> Result<Epoch> {
        let change = self.plan_point_change(Some(account), old, new, now)?;
        Ok(self.apply(change))
    }

    /// Append a global point without a lock change, filling forward at most
    /// `max_fill_weeks` week boundaries.
    pub fn checkpoint(&mut self, now: Timestamp) -> Result<CheckpointProgress> {
        let last = self.ensure_monotone(now)?;
        let pending = Self::pending_weeks(last.ts, now);
        if pending > self.max_fill_weeks {
            let reached = floor_week(last.ts) + self.max_fill_weeks * WEEK;
            let point = self.roll_forward(last, reached)?;
            self.point_history.push(point);
            debug!(reached, pending, "partial ledger checkpoint");
            return Ok(CheckpointProgress::Partial {
                epoch: self.epoch(),
                reached,
                pending_weeks: pending - self.max_fill_weeks,
            });
        }
        let point = self.roll_forward(last, now)?;
        self.point_history.push(point);
        Ok(CheckpointProgress::Complete {
            epoch: self.epoch(),
        })
    }

    /// Slope and bias of a lock at `now` (zero when empty or expired).
    fn lock_curve(&self, lock: &Lock, now: Timestamp) -> Result<(i128, i128)> {
        if lock.end <= now || lock.amount.is_zero() {
            return Ok((0, 0));
        }
        let slope = lock_slope(lock.amount, self.max_lock_duration)?;
        Ok((slope, lock_bias(slope, lock.end, now)?))
    }
}

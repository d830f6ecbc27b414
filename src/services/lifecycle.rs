//! Status transition rules for rides and ride requests.
//!
//! Everything here is pure: callers load the row, ask the status for its next
//! value, then persist it. Persisting is the booking service's job.

use chrono::{DateTime, FixedOffset};
use sea_orm::ActiveEnum;
use serde::Serialize;
use thiserror::Error;

use crate::entities::ride::RideStatus;
use crate::entities::ride_request::RideRequestStatus;

/// A guard rejected a status change.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Invalid {entity} transition from {from} to {to}{}", .detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default())]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
    pub detail: Option<String>,
}

impl TransitionError {
    fn new<S: ActiveEnum<Value = String>>(entity: &'static str, from: S, to: S) -> Self {
        Self {
            entity,
            from: from.to_value(),
            to: to.to_value(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result of a cancel request on a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
}

impl RideStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    fn reject(self, to: RideStatus) -> TransitionError {
        TransitionError::new("ride", self, to)
    }

    /// requested -> scheduled, only for a start time after `now`.
    pub fn schedule(
        self,
        start_time: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> Result<RideStatus, TransitionError> {
        if self != RideStatus::Requested {
            return Err(self.reject(RideStatus::Scheduled));
        }
        if start_time <= now {
            return Err(self
                .reject(RideStatus::Scheduled)
                .with_detail("start time must be in the future"));
        }
        Ok(RideStatus::Scheduled)
    }

    pub fn start(self) -> Result<RideStatus, TransitionError> {
        match self {
            RideStatus::Requested | RideStatus::Scheduled => Ok(RideStatus::InProgress),
            _ => Err(self.reject(RideStatus::InProgress)),
        }
    }

    /// scheduled/in-progress -> completed, with `end_time >= start_time`.
    pub fn complete(
        self,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
    ) -> Result<RideStatus, TransitionError> {
        if !matches!(self, RideStatus::Scheduled | RideStatus::InProgress) {
            return Err(self.reject(RideStatus::Completed));
        }
        if end_time < start_time {
            return Err(self
                .reject(RideStatus::Completed)
                .with_detail("end time precedes start time"));
        }
        Ok(RideStatus::Completed)
    }

    /// Any non-terminal status may cancel. Cancelling twice is not an error.
    pub fn cancel(self) -> Result<CancelOutcome, TransitionError> {
        match self {
            RideStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
            RideStatus::Completed => Err(self.reject(RideStatus::Cancelled)),
            _ => Ok(CancelOutcome::Cancelled),
        }
    }
}

impl RideRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideRequestStatus::Completed | RideRequestStatus::Cancelled | RideRequestStatus::Timeout
        )
    }

    fn reject(self, to: RideRequestStatus) -> TransitionError {
        TransitionError::new("ride request", self, to)
    }

    fn step(
        self,
        allowed_from: &[RideRequestStatus],
        to: RideRequestStatus,
    ) -> Result<RideRequestStatus, TransitionError> {
        if allowed_from.contains(&self) {
            Ok(to)
        } else {
            Err(self.reject(to))
        }
    }

    /// A driver accepts the request.
    pub fn assign(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(&[RideRequestStatus::Waiting], RideRequestStatus::Assigned)
    }

    /// The assigned driver backs out; the request goes back to the queue.
    pub fn release(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(&[RideRequestStatus::Assigned], RideRequestStatus::Waiting)
    }

    pub fn start(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(&[RideRequestStatus::Assigned], RideRequestStatus::InProgress)
    }

    pub fn complete(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(&[RideRequestStatus::InProgress], RideRequestStatus::Completed)
    }

    pub fn cancel(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(
            &[RideRequestStatus::Waiting, RideRequestStatus::Assigned],
            RideRequestStatus::Cancelled,
        )
    }

    pub fn expire(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(
            &[RideRequestStatus::Waiting, RideRequestStatus::Assigned],
            RideRequestStatus::Timeout,
        )
    }

    /// Follows a cancellation of the paired ride. Unlike [`Self::cancel`] this
    /// also closes a request whose trip is already under way.
    pub fn abort(self) -> Result<RideRequestStatus, TransitionError> {
        self.step(
            &[
                RideRequestStatus::Waiting,
                RideRequestStatus::Assigned,
                RideRequestStatus::InProgress,
            ],
            RideRequestStatus::Cancelled,
        )
    }
}

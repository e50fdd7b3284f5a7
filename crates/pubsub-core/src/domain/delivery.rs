//! # Delivery State Machine (Type-State)
//!
//! Each state is a distinct type and transitions consume `self`, so a
//! delivery cannot be acked twice, retried after dead-lettering, or
//! dead-lettered without first failing in flight.
//!
//! ```text
//! [Pending] ──dispatch──→ [InFlight] ──ack──→ [Acked]
//!                             │ ↑
//!                        fail │ │ redispatch (after backoff)
//!                             ↓ │
//!                         [Retrying]
//!                             │
//!  fail with attempts exhausted
//!                             ↓
//!                      [DeadLettered]
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::errors::HandlerError;
use super::message::{DeliveryMetadata, Message};
use super::retry::RetryPolicy;
use super::value_objects::{PartitionId, SubscriberId};

/// Runtime view of the delivery state, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    Pending,
    InFlight,
    Retrying,
    Acked,
    DeadLettered,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acked | Self::DeadLettered)
    }

    /// Whether `self → next` is an edge of the state machine. Every typestate
    /// transition is checked against this table in debug builds.
    pub fn can_transition_to(&self, next: DeliveryState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Acked)
                | (Self::InFlight, Self::Retrying)
                | (Self::InFlight, Self::DeadLettered)
                | (Self::Retrying, Self::InFlight)
        )
    }
}

// =============================================================================
// STATE MARKERS (Zero-Sized Types)
// =============================================================================

/// Marker: not yet handed to the subscriber.
#[derive(Debug, Clone, Copy)]
pub struct Pending;

/// Marker: the handler is running.
#[derive(Debug, Clone, Copy)]
pub struct InFlight;

/// Marker: failed, waiting out the backoff.
#[derive(Debug, Clone, Copy)]
pub struct Retrying;

/// Marker: handler succeeded.
#[derive(Debug, Clone, Copy)]
pub struct Acked;

/// Marker: attempts exhausted.
#[derive(Debug, Clone, Copy)]
pub struct DeadLettered;

/// Maps a marker type to its runtime state.
pub trait StateMarker {
    const STATE: DeliveryState;
}

impl StateMarker for Pending {
    const STATE: DeliveryState = DeliveryState::Pending;
}
impl StateMarker for InFlight {
    const STATE: DeliveryState = DeliveryState::InFlight;
}
impl StateMarker for Retrying {
    const STATE: DeliveryState = DeliveryState::Retrying;
}
impl StateMarker for Acked {
    const STATE: DeliveryState = DeliveryState::Acked;
}
impl StateMarker for DeadLettered {
    const STATE: DeliveryState = DeliveryState::DeadLettered;
}

// =============================================================================
// TYPE-STATE DELIVERY
// =============================================================================

/// One message on its way to one subscriber.
#[derive(Debug)]
pub struct Delivery<S> {
    message: Arc<Message>,
    subscriber: SubscriberId,
    attempt: u32,
    last_error: Option<HandlerError>,
    _state: PhantomData<S>,
}

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum FailedDelivery {
    Retry(Delivery<Retrying>),
    Exhausted(Delivery<DeadLettered>),
}

impl<S> Delivery<S> {
    pub fn message(&self) -> &Arc<Message> {
        &self.message
    }

    pub fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    /// Attempts made so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&HandlerError> {
        self.last_error.as_ref()
    }
}

impl<S: StateMarker> Delivery<S> {
    pub fn state(&self) -> DeliveryState {
        S::STATE
    }

    fn into_state<T: StateMarker>(self) -> Delivery<T> {
        debug_assert!(
            S::STATE.can_transition_to(T::STATE),
            "illegal delivery transition {:?} -> {:?}",
            S::STATE,
            T::STATE
        );
        Delivery {
            message: self.message,
            subscriber: self.subscriber,
            attempt: self.attempt,
            last_error: self.last_error,
            _state: PhantomData,
        }
    }
}

impl Delivery<Pending> {
    pub fn new(message: Arc<Message>, subscriber: SubscriberId) -> Self {
        Self {
            message,
            subscriber,
            attempt: 0,
            last_error: None,
            _state: PhantomData,
        }
    }

    /// Begin the first attempt.
    pub fn dispatch(self) -> Delivery<InFlight> {
        let mut next = self.into_state::<InFlight>();
        next.attempt += 1;
        next
    }
}

impl Delivery<InFlight> {
    pub fn metadata(&self) -> DeliveryMetadata {
        DeliveryMetadata::new(
            Arc::clone(&self.message),
            self.subscriber.clone(),
            self.attempt,
        )
    }

    pub fn ack(self) -> Delivery<Acked> {
        self.into_state()
    }

    /// Record a failure and decide between retry and dead-letter.
    pub fn fail(mut self, error: HandlerError, policy: &RetryPolicy) -> FailedDelivery {
        self.last_error = Some(error);
        if policy.should_retry(self.attempt) {
            FailedDelivery::Retry(self.into_state())
        } else {
            FailedDelivery::Exhausted(self.into_state())
        }
    }
}

impl Delivery<Retrying> {
    pub fn backoff(&self, policy: &RetryPolicy) -> Duration {
        policy.backoff_for(self.attempt)
    }

    pub fn redispatch(self) -> Delivery<InFlight> {
        let mut next = self.into_state::<InFlight>();
        next.attempt += 1;
        next
    }
}

impl Delivery<DeadLettered> {
    pub fn into_dead_letter(self) -> DeadLetter {
        let error = self
            .last_error
            .unwrap_or_else(|| HandlerError::failed("attempts exhausted"));
        DeadLetter {
            topic: self.message.topic().to_string(),
            partition: self.message.partition(),
            subscriber: self.subscriber,
            attempts: self.attempt,
            error,
            message: self.message,
        }
    }
}

/// A message that exhausted its retry policy for one subscriber.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: String,
    pub partition: PartitionId,
    pub subscriber: SubscriberId,
    pub message: Arc<Message>,
    pub attempts: u32,
    pub error: HandlerError,
}

//! Interface of the remote party that verifies and settles gasless payments.
//!
//! The payment gate never moves value itself in gasless mode. It hands the
//! signed authorization to a [`Facilitator`] in two sequential calls:
//! [`Facilitator::verify`] first, then [`Facilitator::settle`] only once
//! verification succeeded.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto;

/// Asynchronous verify/settle interface of an x402 facilitator.
///
/// An `Ok` response carrying `isValid: false` or `success: false` is a
/// business rejection; `Err` means the facilitator could not be reached or
/// answered with something unreadable.
pub trait Facilitator {
    /// Transport-level failure.
    type Error: Debug + Display + Send;

    /// Checks a payment against its requirements without moving value.
    ///
    /// Safe to retry.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] when no readable answer was obtained.
    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<proto::VerifyResponse, Self::Error>> + Send;

    /// Executes a verified payment.
    ///
    /// Not retried automatically: idempotency on the facilitator side is
    /// not established.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] when no readable answer was obtained.
    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<proto::SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<proto::VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &proto::SettleRequest,
    ) -> impl Future<Output = Result<proto::SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }
}
